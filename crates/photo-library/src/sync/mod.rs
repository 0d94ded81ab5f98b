//! Caching and write-back layer around the pure library core.
//!
//! [`LibrarySync`] is the only handle the gallery needs. It owns:
//!
//! - the **local cache**: one `Arc<LibraryIndex>` per (drive, category), mutated
//!   copy-on-write so readers always see whole snapshots;
//! - the **read path**: fetch the remote document, catch up on newer photos, merge
//!   with the cached copy, or rebuild from a page of photos when nothing exists;
//! - the **write-back scheduler**: per-key quiet-window flushes with bounded
//!   fetch-merge-retry on version conflicts.
//!
//! Mutations are visible to the next read immediately; the remote copy catches up
//! after the quiet window.

mod cache;
pub mod clock;
pub mod errors;
pub mod in_memory;
mod read_path;
pub mod remote;
mod scheduler;
mod write_back;


use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;
use log::debug;

use crate::config::LibraryConfig;
use crate::gallery::MonthTimeline;
use crate::library::{CacheKey, LibraryIndex, add_day, update_count};
use cache::{CacheLookup, LocalCache};
use scheduler::FlushScheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{RemoteError, SyncError};
pub use in_memory::InMemoryRemoteStore;
pub use remote::{QueryBatch, QueryFilter, QueryOptions, RemoteFile, RemoteStore, UploadRequest, UploadResult};
pub use scheduler::{FlushOutcome, FlushStatus};

/// Result of a non-blocking cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexLookup {
    Ready(Arc<LibraryIndex>),
    /// A read is in flight and nothing is cached yet.
    Pending,
    Missing,
}

/// Handle to the library index cache. Cheap to clone; clones share state.
pub struct LibrarySync<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: LibraryConfig,
    cache: LocalCache,
    scheduler: FlushScheduler,
}

impl<S> Clone for LibrarySync<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RemoteStore> LibrarySync<S> {
    pub fn new(store: S, config: LibraryConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: LibraryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                config,
                cache: LocalCache::default(),
                scheduler: FlushScheduler::default(),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.inner.config
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The cached index without touching the network.
    pub fn peek_index(&self, key: &CacheKey) -> IndexLookup {
        match self.inner.cache.lookup(key) {
            CacheLookup::Ready(index) => IndexLookup::Ready(index),
            CacheLookup::Loading => IndexLookup::Pending,
            CacheLookup::Missing => IndexLookup::Missing,
        }
    }

    /// The index for `key`, served from the cache while it's younger than
    /// `stale_after`, otherwise through the read path.
    pub async fn get_index(&self, key: &CacheKey) -> Result<Arc<LibraryIndex>, SyncError> {
        if let Some(fresh) = self.inner.cache.fresh(key, self.inner.config.stale_after) {
            return Ok(fresh);
        }
        self.run_read_path(key).await
    }

    /// Runs the read path regardless of how fresh the cached copy is.
    pub async fn refresh_index(&self, key: &CacheKey) -> Result<Arc<LibraryIndex>, SyncError> {
        self.run_read_path(key).await
    }

    /// Month-level view for the gallery, if the key is cached.
    pub fn timeline(&self, key: &CacheKey) -> Option<MonthTimeline> {
        self.inner.cache.get(key).map(|index| MonthTimeline::from_index(&index))
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Counts one new photo on `date` and schedules a write-back.
    ///
    /// `None` if the key isn't cached yet; the next read picks the photo up through
    /// catch-up or a rebuild.
    pub fn record_new_photo(&self, key: &CacheKey, date: NaiveDate) -> Option<Arc<LibraryIndex>> {
        let now = self.inner.clock.now_millis();
        let updated = self.inner.cache.update(key, |index| Some(add_day(index, date, now)))?;
        self.request_flush(key);
        Some(updated)
    }

    /// Replaces the count of the month containing `date` with an exhaustively counted value.
    ///
    /// `None` (and no write-back) if the key isn't cached or the month was never seen.
    pub fn correct_month_count(&self, key: &CacheKey, date: NaiveDate, count: u32) -> Option<Arc<LibraryIndex>> {
        let now = self.inner.clock.now_millis();
        let updated = self.inner.cache.update(key, |index| update_count(index, date, count, now))?;
        debug!("Corrected {key} {} to {count} photos", date.format("%Y-%m"));
        self.request_flush(key);
        Some(updated)
    }

    /// Compares a fully paginated month against the recorded count and corrects it on
    /// mismatch. `None` when nothing changed.
    pub fn reconcile_month_count(
        &self,
        key: &CacheKey,
        year: i32,
        month: u32,
        fetched: u32,
    ) -> Option<Arc<LibraryIndex>> {
        let recorded = self.inner.cache.get(key)?.photos_in_month(year, month)?;
        if recorded == fetched {
            return None;
        }
        debug!("{key} {year}-{month:02} has {fetched} photos, index says {recorded}");
        self.correct_month_count(key, NaiveDate::from_ymd_opt(year, month, 1)?, fetched)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Drops the cached index. Responses to requests already in flight are discarded.
    pub fn invalidate(&self, key: &CacheKey) {
        debug!("Invalidating library index {key}");
        self.inner.cache.invalidate(key);
    }

    /// Drops every cached index, e.g. on logout.
    pub fn invalidate_all(&self) {
        debug!("Invalidating all library indexes");
        self.inner.cache.clear();
    }

    /// Persists `key` now, skipping the quiet window.
    pub async fn flush_now(&self, key: &CacheKey) -> Result<FlushOutcome, SyncError> {
        let (result, next) = self.flush_with_ticket(key, None).await;
        if let Some(ticket) = next {
            self.spawn_delayed_flush(key.clone(), ticket);
        }
        result
    }

    /// Persists every key with unsaved changes, concurrently.
    pub async fn flush_all(&self) -> Vec<(CacheKey, Result<FlushOutcome, SyncError>)> {
        let keys = self.inner.cache.dirty_keys();
        let results = join_all(keys.iter().map(|key| self.flush_now(key))).await;
        keys.into_iter().zip(results).collect()
    }

    pub fn flush_status(&self, key: &CacheKey) -> FlushStatus {
        self.inner.scheduler.status(key)
    }

    /// Outcome of the most recent flush of `key`, including terminal failures.
    pub fn last_flush(&self, key: &CacheKey) -> Option<Result<FlushOutcome, SyncError>> {
        self.inner.scheduler.last_flush(key)
    }

    /// Whether `key` has local changes the remote store hasn't accepted yet.
    pub fn has_unsaved_changes(&self, key: &CacheKey) -> bool {
        self.inner.cache.is_dirty(key)
    }
}
