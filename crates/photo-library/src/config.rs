//! Library sync configuration.

use std::env;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

/// Default quiet period between a local mutation and its write-back.
pub const DEFAULT_FLUSH_QUIET_WINDOW: Duration = Duration::from_secs(10);
/// Default number of fetch-merge-persist rounds before a flush gives up.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
/// Maximum records read by a full rebuild (one page, no cross-page aggregation).
pub const DEFAULT_REBUILD_PAGE_SIZE: usize = 1200;
/// Maximum records read when catching up on photos added after the last write.
pub const DEFAULT_CATCH_UP_BATCH_SIZE: usize = 2000;

/// Configuration for [`LibrarySync`](crate::sync::LibrarySync).
/// Priority: environment variables > explicit values > defaults
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Quiet window a key waits after its first pending mutation before it is flushed
    pub flush_quiet_window: Duration,
    /// Fetch-merge-persist rounds allowed per flush after a version conflict
    pub max_conflict_retries: u32,
    /// Delay before the first conflict retry; doubles on each further attempt
    pub conflict_backoff_base: Duration,
    /// Upper bound for the conflict retry delay
    pub conflict_backoff_max: Duration,
    /// Page size of the full-rebuild scan
    pub rebuild_page_size: usize,
    /// Page size of the post-fetch catch-up query
    pub catch_up_batch_size: usize,
    /// Whether photos created after the remote document's last write are folded in on fetch
    pub catch_up_new_photos: bool,
    /// A cached index younger than this is served without a network round-trip
    pub stale_after: Duration,
    /// Offset used to turn photo timestamps into calendar dates
    pub utc_offset: FixedOffset,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            flush_quiet_window: DEFAULT_FLUSH_QUIET_WINDOW,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            conflict_backoff_base: Duration::from_secs(1),
            conflict_backoff_max: Duration::from_secs(30),
            rebuild_page_size: DEFAULT_REBUILD_PAGE_SIZE,
            catch_up_batch_size: DEFAULT_CATCH_UP_BATCH_SIZE,
            catch_up_new_photos: true,
            stale_after: Duration::from_secs(60),
            utc_offset: Utc.fix(),
        }
    }
}

impl LibraryConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment overrides on top of `self`.
    /// Env vars win so a developer can shorten the quiet window without a rebuild.
    pub fn with_env_overrides(self) -> Self {
        Self::with_overrides(self, |name| env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = lookup("PHOTO_LIBRARY_FLUSH_QUIET_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.flush_quiet_window = Duration::from_millis(ms);
        }
        if let Some(retries) = lookup("PHOTO_LIBRARY_MAX_CONFLICT_RETRIES").and_then(|v| v.parse().ok()) {
            self.max_conflict_retries = retries;
        }
        if let Some(size) = lookup("PHOTO_LIBRARY_REBUILD_PAGE_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|size| *size > 0)
        {
            self.rebuild_page_size = size;
        }
        if let Some(offset) = lookup("PHOTO_LIBRARY_UTC_OFFSET_MINUTES")
            .and_then(|v| v.parse::<i32>().ok())
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt)
        {
            self.utc_offset = offset;
        }
        self
    }

    /// Delay before conflict retry number `attempt` (1-based): base, 2×base, 4×base, … capped.
    pub fn conflict_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.conflict_backoff_base
            .saturating_mul(factor)
            .min(self.conflict_backoff_max)
    }
}
