//! Process-wide cache of library indexes, one per (drive, category).
//!
//! Entries are `Arc` snapshots replaced wholesale on every change, so readers never
//! see a half-applied mutation and the lock is never held across an `.await`.
//!
//! Dirty tracking: every mutation bumps an entry's `generation`. A persist records the
//! generation it uploaded, so mutations that land during an in-flight persist stay dirty.
//!
//! Invalidation bumps the key's epoch. Responses to requests started under an older
//! epoch are dropped instead of resurrecting the entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::ignore_poison::IgnorePoison;
use crate::library::{CacheKey, LibraryIndex, merge};

#[derive(Debug, Clone)]
struct CacheEntry {
    index: Arc<LibraryIndex>,
    /// Last time the remote store was consulted for this key.
    fetched_at: Option<Instant>,
    generation: u64,
    persisted_generation: u64,
    /// Successful uploads so far. A read that saw fewer carries an older version tag.
    persists: u64,
}

impl CacheEntry {
    fn is_dirty(&self) -> bool {
        self.generation > self.persisted_generation
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Keys with a read in flight, with the epoch it started under.
    loading: HashMap<CacheKey, u64>,
    epochs: HashMap<CacheKey, u64>,
}

impl CacheState {
    fn epoch(&self, key: &CacheKey) -> u64 {
        self.epochs.get(key).copied().unwrap_or(0)
    }
}

/// What a read sees when it starts.
#[derive(Debug, Clone)]
pub(crate) struct LoadStart {
    pub epoch: u64,
    pub local: Option<Arc<LibraryIndex>>,
    /// The entry's upload count when the read started.
    pub persists: u64,
}

/// A consistent view of one entry, for persisting.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub index: Arc<LibraryIndex>,
    pub generation: u64,
    pub epoch: u64,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CacheLookup {
    Ready(Arc<LibraryIndex>),
    Loading,
    Missing,
}

#[derive(Debug, Default)]
pub(crate) struct LocalCache {
    state: Mutex<CacheState>,
}

impl LocalCache {
    pub fn get(&self, key: &CacheKey) -> Option<Arc<LibraryIndex>> {
        self.state.lock_ignore_poison().entries.get(key).map(|e| Arc::clone(&e.index))
    }

    pub fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let state = self.state.lock_ignore_poison();
        match state.entries.get(key) {
            Some(entry) => CacheLookup::Ready(Arc::clone(&entry.index)),
            None if state.loading.contains_key(key) => CacheLookup::Loading,
            None => CacheLookup::Missing,
        }
    }

    /// The entry, if the remote store was consulted for it within `max_age`.
    pub fn fresh(&self, key: &CacheKey, max_age: Duration) -> Option<Arc<LibraryIndex>> {
        let state = self.state.lock_ignore_poison();
        let entry = state.entries.get(key)?;
        let fetched_at = entry.fetched_at?;
        (fetched_at.elapsed() < max_age).then(|| Arc::clone(&entry.index))
    }

    pub fn begin_load(&self, key: &CacheKey) -> LoadStart {
        let mut state = self.state.lock_ignore_poison();
        let epoch = state.epoch(key);
        state.loading.insert(key.clone(), epoch);
        let entry = state.entries.get(key);
        LoadStart {
            epoch,
            local: entry.map(|e| Arc::clone(&e.index)),
            persists: entry.map_or(0, |e| e.persists),
        }
    }

    /// Clears the loading marker, unless a newer read has taken it over.
    pub fn end_load(&self, key: &CacheKey, epoch: u64) {
        let mut state = self.state.lock_ignore_poison();
        if state.loading.get(key) == Some(&epoch) {
            state.loading.remove(key);
        }
    }

    /// Folds a fetched index into the entry (or creates a clean one).
    ///
    /// Dirty state is preserved: a merge doesn't make local changes any less unsaved.
    /// `persists_at_start` is the upload count the fetch started under. If an upload of
    /// the same document finished since, the entry keeps its newer version tag. `None`
    /// always adopts the fetched identity.
    /// Returns `None` if the key was invalidated since `epoch`.
    pub fn merge_fetched(
        &self,
        key: &CacheKey,
        epoch: u64,
        fetched: LibraryIndex,
        persists_at_start: Option<u64>,
    ) -> Option<Arc<LibraryIndex>> {
        let mut state = self.state.lock_ignore_poison();
        if state.epoch(key) != epoch {
            return None;
        }
        let now = Instant::now();
        let entry = match state.entries.get(key) {
            Some(existing) => {
                let mut merged = merge(&fetched, &existing.index);
                let persisted_meanwhile = persists_at_start.is_some_and(|seen| seen < existing.persists);
                if persisted_meanwhile && fetched.remote_document_id == existing.index.remote_document_id {
                    merged.remote_version_tag = existing.index.remote_version_tag.clone();
                }
                CacheEntry {
                    index: Arc::new(merged),
                    fetched_at: Some(now),
                    ..existing.clone()
                }
            }
            None => CacheEntry {
                index: Arc::new(fetched),
                fetched_at: Some(now),
                generation: 0,
                persisted_generation: 0,
                persists: 0,
            },
        };
        let index = Arc::clone(&entry.index);
        state.entries.insert(key.clone(), entry);
        Some(index)
    }

    /// Records that the remote store had nothing newer for the entry.
    pub fn mark_checked(&self, key: &CacheKey, epoch: u64) {
        let mut state = self.state.lock_ignore_poison();
        if state.epoch(key) != epoch {
            return;
        }
        if let Some(entry) = state.entries.get_mut(key) {
            entry.fetched_at = Some(Instant::now());
        }
    }

    /// Stores a freshly rebuilt index as a dirty entry, so it gets persisted.
    pub fn put_rebuilt(&self, key: &CacheKey, epoch: u64, rebuilt: LibraryIndex) -> Option<Arc<LibraryIndex>> {
        let mut state = self.state.lock_ignore_poison();
        if state.epoch(key) != epoch {
            return None;
        }
        let now = Instant::now();
        let entry = match state.entries.get(key) {
            // Someone else populated the key meanwhile; keep their remote identity
            Some(existing) => CacheEntry {
                index: Arc::new(merge(&existing.index, &rebuilt)),
                fetched_at: Some(now),
                generation: existing.generation + 1,
                persisted_generation: existing.persisted_generation,
                persists: existing.persists,
            },
            None => CacheEntry {
                index: Arc::new(rebuilt),
                fetched_at: Some(now),
                generation: 1,
                persisted_generation: 0,
                persists: 0,
            },
        };
        let index = Arc::clone(&entry.index);
        state.entries.insert(key.clone(), entry);
        Some(index)
    }

    /// Applies a local mutation. `None` if the key isn't cached or `apply` declines.
    pub fn update(
        &self,
        key: &CacheKey,
        apply: impl FnOnce(&LibraryIndex) -> Option<LibraryIndex>,
    ) -> Option<Arc<LibraryIndex>> {
        let mut state = self.state.lock_ignore_poison();
        let entry = state.entries.get_mut(key)?;
        let updated = Arc::new(apply(&entry.index)?);
        entry.index = Arc::clone(&updated);
        entry.generation += 1;
        Some(updated)
    }

    /// Replaces the entry's remote identity without touching its content or dirty state.
    pub fn set_identity(
        &self,
        key: &CacheKey,
        epoch: u64,
        document_id: Option<String>,
        version_tag: Option<String>,
    ) -> bool {
        let mut state = self.state.lock_ignore_poison();
        if state.epoch(key) != epoch {
            return false;
        }
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        let mut index = (*entry.index).clone();
        index.remote_document_id = document_id;
        index.remote_version_tag = version_tag;
        entry.index = Arc::new(index);
        true
    }

    pub fn snapshot(&self, key: &CacheKey) -> Option<Snapshot> {
        let state = self.state.lock_ignore_poison();
        let entry = state.entries.get(key)?;
        Some(Snapshot {
            index: Arc::clone(&entry.index),
            generation: entry.generation,
            epoch: state.epoch(key),
            dirty: entry.is_dirty(),
        })
    }

    /// Records a successful upload of the snapshot taken at `generation`.
    pub fn mark_persisted(
        &self,
        key: &CacheKey,
        epoch: u64,
        generation: u64,
        document_id: String,
        version_tag: String,
    ) -> bool {
        let mut state = self.state.lock_ignore_poison();
        if state.epoch(key) != epoch {
            return false;
        }
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        let mut index = (*entry.index).clone();
        index.remote_document_id = Some(document_id);
        index.remote_version_tag = Some(version_tag);
        entry.index = Arc::new(index);
        entry.persisted_generation = entry.persisted_generation.max(generation);
        entry.persists += 1;
        true
    }

    pub fn is_dirty(&self, key: &CacheKey) -> bool {
        self.state
            .lock_ignore_poison()
            .entries
            .get(key)
            .is_some_and(CacheEntry::is_dirty)
    }

    pub fn dirty_keys(&self) -> Vec<CacheKey> {
        self.state
            .lock_ignore_poison()
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_dirty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state.lock_ignore_poison();
        state.entries.remove(key);
        state.loading.remove(key);
        *state.epochs.entry(key.clone()).or_default() += 1;
    }

    pub fn clear(&self) {
        let mut state = self.state.lock_ignore_poison();
        let keys: HashSet<CacheKey> = state
            .entries
            .keys()
            .chain(state.loading.keys())
            .chain(state.epochs.keys())
            .cloned()
            .collect();
        state.entries.clear();
        state.loading.clear();
        for key in keys {
            *state.epochs.entry(key).or_default() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Category, MonthBucket, YearBucket};

    fn key() -> CacheKey {
        CacheKey::new("drive", Category::Default)
    }

    fn index_with(year: i32, month: u32, photos: u32) -> LibraryIndex {
        LibraryIndex {
            years: vec![YearBucket {
                year,
                months: vec![MonthBucket {
                    month,
                    photos_this_month: photos,
                    days: Vec::new(),
                    source_timestamp: 1,
                }],
            }],
            total_photo_count: u64::from(photos),
            last_updated: 1,
            ..LibraryIndex::default()
        }
    }

    #[test]
    fn fetched_entries_start_clean_and_mutations_make_them_dirty() {
        let cache = LocalCache::default();
        let start = cache.begin_load(&key());
        assert_eq!(cache.lookup(&key()), CacheLookup::Loading);

        cache.merge_fetched(&key(), start.epoch, index_with(2024, 1, 3), Some(start.persists)).unwrap();
        cache.end_load(&key(), start.epoch);
        assert!(!cache.is_dirty(&key()));

        cache.update(&key(), |index| Some(index.clone())).unwrap();
        assert!(cache.is_dirty(&key()));
        assert_eq!(cache.dirty_keys(), vec![key()]);
    }

    #[test]
    fn mutation_during_persist_stays_dirty() {
        let cache = LocalCache::default();
        cache.put_rebuilt(&key(), 0, index_with(2024, 1, 3)).unwrap();
        let snapshot = cache.snapshot(&key()).unwrap();
        assert!(snapshot.dirty);

        cache.update(&key(), |index| Some(index.clone())).unwrap();
        assert!(cache.mark_persisted(&key(), snapshot.epoch, snapshot.generation, "doc".into(), "v2".into()));

        assert!(cache.is_dirty(&key()));
        let index = cache.get(&key()).unwrap();
        assert_eq!(index.remote_document_id.as_deref(), Some("doc"));
        assert_eq!(index.remote_version_tag.as_deref(), Some("v2"));
    }

    #[test]
    fn invalidation_drops_late_responses() {
        let cache = LocalCache::default();
        let start = cache.begin_load(&key());
        cache.invalidate(&key());

        assert!(cache.merge_fetched(&key(), start.epoch, index_with(2024, 1, 3), None).is_none());
        assert!(cache.put_rebuilt(&key(), start.epoch, index_with(2024, 1, 3)).is_none());
        assert_eq!(cache.lookup(&key()), CacheLookup::Missing);
    }

    #[test]
    fn stale_end_load_keeps_newer_marker() {
        let cache = LocalCache::default();
        let old = cache.begin_load(&key());
        cache.invalidate(&key());
        let new = cache.begin_load(&key());

        cache.end_load(&key(), old.epoch);
        assert_eq!(cache.lookup(&key()), CacheLookup::Loading);
        cache.end_load(&key(), new.epoch);
        assert_eq!(cache.lookup(&key()), CacheLookup::Missing);
    }

    #[test]
    fn merge_into_dirty_entry_keeps_it_dirty_and_adopts_fetched_identity() {
        let cache = LocalCache::default();
        cache.put_rebuilt(&key(), 0, index_with(2024, 1, 3)).unwrap();

        let fetched = LibraryIndex {
            remote_document_id: Some("doc".into()),
            remote_version_tag: Some("v7".into()),
            ..index_with(2023, 6, 2)
        };
        let merged = cache.merge_fetched(&key(), 0, fetched, None).unwrap();

        assert!(cache.is_dirty(&key()));
        assert_eq!(merged.photos_in_month(2024, 1), Some(3));
        assert_eq!(merged.photos_in_month(2023, 6), Some(2));
        assert_eq!(merged.remote_version_tag.as_deref(), Some("v7"));
    }

    #[test]
    fn read_started_before_an_upload_keeps_the_uploaded_tag() {
        let cache = LocalCache::default();
        cache.put_rebuilt(&key(), 0, index_with(2024, 1, 3)).unwrap();
        let snapshot = cache.snapshot(&key()).unwrap();
        assert!(cache.mark_persisted(&key(), snapshot.epoch, snapshot.generation, "doc".into(), "v1".into()));

        let start = cache.begin_load(&key());
        assert!(cache.mark_persisted(&key(), start.epoch, snapshot.generation, "doc".into(), "v2".into()));
        let fetched = LibraryIndex {
            remote_document_id: Some("doc".into()),
            remote_version_tag: Some("v1".into()),
            ..index_with(2024, 1, 3)
        };

        let merged = cache.merge_fetched(&key(), start.epoch, fetched.clone(), Some(start.persists)).unwrap();
        assert_eq!(merged.remote_version_tag.as_deref(), Some("v2"));

        // A fetch made after the upload is taken at its word
        let merged = cache.merge_fetched(&key(), start.epoch, fetched, None).unwrap();
        assert_eq!(merged.remote_version_tag.as_deref(), Some("v1"));
    }

    #[test]
    fn clear_invalidates_every_known_key() {
        let cache = LocalCache::default();
        let other = CacheKey::new("drive", Category::Favorites);
        cache.put_rebuilt(&key(), 0, index_with(2024, 1, 3)).unwrap();
        let pending = cache.begin_load(&other);

        cache.clear();
        assert!(cache.get(&key()).is_none());
        assert!(cache.merge_fetched(&other, pending.epoch, index_with(2024, 1, 1), None).is_none());
        assert!(cache.dirty_keys().is_empty());
    }

    #[test]
    fn update_on_missing_key_is_a_no_op() {
        let cache = LocalCache::default();
        assert!(cache.update(&key(), |index| Some(index.clone())).is_none());
    }
}
