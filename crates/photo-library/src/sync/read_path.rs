//! Read path: fetch the remote document, fold in new photos, merge with the cache,
//! and fall back to a full rebuild when nothing exists yet.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::library::{CacheKey, LibraryIndex, SyncCursor, add_day, build_index};
use crate::sync::LibrarySync;
use crate::sync::cache::LoadStart;
use crate::sync::errors::{RemoteError, SyncError};
use crate::sync::remote::{
    INDEX_DOCUMENT_QUERY_LIMIT, LIBRARY_INDEX_FILE_TYPE, QueryFilter, QueryOptions, RemoteFile, RemoteStore,
};

/// An index document as fetched, with its remote identity filled in.
#[derive(Debug, Clone)]
pub(crate) struct RemoteDocument {
    pub index: LibraryIndex,
    /// Server time of the document's last write.
    pub updated: i64,
}

/// What the remote store holds for a key.
#[derive(Debug, Clone)]
pub(crate) enum RemoteLookup {
    Found(RemoteDocument),
    /// A document exists but its payload can't be read. Reads treat it as absent;
    /// writes overwrite it.
    Unreadable { document_id: String, version_tag: String },
    Absent,
}

impl<S: RemoteStore> LibrarySync<S> {
    /// Runs the full read path for `key` and caches the result.
    ///
    /// Fetch failures fall back to the cached entry when there is one. If the key is
    /// invalidated mid-read, the result is returned but not cached.
    pub(super) async fn run_read_path(&self, key: &CacheKey) -> Result<Arc<LibraryIndex>, SyncError> {
        let start = self.inner.cache.begin_load(key);
        let epoch = start.epoch;
        let result = self.read_through(key, start).await;
        self.inner.cache.end_load(key, epoch);
        result
    }

    async fn read_through(&self, key: &CacheKey, start: LoadStart) -> Result<Arc<LibraryIndex>, SyncError> {
        let LoadStart { epoch, local, persists } = start;
        let cursor = local.as_ref().and_then(|index| index.last_sync_cursor);
        let fetched = match self.fetch_remote_document(key, cursor).await {
            Ok(fetched) => fetched,
            Err(err) => {
                return match local {
                    Some(local) => {
                        warn!("Couldn't fetch library index {key}, serving the cached copy: {err}");
                        Ok(local)
                    }
                    None => Err(err.into()),
                };
            }
        };

        match (fetched, local) {
            (RemoteLookup::Found(mut remote), _) => {
                if let Err(err) = self.catch_up(key, &mut remote.index, remote.updated).await {
                    warn!("Couldn't catch up on new photos for {key}: {err}");
                }
                Ok(match self.inner.cache.merge_fetched(key, epoch, remote.index.clone(), Some(persists)) {
                    Some(merged) => merged,
                    None => Arc::new(remote.index),
                })
            }
            (RemoteLookup::Unreadable { .. } | RemoteLookup::Absent, Some(local)) => {
                self.inner.cache.mark_checked(key, epoch);
                Ok(local)
            }
            (RemoteLookup::Unreadable { .. } | RemoteLookup::Absent, None) => self.rebuild(key, epoch).await,
        }
    }

    /// Looks up the category's index document. With a cursor, only a document written
    /// since then counts.
    pub(crate) async fn fetch_remote_document(
        &self,
        key: &CacheKey,
        since: Option<SyncCursor>,
    ) -> Result<RemoteLookup, RemoteError> {
        let store = &self.inner.store;
        let filter = QueryFilter::index_document(key.category);
        let batch = match since {
            Some(cursor) => {
                store
                    .query_changed_since(&key.drive, &filter, cursor, INDEX_DOCUMENT_QUERY_LIMIT)
                    .await?
            }
            None => {
                let options = QueryOptions {
                    max_records: INDEX_DOCUMENT_QUERY_LIMIT,
                    page_cursor: None,
                };
                store.query_by_filter(&key.drive, &filter, options).await?
            }
        };

        let live: Vec<&RemoteFile> = batch.files.iter().filter(|f| !f.is_deleted).collect();
        let Some(file) = live.first() else {
            return Ok(RemoteLookup::Absent);
        };
        if live.len() > 1 {
            error!("Broken state: more than one library index document for {key}, using the first");
        }

        let unreadable = || RemoteLookup::Unreadable {
            document_id: file.file_id.clone(),
            version_tag: file.version_tag.clone(),
        };
        let Some(content) = file.content.as_deref() else {
            warn!("Library index document {} for {key} has no content", file.file_id);
            return Ok(unreadable());
        };
        let mut index: LibraryIndex = match serde_json::from_str(content) {
            Ok(index) => index,
            Err(err) => {
                warn!("Malformed library index document {} for {key}: {err}", file.file_id);
                return Ok(unreadable());
            }
        };
        let dropped = index.normalize();
        if dropped > 0 {
            warn!(
                "Library index document {} for {key} had {dropped} duplicate or out-of-range entries, repaired",
                file.file_id
            );
        }
        index.remote_document_id = Some(file.file_id.clone());
        index.remote_version_tag = Some(file.version_tag.clone());
        index.last_sync_cursor = index.last_sync_cursor.max(Some(batch.query_time));
        debug!(
            "Fetched library index {key}: {} photos, version {}",
            index.total_photo_count, file.version_tag
        );

        Ok(RemoteLookup::Found(RemoteDocument {
            index,
            updated: file.updated,
        }))
    }

    /// Counts photos created after the document was last written.
    async fn catch_up(&self, key: &CacheKey, index: &mut LibraryIndex, since: i64) -> Result<(), RemoteError> {
        let config = &self.inner.config;
        if !config.catch_up_new_photos {
            return Ok(());
        }
        let filter = QueryFilter::photos(key.category);
        let batch = self
            .inner
            .store
            .query_changed_since(&key.drive, &filter, SyncCursor::from_millis(since), config.catch_up_batch_size)
            .await?;

        let mut added = 0u64;
        for file in &batch.files {
            if file.is_deleted || file.file_type == LIBRARY_INDEX_FILE_TYPE || file.created <= since {
                continue;
            }
            // Upload time, not now: a local correction made after the upload must outrank it
            if let Some(date) = file.to_photo_record().capture_date(&config.utc_offset) {
                *index = add_day(index, date, file.created);
                added += 1;
            }
        }
        if added > 0 {
            index.total_photo_count += added;
            debug!("Caught up on {added} new photo(s) for {key}");
        }
        Ok(())
    }

    /// Builds an index from one page of photos and persists it in the background.
    async fn rebuild(&self, key: &CacheKey, epoch: u64) -> Result<Arc<LibraryIndex>, SyncError> {
        let config = &self.inner.config;
        info!("No library index for {key}, rebuilding from up to {} photos", config.rebuild_page_size);

        let options = QueryOptions {
            max_records: config.rebuild_page_size,
            page_cursor: None,
        };
        let batch = self
            .inner
            .store
            .query_by_filter(&key.drive, &QueryFilter::photos(key.category), options)
            .await?;
        let records: Vec<_> = batch
            .files
            .iter()
            .filter(|f| !f.is_deleted)
            .map(RemoteFile::to_photo_record)
            .collect();

        let mut index = build_index(&records, &config.utc_offset, self.inner.clock.now_millis());
        index.last_sync_cursor = Some(batch.query_time);
        info!(
            "Rebuilt library index {key}: {} photos in {} years",
            index.total_photo_count,
            index.years.len()
        );

        match self.inner.cache.put_rebuilt(key, epoch, index.clone()) {
            Some(stored) => {
                self.spawn_flush(key.clone());
                Ok(stored)
            }
            None => Ok(Arc::new(index)),
        }
    }
}
