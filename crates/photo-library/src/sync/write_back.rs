//! Write-back: delayed flush tasks and the conflict-checked persist loop.

use log::{debug, error, info, warn};
use tokio::runtime::Handle;

use crate::library::CacheKey;
use crate::sync::LibrarySync;
use crate::sync::errors::{RemoteError, SyncError};
use crate::sync::read_path::RemoteLookup;
use crate::sync::remote::{RemoteStore, UploadRequest};
use crate::sync::scheduler::{Begin, FlushOutcome};

impl<S: RemoteStore> LibrarySync<S> {
    /// Schedules a flush of `key` after the quiet window, unless one is already pending.
    pub(super) fn request_flush(&self, key: &CacheKey) {
        if let Some(ticket) = self.inner.scheduler.request(key) {
            debug!(
                "Flush of {key} scheduled in {:?}",
                self.inner.config.flush_quiet_window
            );
            self.spawn_delayed_flush(key.clone(), ticket);
        }
    }

    /// Runs the delayed flush for `ticket`, then any follow-up flushes requested while it ran.
    pub(super) fn spawn_delayed_flush(&self, key: CacheKey, ticket: u64) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, {key} stays dirty until flushed manually");
            self.inner.scheduler.cancel(&key, ticket);
            return;
        };
        let sync = self.clone();
        runtime.spawn(async move {
            let mut ticket = ticket;
            loop {
                tokio::time::sleep(sync.inner.config.flush_quiet_window).await;
                match sync.flush_with_ticket(&key, Some(ticket)).await {
                    (_, Some(next)) => ticket = next,
                    (_, None) => break,
                }
            }
        });
    }

    /// Persists `key` in the background without waiting for the quiet window.
    pub(super) fn spawn_flush(&self, key: CacheKey) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, {key} stays dirty until flushed manually");
            return;
        };
        let sync = self.clone();
        runtime.spawn(async move {
            // Failures are logged and kept in `last_flush`
            let _ = sync.flush_now(&key).await;
        });
    }

    /// One pass through the state machine. Returns the outcome and, if mutations
    /// arrived during the flush, the ticket of the follow-up flush.
    pub(super) async fn flush_with_ticket(
        &self,
        key: &CacheKey,
        ticket: Option<u64>,
    ) -> (Result<FlushOutcome, SyncError>, Option<u64>) {
        match self.inner.scheduler.begin(key, ticket) {
            Begin::Started => {}
            Begin::Superseded => return (Ok(FlushOutcome::Skipped), None),
            Begin::AlreadyFlushing => return (Ok(FlushOutcome::AlreadyFlushing), None),
        }
        let result = self.persist(key).await;
        let next = self.inner.scheduler.finish(key, result.clone());
        (result, next)
    }

    /// Uploads the cached index, re-fetching and merging on every version conflict
    /// until the store accepts it or the retry budget runs out.
    async fn persist(&self, key: &CacheKey) -> Result<FlushOutcome, SyncError> {
        let inner = &self.inner;
        let mut attempts = 0u32;
        loop {
            let Some(snapshot) = inner.cache.snapshot(key) else {
                return Ok(FlushOutcome::Skipped);
            };
            if !snapshot.dirty {
                return Ok(FlushOutcome::Clean);
            }

            // A rebuilt index doesn't know its document yet. Adopt the existing one
            // instead of creating a second.
            if snapshot.index.remote_document_id.is_none() {
                let adopted = match self.fetch_remote_document(key, None).await? {
                    RemoteLookup::Found(existing) => {
                        debug!("Adopting existing index document for {key}");
                        Some(inner.cache.merge_fetched(key, snapshot.epoch, existing.index, None).is_some())
                    }
                    RemoteLookup::Unreadable { document_id, version_tag } => {
                        debug!("Overwriting unreadable index document {document_id} for {key}");
                        Some(inner.cache.set_identity(key, snapshot.epoch, Some(document_id), Some(version_tag)))
                    }
                    RemoteLookup::Absent => None,
                };
                match adopted {
                    Some(true) => continue,
                    Some(false) => return Ok(FlushOutcome::Skipped),
                    None => {}
                }
            }

            attempts += 1;
            let request = UploadRequest::for_index(key, &snapshot.index)?;
            match inner.store.upload_document(&key.drive, request).await {
                Ok(uploaded) => {
                    let version_tag = uploaded.new_version_tag.clone();
                    let kept = inner.cache.mark_persisted(
                        key,
                        snapshot.epoch,
                        snapshot.generation,
                        uploaded.document_id,
                        uploaded.new_version_tag,
                    );
                    if !kept {
                        debug!("{key} was invalidated while persisting, dropping the new version tag");
                    }
                    debug!("Persisted library index {key} after {attempts} attempt(s)");
                    return Ok(FlushOutcome::Persisted { attempts, version_tag });
                }
                Err(err @ (RemoteError::VersionConflict { .. } | RemoteError::NotFound { .. })) => {
                    if attempts > inner.config.max_conflict_retries {
                        error!("Giving up on {key} after {attempts} attempts, last error: {err}");
                        return Err(SyncError::ConflictRetriesExhausted {
                            key: key.clone(),
                            attempts,
                        });
                    }
                    let delay = inner.config.conflict_backoff(attempts);
                    info!("{err} while persisting {key}, re-fetching and retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    self.absorb_remote_copy(key, snapshot.epoch).await?;
                    if inner.cache.snapshot(key).is_none_or(|s| s.epoch != snapshot.epoch) {
                        return Ok(FlushOutcome::Skipped);
                    }
                }
                Err(err) => {
                    warn!("Couldn't persist library index {key}, will retry on the next flush: {err}");
                    return Err(err.into());
                }
            }
        }
    }

    /// Merges the current remote document into the cache, or forgets the cached
    /// document identity if the remote one is gone.
    async fn absorb_remote_copy(&self, key: &CacheKey, epoch: u64) -> Result<(), SyncError> {
        match self.fetch_remote_document(key, None).await {
            Ok(RemoteLookup::Found(remote)) => {
                self.inner.cache.merge_fetched(key, epoch, remote.index, None);
                Ok(())
            }
            Ok(RemoteLookup::Unreadable { document_id, version_tag }) => {
                self.inner.cache.set_identity(key, epoch, Some(document_id), Some(version_tag));
                Ok(())
            }
            Ok(RemoteLookup::Absent) => {
                self.inner.cache.set_identity(key, epoch, None, None);
                Ok(())
            }
            Err(err) => {
                warn!("Couldn't re-fetch {key} after a conflict: {err}");
                Err(err.into())
            }
        }
    }
}
