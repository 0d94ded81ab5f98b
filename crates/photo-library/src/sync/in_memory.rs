//! In-memory remote store for tests and local development.
//!
//! Behaves like the real store where the sync layer cares: version tags rotate on
//! every write, stale tags are rejected, and every write advances a logical clock.
//! Faults can be injected to exercise the conflict and failure paths.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use crate::ignore_poison::IgnorePoison;
use crate::library::{CacheKey, Category, LibraryIndex, PhotoRecord, SyncCursor};
use crate::sync::errors::RemoteError;
use crate::sync::remote::{
    MEDIA_FILE_TYPE, QueryBatch, QueryFilter, QueryOptions, RemoteFile, RemoteStore, UploadRequest, UploadResult,
};

#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    drives: HashMap<String, Vec<RemoteFile>>,
    /// Logical time, ms since epoch. Never goes backwards.
    now: i64,
    latency: Duration,
    forced_conflicts: u32,
    forced_failures: u32,
    forced_query_failures: u32,
    uploads: u32,
    queries: u32,
}

impl StoreState {
    /// Advances the logical clock for a write and returns the write's timestamp.
    fn tick(&mut self) -> i64 {
        self.now += 1;
        self.now
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the logical clock forward to `millis`. Earlier times are ignored.
    pub fn set_time(&self, millis: i64) {
        let mut state = self.state.lock_ignore_poison();
        state.now = state.now.max(millis);
    }

    pub fn now(&self) -> i64 {
        self.state.lock_ignore_poison().now
    }

    /// Delay applied to every operation, on the tokio clock.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock_ignore_poison().latency = latency;
    }

    /// Rejects the next `count` uploads with a version conflict, whatever their tag.
    pub fn reject_next_uploads_as_conflict(&self, count: u32) {
        self.state.lock_ignore_poison().forced_conflicts = count;
    }

    /// Fails the next `count` uploads with a transport error.
    pub fn fail_next_uploads(&self, count: u32) {
        self.state.lock_ignore_poison().forced_failures = count;
    }

    /// Fails the next `count` queries with a transport error.
    pub fn fail_next_queries(&self, count: u32) {
        self.state.lock_ignore_poison().forced_query_failures = count;
    }

    /// Upload attempts so far, rejected ones included.
    pub fn upload_count(&self) -> u32 {
        self.state.lock_ignore_poison().uploads
    }

    pub fn query_count(&self) -> u32 {
        self.state.lock_ignore_poison().queries
    }

    /// Adds a photo as if it had just been uploaded. The clock catches up to its creation time.
    pub fn insert_photo(&self, drive: &str, photo: &PhotoRecord) {
        let mut state = self.state.lock_ignore_poison();
        state.now = state.now.max(photo.created);
        let file = RemoteFile {
            file_id: photo.id.clone(),
            file_type: MEDIA_FILE_TYPE,
            version_tag: Uuid::new_v4().to_string(),
            created: photo.created,
            updated: state.now,
            user_date: photo.user_date,
            archival_status: photo.archival_status,
            tags: photo.tags.clone(),
            content: None,
            is_deleted: false,
        };
        state.drives.entry(drive.to_string()).or_default().push(file);
    }

    /// Writes an index document directly, bypassing version checks. Simulates another
    /// writer: replaces the category's document if one exists, else creates it.
    pub fn write_document(
        &self,
        drive: &str,
        category: Category,
        index: &LibraryIndex,
    ) -> Result<UploadResult, RemoteError> {
        let mut request = UploadRequest::for_index(&CacheKey::new(drive, category), index)
            .map_err(|e| RemoteError::Other(e.to_string()))?;
        let filter = QueryFilter::index_document(category);
        let mut state = self.state.lock_ignore_poison();
        let existing = state
            .drives
            .get(drive)
            .and_then(|files| files.iter().find(|f| !f.is_deleted && filter.matches(f)));
        request.document_id = existing.map(|f| f.file_id.clone());
        request.version_tag = existing.map(|f| f.version_tag.clone());
        store_upload(&mut state, drive, request)
    }

    /// The category's index document as currently stored.
    pub fn document(&self, drive: &str, category: Category) -> Option<LibraryIndex> {
        let filter = QueryFilter::index_document(category);
        let state = self.state.lock_ignore_poison();
        let file = state
            .drives
            .get(drive)?
            .iter()
            .find(|f| !f.is_deleted && filter.matches(f))?;
        let mut index: LibraryIndex = serde_json::from_str(file.content.as_deref()?).ok()?;
        index.remote_document_id = Some(file.file_id.clone());
        index.remote_version_tag = Some(file.version_tag.clone());
        Some(index)
    }

    /// Number of live index documents for a category. More than one is a broken state.
    pub fn document_count(&self, drive: &str, category: Category) -> usize {
        let filter = QueryFilter::index_document(category);
        let state = self.state.lock_ignore_poison();
        state
            .drives
            .get(drive)
            .map(|files| files.iter().filter(|f| !f.is_deleted && filter.matches(f)).count())
            .unwrap_or(0)
    }

    /// Stores a raw document payload, for malformed-content cases.
    pub fn write_raw_document(
        &self,
        drive: &str,
        category: Category,
        payload_json: &str,
    ) -> Result<UploadResult, RemoteError> {
        let template = UploadRequest::for_index(&CacheKey::new(drive, category), &LibraryIndex::default())
            .map_err(|e| RemoteError::Other(e.to_string()))?;
        let request = UploadRequest {
            payload_json: payload_json.to_string(),
            ..template
        };
        let mut state = self.state.lock_ignore_poison();
        store_upload(&mut state, drive, request)
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock_ignore_poison().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn select(
        &self,
        drive: &str,
        max_records: usize,
        skip: usize,
        keep: impl Fn(&RemoteFile) -> bool,
    ) -> Result<QueryBatch, RemoteError> {
        let mut state = self.state.lock_ignore_poison();
        state.queries += 1;
        if state.forced_query_failures > 0 {
            state.forced_query_failures -= 1;
            return Err(RemoteError::Transport("injected failure".into()));
        }
        let matching: Vec<&RemoteFile> = state
            .drives
            .get(drive)
            .map(|files| files.iter().filter(|f| keep(f)).collect())
            .unwrap_or_default();
        let files: Vec<RemoteFile> = matching.iter().skip(skip).take(max_records).map(|f| (*f).clone()).collect();
        let next = skip + files.len();
        Ok(QueryBatch {
            cursor: (next < matching.len()).then(|| next.to_string()),
            files,
            query_time: SyncCursor::from_millis(state.now),
        })
    }
}

fn store_upload(state: &mut StoreState, drive: &str, request: UploadRequest) -> Result<UploadResult, RemoteError> {
    let now = state.tick();
    let new_tag = Uuid::new_v4().to_string();
    let files = state.drives.entry(drive.to_string()).or_default();

    let Some(document_id) = request.document_id else {
        let document_id = Uuid::new_v4().to_string();
        files.push(RemoteFile {
            file_id: document_id.clone(),
            file_type: request.file_type,
            version_tag: new_tag.clone(),
            created: now,
            updated: now,
            user_date: None,
            archival_status: request.archival_status,
            tags: request.tags,
            content: Some(request.payload_json),
            is_deleted: false,
        });
        return Ok(UploadResult {
            document_id,
            new_version_tag: new_tag,
        });
    };

    let file = files
        .iter_mut()
        .find(|f| f.file_id == document_id && !f.is_deleted)
        .ok_or_else(|| RemoteError::NotFound {
            document_id: document_id.clone(),
        })?;
    if request.version_tag.as_deref() != Some(file.version_tag.as_str()) {
        return Err(RemoteError::VersionConflict { document_id });
    }
    file.version_tag = new_tag.clone();
    file.updated = now;
    file.archival_status = request.archival_status;
    file.tags = request.tags;
    file.content = Some(request.payload_json);
    Ok(UploadResult {
        document_id,
        new_version_tag: new_tag,
    })
}

impl RemoteStore for InMemoryRemoteStore {
    async fn query_by_filter(
        &self,
        drive: &str,
        filter: &QueryFilter,
        options: QueryOptions,
    ) -> Result<QueryBatch, RemoteError> {
        self.simulate_latency().await;
        let skip = match options.page_cursor.as_deref() {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| RemoteError::Other(format!("Invalid page cursor: {cursor}")))?,
            None => 0,
        };
        self.select(drive, options.max_records, skip, |f| !f.is_deleted && filter.matches(f))
    }

    async fn query_changed_since(
        &self,
        drive: &str,
        filter: &QueryFilter,
        since: SyncCursor,
        max_records: usize,
    ) -> Result<QueryBatch, RemoteError> {
        self.simulate_latency().await;
        self.select(drive, max_records, 0, |f| f.updated > since.0 && filter.matches(f))
    }

    async fn upload_document(&self, drive: &str, request: UploadRequest) -> Result<UploadResult, RemoteError> {
        self.simulate_latency().await;
        let mut state = self.state.lock_ignore_poison();
        state.uploads += 1;
        if state.forced_failures > 0 {
            state.forced_failures -= 1;
            return Err(RemoteError::Transport("injected failure".into()));
        }
        if state.forced_conflicts > 0 {
            state.forced_conflicts -= 1;
            return Err(RemoteError::VersionConflict {
                document_id: request.document_id.unwrap_or_default(),
            });
        }
        store_upload(&mut state, drive, request)
    }
}
