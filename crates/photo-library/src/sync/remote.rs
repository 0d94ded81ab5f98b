//! The remote metadata store seam.
//!
//! The store holds the photos themselves plus one JSON index document per
//! (drive, category). Only three operations are consumed: a filtered query, a
//! changed-since query, and an optimistic-concurrency upload.

use std::future::Future;
use std::sync::Arc;

use crate::library::{ArchivalStatus, CacheKey, Category, LibraryIndex, PhotoRecord, SyncCursor};
use crate::sync::errors::RemoteError;

/// File type of the per-category library index documents.
pub const LIBRARY_INDEX_FILE_TYPE: u32 = 900;
/// File type of uploaded photos and videos.
pub const MEDIA_FILE_TYPE: u32 = 0;
/// Tag carried by every non-favorites index document.
pub const MAIN_TAG: &str = "main-lib";
/// Tag on favorited photos, and on the favorites index document.
pub const FAVORITE_TAG: &str = "favorite";
/// Duplicate index documents are detected, not paged through.
pub(crate) const INDEX_DOCUMENT_QUERY_LIMIT: usize = 2;

// ── Types ────────────────────────────────────────────────────────────

/// A file as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub file_id: String,
    pub file_type: u32,
    pub version_tag: String,
    /// Server-side creation time (ms since epoch).
    pub created: i64,
    /// Server-side time of the last write (ms since epoch).
    pub updated: i64,
    pub user_date: Option<i64>,
    pub archival_status: ArchivalStatus,
    pub tags: Vec<String>,
    /// JSON payload, for documents.
    pub content: Option<String>,
    /// Tombstone reported by changed-since queries.
    pub is_deleted: bool,
}

impl RemoteFile {
    pub fn to_photo_record(&self) -> PhotoRecord {
        PhotoRecord {
            id: self.file_id.clone(),
            created: self.created,
            user_date: self.user_date,
            archival_status: self.archival_status,
            tags: self.tags.clone(),
        }
    }
}

/// Which files a query returns. Empty lists don't constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub file_types: Vec<u32>,
    pub tags_match_at_least_one: Vec<String>,
    pub tags_match_all: Vec<String>,
    pub archival_status: Vec<ArchivalStatus>,
}

impl QueryFilter {
    /// Photos belonging to a category.
    pub fn photos(category: Category) -> Self {
        Self {
            file_types: vec![MEDIA_FILE_TYPE],
            tags_match_at_least_one: Vec::new(),
            tags_match_all: match category {
                Category::Favorites => vec![FAVORITE_TAG.to_string()],
                _ => Vec::new(),
            },
            archival_status: category.photo_archival_statuses().to_vec(),
        }
    }

    /// The category's index document.
    pub fn index_document(category: Category) -> Self {
        Self {
            file_types: vec![LIBRARY_INDEX_FILE_TYPE],
            tags_match_at_least_one: vec![index_document_tag(category).to_string()],
            tags_match_all: Vec::new(),
            archival_status: vec![category.document_archival_status()],
        }
    }

    pub fn matches(&self, file: &RemoteFile) -> bool {
        let has_tag = |wanted: &String| file.tags.iter().any(|t| t == wanted);
        (self.file_types.is_empty() || self.file_types.contains(&file.file_type))
            && (self.tags_match_at_least_one.is_empty() || self.tags_match_at_least_one.iter().any(has_tag))
            && self.tags_match_all.iter().all(has_tag)
            && (self.archival_status.is_empty() || self.archival_status.contains(&file.archival_status))
    }
}

fn index_document_tag(category: Category) -> &'static str {
    match category {
        Category::Favorites => FAVORITE_TAG,
        _ => MAIN_TAG,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub max_records: usize,
    /// Continuation token from a previous [`QueryBatch`].
    pub page_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    pub files: Vec<RemoteFile>,
    /// Continuation token when more results are available.
    pub cursor: Option<String>,
    /// Point in the change stream this batch is consistent with.
    pub query_time: SyncCursor,
}

/// A document write. `document_id: None` creates a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub document_id: Option<String>,
    /// Must match the stored document's current tag when `document_id` is set.
    pub version_tag: Option<String>,
    pub payload_json: String,
    pub file_type: u32,
    pub tags: Vec<String>,
    pub archival_status: ArchivalStatus,
}

impl UploadRequest {
    /// Upload of `index` as the index document for `key`.
    pub fn for_index(key: &CacheKey, index: &LibraryIndex) -> Result<Self, serde_json::Error> {
        Ok(Self {
            document_id: index.remote_document_id.clone(),
            version_tag: index.remote_version_tag.clone(),
            payload_json: serde_json::to_string(index)?,
            file_type: LIBRARY_INDEX_FILE_TYPE,
            tags: vec![index_document_tag(key.category).to_string()],
            archival_status: key.category.document_archival_status(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub document_id: String,
    pub new_version_tag: String,
}

// ── Trait ────────────────────────────────────────────────────────────

/// Remote metadata store operations consumed by the sync layer.
///
/// Timeouts are the implementation's business. Futures must be `Send` so flushes can
/// run on spawned tasks.
pub trait RemoteStore: Send + Sync + 'static {
    fn query_by_filter(
        &self,
        drive: &str,
        filter: &QueryFilter,
        options: QueryOptions,
    ) -> impl Future<Output = Result<QueryBatch, RemoteError>> + Send;

    /// Files written after `since`, tombstones included.
    fn query_changed_since(
        &self,
        drive: &str,
        filter: &QueryFilter,
        since: SyncCursor,
        max_records: usize,
    ) -> impl Future<Output = Result<QueryBatch, RemoteError>> + Send;

    /// Fails with [`RemoteError::VersionConflict`] when the tag is stale.
    fn upload_document(
        &self,
        drive: &str,
        request: UploadRequest,
    ) -> impl Future<Output = Result<UploadResult, RemoteError>> + Send;
}

impl<T: RemoteStore> RemoteStore for Arc<T> {
    fn query_by_filter(
        &self,
        drive: &str,
        filter: &QueryFilter,
        options: QueryOptions,
    ) -> impl Future<Output = Result<QueryBatch, RemoteError>> + Send {
        (**self).query_by_filter(drive, filter, options)
    }

    fn query_changed_since(
        &self,
        drive: &str,
        filter: &QueryFilter,
        since: SyncCursor,
        max_records: usize,
    ) -> impl Future<Output = Result<QueryBatch, RemoteError>> + Send {
        (**self).query_changed_since(drive, filter, since, max_records)
    }

    fn upload_document(
        &self,
        drive: &str,
        request: UploadRequest,
    ) -> impl Future<Output = Result<UploadResult, RemoteError>> + Send {
        (**self).upload_document(drive, request)
    }
}
