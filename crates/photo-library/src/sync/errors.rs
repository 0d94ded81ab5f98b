//! Error types for the remote store seam and the sync layer.

use std::fmt;

use crate::library::CacheKey;

// ── Remote store errors ──────────────────────────────────────────────

/// Errors reported by a [`RemoteStore`](super::RemoteStore) implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The upload carried a stale version tag (or none, for an existing document).
    VersionConflict { document_id: String },
    /// The referenced document doesn't exist.
    NotFound { document_id: String },
    /// Network-level failure. Worth retrying on the next cycle.
    Transport(String),
    Other(String),
}

impl RemoteError {
    /// Conflicts are a control-flow branch (fetch, merge, retry), not a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::VersionConflict { .. })
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::VersionConflict { document_id } => {
                write!(f, "Version conflict on document {document_id}")
            }
            RemoteError::NotFound { document_id } => write!(f, "Document not found: {document_id}"),
            RemoteError::Transport(msg) => write!(f, "Transport error: {msg}"),
            RemoteError::Other(msg) => write!(f, "Remote store error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

// ── Sync errors ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Remote(RemoteError),
    /// The index couldn't be turned into a document payload.
    Serialization(String),
    /// Every fetch-merge-persist round hit a version conflict.
    ConflictRetriesExhausted { key: CacheKey, attempts: u32 },
}

impl SyncError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_conflict())
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        SyncError::Remote(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Remote(e) => write!(f, "{e}"),
            SyncError::Serialization(msg) => write!(f, "Couldn't serialize library index: {msg}"),
            SyncError::ConflictRetriesExhausted { key, attempts } => {
                write!(f, "Gave up persisting {key} after {attempts} conflicting attempts")
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Remote(e) => Some(e),
            _ => None,
        }
    }
}
