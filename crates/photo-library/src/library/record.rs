//! Photo records as read from the remote store, and the cache key they are indexed under.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Archival partition a remote file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ArchivalStatus {
    #[default]
    None,
    Archived,
    Deleted,
    Imported,
}

/// One of the mutually exclusive photo partitions, each indexed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    #[default]
    Default,
    Archived,
    Deleted,
    FromExternalApps,
    Favorites,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Default,
        Category::Archived,
        Category::Deleted,
        Category::FromExternalApps,
        Category::Favorites,
    ];

    /// Archival statuses of the photos that belong to this category.
    pub fn photo_archival_statuses(self) -> &'static [ArchivalStatus] {
        match self {
            Category::Default => &[ArchivalStatus::None],
            Category::Archived => &[ArchivalStatus::Archived],
            Category::Deleted => &[ArchivalStatus::Deleted],
            Category::FromExternalApps => &[ArchivalStatus::Imported],
            Category::Favorites => &[ArchivalStatus::None, ArchivalStatus::Archived, ArchivalStatus::Imported],
        }
    }

    /// Archival status the category's index document itself is stored with.
    pub fn document_archival_status(self) -> ArchivalStatus {
        match self {
            Category::Default | Category::Favorites => ArchivalStatus::None,
            Category::Archived => ArchivalStatus::Archived,
            Category::Deleted => ArchivalStatus::Deleted,
            Category::FromExternalApps => ArchivalStatus::Imported,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Default => "default",
            Category::Archived => "archived",
            Category::Deleted => "deleted",
            Category::FromExternalApps => "fromExternalApps",
            Category::Favorites => "favorites",
        };
        f.write_str(name)
    }
}

/// Identifies one index: a drive plus a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub drive: String,
    pub category: Category,
}

impl CacheKey {
    pub fn new(drive: impl Into<String>, category: Category) -> Self {
        Self {
            drive: drive.into(),
            category,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.drive, self.category)
    }
}

/// A photo as the index sees it. Owned by the remote store; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    /// Upload time, ms since epoch.
    pub created: i64,
    /// User-assigned capture date, ms since epoch. Takes precedence over `created`.
    pub user_date: Option<i64>,
    pub archival_status: ArchivalStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PhotoRecord {
    /// Calendar date the photo is filed under: `user_date` if set, else `created`.
    ///
    /// `None` only for timestamps outside chrono's representable range.
    pub fn capture_date(&self, offset: &FixedOffset) -> Option<NaiveDate> {
        let millis = self.user_date.unwrap_or(self.created);
        DateTime::from_timestamp_millis(millis).map(|utc| utc.with_timezone(offset).date_naive())
    }
}
