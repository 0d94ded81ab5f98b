//! Pure photo library index core.
//!
//! Everything here is synchronous and side-effect free: each operation takes an
//! index snapshot (plus any timestamp it needs) and returns a new one. Caching,
//! scheduling, and the remote store live in [`crate::sync`].
//!
//! - **Builder**: full rebuild from one page of photo records.
//! - **Mutator**: single-photo increments and authoritative month counts.
//! - **Merge**: reconcile a fetched copy with the local copy.

pub mod builder;
pub mod index;
pub mod merge;
pub mod mutator;
pub mod record;

#[cfg(test)]
mod merge_test;

pub use builder::build_index;
pub use index::{DayBucket, LibraryIndex, MonthBucket, SyncCursor, YearBucket};
pub use merge::merge;
pub use mutator::{add_day, update_count};
pub use record::{ArchivalStatus, CacheKey, Category, PhotoRecord};
