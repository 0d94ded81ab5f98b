// Warn on redundant path prefixes (e.g., std::sync::Arc when Arc is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Photo library index: a year → month photo-count aggregate kept in sync with a
//! remote metadata store.
//!
//! - [`library`] is the pure core: building, mutating, and merging indexes.
//! - [`sync`] owns the process-wide cache, the read path, and the write-back scheduler.
//! - [`gallery`] turns an index into the ordering the gallery scrolls and selects over.

pub mod config;
pub mod gallery;
mod ignore_poison;
pub mod library;
pub mod sync;

pub use config::LibraryConfig;
pub use library::{CacheKey, Category, DayBucket, LibraryIndex, MonthBucket, PhotoRecord, YearBucket};
pub use sync::{IndexLookup, LibrarySync};
