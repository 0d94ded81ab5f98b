//! Merge reconciler: combines a freshly fetched index with the local copy.
//!
//! Last writer wins at month granularity, decided by explicit provenance rather than
//! by where a month sits in a list:
//!
//! - Years or months present on one side only pass through unchanged.
//! - For a month on both sides, the greater `source_timestamp` wins.
//! - On a timestamp tie (legacy documents carry 0 everywhere), the side whose
//!   index-level `last_updated` is greater wins; a full tie goes to the fetched side.
//!
//! `total_photo_count` takes the max of both sides so a merge never shrinks the
//! visible count. `last_updated` and `last_sync_cursor` also take the max.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::library::index::{LibraryIndex, MonthBucket, YearBucket};

/// Which input a month was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Fetched,
    Local,
}

/// Merge `fetched` (authoritative remote result) with `local` (cache copy).
///
/// The result keeps the fetched side's remote document id and version tag when it has
/// one, since that pair describes what is on the server right now.
pub fn merge(fetched: &LibraryIndex, local: &LibraryIndex) -> LibraryIndex {
    // Tie-break for equal month timestamps
    let tie_winner = match local.last_updated.cmp(&fetched.last_updated) {
        Ordering::Greater => Side::Local,
        Ordering::Less | Ordering::Equal => Side::Fetched,
    };

    let mut years: BTreeMap<i32, BTreeMap<u32, MonthBucket>> = BTreeMap::new();
    for year in &fetched.years {
        let months = years.entry(year.year).or_default();
        for month in &year.months {
            months.insert(month.month, month.clone());
        }
    }

    for year in &local.years {
        let months = years.entry(year.year).or_default();
        for month in &year.months {
            match months.entry(month.month) {
                Entry::Vacant(slot) => {
                    slot.insert(month.clone());
                }
                Entry::Occupied(mut slot) => {
                    if newer_side(slot.get(), month, tie_winner) == Side::Local {
                        slot.insert(month.clone());
                    }
                }
            }
        }
    }

    let mut merged_years: Vec<YearBucket> = years
        .into_iter()
        .map(|(year, months)| {
            let mut months: Vec<MonthBucket> = months.into_values().collect();
            months.sort_by_key(|m| Reverse(m.month));
            YearBucket { year, months }
        })
        .collect();
    merged_years.sort_by_key(|y| Reverse(y.year));

    let (remote_document_id, remote_version_tag) = if fetched.remote_document_id.is_some() {
        (fetched.remote_document_id.clone(), fetched.remote_version_tag.clone())
    } else {
        (local.remote_document_id.clone(), local.remote_version_tag.clone())
    };

    LibraryIndex {
        years: merged_years,
        total_photo_count: fetched.total_photo_count.max(local.total_photo_count),
        last_updated: fetched.last_updated.max(local.last_updated),
        last_sync_cursor: fetched.last_sync_cursor.max(local.last_sync_cursor),
        remote_document_id,
        remote_version_tag,
    }
}

fn newer_side(fetched: &MonthBucket, local: &MonthBucket, tie_winner: Side) -> Side {
    match local.source_timestamp.cmp(&fetched.source_timestamp) {
        Ordering::Greater => Side::Local,
        Ordering::Less => Side::Fetched,
        Ordering::Equal => tie_winner,
    }
}
