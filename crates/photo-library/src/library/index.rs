//! The year → month aggregate and its ordering invariants.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::mem;

use serde::{Deserialize, Serialize};

// ── Types ────────────────────────────────────────────────────────────

/// Opaque point in the remote store's change stream.
///
/// The store hands these out as query times, so they are ordered and a merge can
/// keep the later of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(pub i64);

impl SyncCursor {
    /// Cursor positioned at a wall-clock time (milliseconds since the Unix epoch).
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    /// 1..=31
    pub day: u32,
    pub photos_this_day: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBucket {
    /// 1..=12
    pub month: u32,
    pub photos_this_month: u32,
    /// Per-day counts, descending by day. The month count is authoritative; these
    /// can lag behind it after a correction. Always written, older clients read them.
    #[serde(default)]
    pub days: Vec<DayBucket>,
    /// When this count was last set by a rebuild or a mutation (ms since epoch).
    /// Absent in documents written before per-month provenance existed.
    #[serde(default)]
    pub source_timestamp: i64,
}

impl MonthBucket {
    pub fn day(&self, day: u32) -> Option<&DayBucket> {
        self.days.iter().find(|d| d.day == day)
    }

    /// Adds one photo to `day`, creating its entry if needed.
    pub(crate) fn count_day(&mut self, day: u32) {
        match self.days.iter_mut().find(|d| d.day == day) {
            Some(existing) => existing.photos_this_day = existing.photos_this_day.saturating_add(1),
            None => {
                self.days.push(DayBucket { day, photos_this_day: 1 });
                self.days.sort_by_key(|d| Reverse(d.day));
            }
        }
    }

    /// Dedupes days (first wins), drops impossible ones, sorts descending. Returns the
    /// number of entries dropped.
    fn normalize_days(&mut self) -> usize {
        let before = self.days.len();
        let mut days: BTreeMap<u32, DayBucket> = BTreeMap::new();
        for day in mem::take(&mut self.days) {
            if (1..=31).contains(&day.day) {
                days.entry(day.day).or_insert(day);
            }
        }
        self.days = days.into_values().rev().collect();
        before - self.days.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBucket {
    pub year: i32,
    /// Unique, descending by month.
    pub months: Vec<MonthBucket>,
}

/// Hierarchical photo counts for one (drive, category).
///
/// Serialized as the remote document payload. The document id and version tag are
/// remote file metadata, so they are not part of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryIndex {
    /// Unique, descending by year.
    #[serde(rename = "yearsWithMonths")]
    pub years: Vec<YearBucket>,
    /// Advisory total used for scrollbar weighting. Allowed to drift from the month sum.
    #[serde(rename = "totalNumberOfPhotos")]
    pub total_photo_count: u64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(rename = "lastCursor", default, skip_serializing_if = "Option::is_none")]
    pub last_sync_cursor: Option<SyncCursor>,
    #[serde(skip)]
    pub remote_document_id: Option<String>,
    /// Only valid against `remote_document_id`.
    #[serde(skip)]
    pub remote_version_tag: Option<String>,
}

// ── Queries ──────────────────────────────────────────────────────────

impl LibraryIndex {
    pub fn year(&self, year: i32) -> Option<&YearBucket> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn month(&self, year: i32, month: u32) -> Option<&MonthBucket> {
        self.year(year)?.months.iter().find(|m| m.month == month)
    }

    /// Recorded count for a month, `None` if the month was never seen.
    pub fn photos_in_month(&self, year: i32, month: u32) -> Option<u32> {
        self.month(year, month).map(|m| m.photos_this_month)
    }

    /// Sum of all month counts. Differs from `total_photo_count` when counts drift.
    pub fn month_count_sum(&self) -> u64 {
        self.years
            .iter()
            .flat_map(|y| &y.months)
            .map(|m| u64::from(m.photos_this_month))
            .sum()
    }

    /// Whether years and months are strictly descending (and therefore unique) and
    /// every month is in 1..=12.
    pub fn is_well_ordered(&self) -> bool {
        self.years.windows(2).all(|pair| pair[0].year > pair[1].year)
            && self.years.iter().all(|y| {
                y.months.windows(2).all(|pair| pair[0].month > pair[1].month)
                    && y.months.iter().all(|m| (1..=12).contains(&m.month))
            })
    }

    /// Re-sorts years and months descending.
    pub(crate) fn sort_descending(&mut self) {
        self.years.sort_by_key(|y| Reverse(y.year));
        for year in &mut self.years {
            year.months.sort_by_key(|m| Reverse(m.month));
        }
    }

    /// Repairs a document written by someone else: folds duplicate years together,
    /// keeps the first of duplicate months and days, drops months outside 1..=12 and
    /// days outside 1..=31, drops years left empty, and re-sorts.
    ///
    /// Returns the number of month and day entries dropped.
    pub(crate) fn normalize(&mut self) -> usize {
        let mut dropped = 0;
        let mut years: BTreeMap<i32, BTreeMap<u32, MonthBucket>> = BTreeMap::new();
        for year in mem::take(&mut self.years) {
            let months = years.entry(year.year).or_default();
            for mut month in year.months {
                if !(1..=12).contains(&month.month) || months.contains_key(&month.month) {
                    dropped += 1;
                    continue;
                }
                dropped += month.normalize_days();
                months.insert(month.month, month);
            }
        }
        self.years = years
            .into_iter()
            .rev()
            .filter(|(_, months)| !months.is_empty())
            .map(|(year, months)| YearBucket {
                year,
                months: months.into_values().rev().collect(),
            })
            .collect();
        dropped
    }

    /// Forgets the remote identity, for when the remote document disappeared.
    pub fn detached(&self) -> Self {
        Self {
            remote_document_id: None,
            remote_version_tag: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(month: u32, photos: u32) -> MonthBucket {
        MonthBucket {
            month,
            photos_this_month: photos,
            ..MonthBucket::default()
        }
    }

    #[test]
    fn payload_uses_wire_field_names_and_skips_remote_identity() {
        let index = LibraryIndex {
            years: vec![YearBucket {
                year: 2024,
                months: vec![month(5, 3)],
            }],
            total_photo_count: 3,
            last_updated: 42,
            last_sync_cursor: Some(SyncCursor(40)),
            remote_document_id: Some("doc-1".into()),
            remote_version_tag: Some("v1".into()),
        };

        let json: serde_json::Value = serde_json::to_value(&index).unwrap();
        assert_eq!(json["yearsWithMonths"][0]["year"], 2024);
        assert_eq!(json["yearsWithMonths"][0]["months"][0]["photosThisMonth"], 3);
        assert_eq!(json["totalNumberOfPhotos"], 3);
        assert_eq!(json["lastCursor"], 40);
        assert!(json.get("remoteDocumentId").is_none());
        assert!(json.get("remoteVersionTag").is_none());
    }

    #[test]
    fn legacy_payload_with_days_parses() {
        let legacy = r#"{
            "yearsWithMonths": [
                {"year": 2022, "months": [
                    {"month": 7, "photosThisMonth": 4, "days": [{"day": 3, "photosThisDay": 4}]}
                ]}
            ],
            "totalNumberOfPhotos": 4
        }"#;

        let index: LibraryIndex = serde_json::from_str(legacy).unwrap();
        assert_eq!(index.photos_in_month(2022, 7), Some(4));
        assert_eq!(index.month(2022, 7).unwrap().source_timestamp, 0);
        assert_eq!(index.month(2022, 7).unwrap().day(3).map(|d| d.photos_this_day), Some(4));
        assert_eq!(index.last_updated, 0);
        assert_eq!(index.last_sync_cursor, None);

        let written: serde_json::Value = serde_json::to_value(&index).unwrap();
        let month = &written["yearsWithMonths"][0]["months"][0];
        assert_eq!(month["days"][0]["day"], 3);
        assert_eq!(month["days"][0]["photosThisDay"], 4);
    }

    #[test]
    fn months_without_days_still_write_an_empty_list() {
        let index = LibraryIndex {
            years: vec![YearBucket {
                year: 2024,
                months: vec![month(1, 1)],
            }],
            ..LibraryIndex::default()
        };
        let json: serde_json::Value = serde_json::to_value(&index).unwrap();
        assert_eq!(json["yearsWithMonths"][0]["months"][0]["days"], serde_json::json!([]));
    }

    #[test]
    fn normalize_folds_duplicates_and_drops_impossible_entries() {
        let mut index: LibraryIndex = serde_json::from_str(
            r#"{
                "yearsWithMonths": [
                    {"year": 2022, "months": [{"month": 1, "photosThisMonth": 1}]},
                    {"year": 2023, "months": [
                        {"month": 5, "photosThisMonth": 2, "days": [
                            {"day": 4, "photosThisDay": 1}, {"day": 40, "photosThisDay": 1},
                            {"day": 9, "photosThisDay": 1}, {"day": 4, "photosThisDay": 7}
                        ]},
                        {"month": 5, "photosThisMonth": 9}
                    ]},
                    {"year": 2023, "months": [{"month": 13, "photosThisMonth": 1}, {"month": 4, "photosThisMonth": 1}]},
                    {"year": 2019, "months": [{"month": 0, "photosThisMonth": 3}]}
                ],
                "totalNumberOfPhotos": 4
            }"#,
        )
        .unwrap();

        let dropped = index.normalize();

        assert_eq!(dropped, 5);
        assert!(index.is_well_ordered());
        assert_eq!(index.years.iter().map(|y| y.year).collect::<Vec<_>>(), vec![2023, 2022]);
        assert_eq!(
            index.years[0].months.iter().map(|m| m.month).collect::<Vec<_>>(),
            vec![5, 4]
        );
        assert_eq!(index.photos_in_month(2023, 5), Some(2));
        let days = &index.month(2023, 5).unwrap().days;
        assert_eq!(days.iter().map(|d| (d.day, d.photos_this_day)).collect::<Vec<_>>(), vec![(9, 1), (4, 1)]);
    }

    #[test]
    fn normalize_leaves_a_clean_index_alone() {
        let mut index = LibraryIndex {
            years: vec![YearBucket {
                year: 2024,
                months: vec![month(3, 2), month(1, 1)],
            }],
            total_photo_count: 3,
            ..LibraryIndex::default()
        };
        let before = index.clone();

        assert_eq!(index.normalize(), 0);
        assert_eq!(index, before);
    }

    #[test]
    fn well_ordered_rejects_duplicates_and_ascending() {
        let mut index = LibraryIndex {
            years: vec![
                YearBucket {
                    year: 2023,
                    months: vec![month(2, 1), month(2, 1)],
                },
                YearBucket {
                    year: 2024,
                    months: vec![month(1, 1)],
                },
            ],
            ..LibraryIndex::default()
        };
        assert!(!index.is_well_ordered());

        index.years[0].months.pop();
        index.sort_descending();
        assert!(index.is_well_ordered());
        assert_eq!(index.years[0].year, 2024);
    }

    #[test]
    fn month_count_sum_ignores_advisory_total() {
        let index = LibraryIndex {
            years: vec![YearBucket {
                year: 2020,
                months: vec![month(12, 2), month(1, 5)],
            }],
            total_photo_count: 100,
            ..LibraryIndex::default()
        };
        assert_eq!(index.month_count_sum(), 7);
    }
}
