//! Full rebuild: aggregate one page of photo records into a fresh index.
//!
//! Used when neither the local cache nor the remote store has an index yet. Counts
//! are gathered per day, kept as the month's day list, and summed bottom-up into
//! months. The input is a single
//! page, so the result is exact only up to the page size; drifted months self-heal
//! through [`update_count`](super::update_count) once the gallery paginates them.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, FixedOffset};

use crate::library::index::{DayBucket, LibraryIndex, MonthBucket, YearBucket};
use crate::library::record::PhotoRecord;

/// Day-level counts keyed year → month → day.
type DayCounts = BTreeMap<i32, BTreeMap<u32, BTreeMap<u32, u32>>>;

/// Build an index from an unordered page of records.
///
/// Records are deduplicated by id (first occurrence wins), so feeding the same
/// photos twice or in another order yields the same structure. Every month is
/// stamped with `now` as its source timestamp.
pub fn build_index(records: &[PhotoRecord], offset: &FixedOffset, now: i64) -> LibraryIndex {
    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
    let unique: Vec<&PhotoRecord> = records.iter().filter(|r| seen.insert(r.id.as_str())).collect();

    let counts = count_days(&unique, offset);

    let mut years: Vec<YearBucket> = counts
        .into_iter()
        .map(|(year, months)| {
            let mut months: Vec<MonthBucket> = months
                .into_iter()
                .map(|(month, days)| MonthBucket {
                    month,
                    photos_this_month: days.values().sum(),
                    days: days
                        .into_iter()
                        .rev()
                        .map(|(day, photos_this_day)| DayBucket { day, photos_this_day })
                        .collect(),
                    source_timestamp: now,
                })
                .collect();
            months.sort_by_key(|m| Reverse(m.month));
            YearBucket { year, months }
        })
        .collect();
    years.sort_by_key(|y| Reverse(y.year));

    LibraryIndex {
        years,
        total_photo_count: unique.len() as u64,
        last_updated: now,
        last_sync_cursor: None,
        remote_document_id: None,
        remote_version_tag: None,
    }
}

fn count_days(records: &[&PhotoRecord], offset: &FixedOffset) -> DayCounts {
    let mut counts = DayCounts::new();
    for record in records {
        let Some(date) = record.capture_date(offset) else {
            log::debug!("Skipping photo {} with unrepresentable date", record.id);
            continue;
        };
        *counts
            .entry(date.year())
            .or_default()
            .entry(date.month())
            .or_default()
            .entry(date.day())
            .or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::library::record::ArchivalStatus;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn photo(id: &str, y: i32, m: u32, d: u32) -> PhotoRecord {
        let created = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        PhotoRecord {
            id: id.into(),
            created,
            user_date: None,
            archival_status: ArchivalStatus::None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn empty_input_builds_empty_index() {
        let index = build_index(&[], &utc(), 7);
        assert!(index.years.is_empty());
        assert_eq!(index.total_photo_count, 0);
        assert_eq!(index.last_updated, 7);
    }

    #[test]
    fn sums_days_into_months_descending() {
        let records = vec![
            photo("a", 2023, 3, 1),
            photo("b", 2023, 3, 1),
            photo("c", 2023, 3, 20),
            photo("d", 2023, 11, 5),
            photo("e", 2021, 6, 6),
        ];

        let index = build_index(&records, &utc(), 1_000);

        assert_eq!(index.years.iter().map(|y| y.year).collect::<Vec<_>>(), vec![2023, 2021]);
        assert_eq!(
            index.years[0].months.iter().map(|m| m.month).collect::<Vec<_>>(),
            vec![11, 3]
        );
        assert_eq!(index.photos_in_month(2023, 3), Some(3));
        assert_eq!(index.photos_in_month(2023, 11), Some(1));
        assert_eq!(index.photos_in_month(2021, 6), Some(1));
        let march = index.month(2023, 3).unwrap();
        assert_eq!(
            march.days.iter().map(|d| (d.day, d.photos_this_day)).collect::<Vec<_>>(),
            vec![(20, 1), (1, 2)]
        );
        assert_eq!(index.total_photo_count, 5);
        assert!(index.years.iter().flat_map(|y| &y.months).all(|m| m.source_timestamp == 1_000));
    }

    #[test]
    fn duplicates_are_counted_once() {
        let records = vec![photo("a", 2023, 3, 1), photo("a", 2023, 3, 1), photo("b", 2023, 4, 1)];

        let index = build_index(&records, &utc(), 0);

        assert_eq!(index.total_photo_count, 2);
        assert_eq!(index.photos_in_month(2023, 3), Some(1));
    }

    #[test]
    fn rebuild_is_order_independent() {
        let mut records = vec![
            photo("a", 2020, 1, 1),
            photo("b", 2022, 12, 31),
            photo("c", 2020, 1, 2),
            photo("b", 2022, 12, 31),
            photo("d", 2021, 7, 4),
        ];
        let first = build_index(&records, &utc(), 5);
        records.reverse();
        let second = build_index(&records, &utc(), 5);

        assert_eq!(first, second);
    }
}
