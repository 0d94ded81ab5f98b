//! Tests for the merge reconciler.

use super::index::{DayBucket, LibraryIndex, MonthBucket, SyncCursor, YearBucket};
use super::merge::merge;

fn month(month: u32, photos: u32, stamp: i64) -> MonthBucket {
    MonthBucket {
        month,
        photos_this_month: photos,
        days: Vec::new(),
        source_timestamp: stamp,
    }
}

fn index(years: Vec<(i32, Vec<MonthBucket>)>, total: u64, last_updated: i64) -> LibraryIndex {
    LibraryIndex {
        years: years
            .into_iter()
            .map(|(year, months)| YearBucket { year, months })
            .collect(),
        total_photo_count: total,
        last_updated,
        ..LibraryIndex::default()
    }
}

fn year_list(index: &LibraryIndex) -> Vec<i32> {
    index.years.iter().map(|y| y.year).collect()
}

#[test]
fn disjoint_years_union_regardless_of_order() {
    let a = index(vec![(2021, vec![month(4, 2, 1)]), (2020, vec![month(1, 1, 1)])], 3, 10);
    let b = index(vec![(2023, vec![month(8, 5, 2)]), (2022, vec![month(2, 7, 2)])], 12, 20);

    let ab = merge(&a, &b);
    let ba = merge(&b, &a);

    assert_eq!(year_list(&ab), vec![2023, 2022, 2021, 2020]);
    assert_eq!(ab.years, ba.years);
    assert_eq!(ab.total_photo_count, 12);
    assert!(ab.is_well_ordered());
}

#[test]
fn months_present_on_one_side_pass_through() {
    let fetched = index(vec![(2024, vec![month(3, 2, 5)])], 2, 5);
    let local = index(vec![(2024, vec![month(6, 1, 9), month(1, 4, 9)])], 5, 9);

    let merged = merge(&fetched, &local);

    assert_eq!(
        merged.years[0].months.iter().map(|m| m.month).collect::<Vec<_>>(),
        vec![6, 3, 1]
    );
    assert_eq!(merged.photos_in_month(2024, 3), Some(2));
    assert_eq!(merged.photos_in_month(2024, 6), Some(1));
}

#[test]
fn newer_month_timestamp_wins_in_both_directions() {
    let fetched = index(vec![(2024, vec![month(5, 10, 100), month(4, 3, 50)])], 13, 100);
    let local = index(vec![(2024, vec![month(5, 7, 80), month(4, 6, 90)])], 13, 90);

    let merged = merge(&fetched, &local);

    // May: fetched stamp 100 beats local 80
    assert_eq!(merged.photos_in_month(2024, 5), Some(10));
    // April: local stamp 90 beats fetched 50, even though fetched is newer overall
    assert_eq!(merged.photos_in_month(2024, 4), Some(6));
}

#[test]
fn legacy_months_fall_back_to_index_timestamp() {
    let fetched = index(vec![(2019, vec![month(2, 1, 0)])], 1, 10);
    let local = index(vec![(2019, vec![month(2, 4, 0)])], 4, 20);

    assert_eq!(merge(&fetched, &local).photos_in_month(2019, 2), Some(4));

    let older_local = LibraryIndex {
        last_updated: 5,
        ..local.clone()
    };
    assert_eq!(merge(&fetched, &older_local).photos_in_month(2019, 2), Some(1));
}

#[test]
fn full_tie_goes_to_fetched_side() {
    let fetched = index(vec![(2019, vec![month(2, 1, 3)])], 1, 10);
    let local = index(vec![(2019, vec![month(2, 4, 3)])], 4, 10);

    assert_eq!(merge(&fetched, &local).photos_in_month(2019, 2), Some(1));
}

#[test]
fn totals_timestamps_and_cursors_take_the_max() {
    let mut fetched = index(vec![], 8, 30);
    fetched.last_sync_cursor = Some(SyncCursor(300));
    let mut local = index(vec![], 11, 40);
    local.last_sync_cursor = Some(SyncCursor(200));

    let merged = merge(&fetched, &local);

    assert_eq!(merged.total_photo_count, 11);
    assert_eq!(merged.last_updated, 40);
    assert_eq!(merged.last_sync_cursor, Some(SyncCursor(300)));

    local.last_sync_cursor = None;
    fetched.last_sync_cursor = None;
    assert_eq!(merge(&fetched, &local).last_sync_cursor, None);
}

#[test]
fn remote_identity_comes_from_fetched_side_when_present() {
    let mut fetched = index(vec![], 0, 0);
    fetched.remote_document_id = Some("doc".into());
    fetched.remote_version_tag = Some("v2".into());
    let mut local = index(vec![], 0, 0);
    local.remote_document_id = Some("doc".into());
    local.remote_version_tag = Some("v1".into());

    let merged = merge(&fetched, &local);
    assert_eq!(merged.remote_version_tag.as_deref(), Some("v2"));

    let merged = merge(&fetched.detached(), &local);
    assert_eq!(merged.remote_document_id.as_deref(), Some("doc"));
    assert_eq!(merged.remote_version_tag.as_deref(), Some("v1"));
}

#[test]
fn merge_with_self_is_identity() {
    let a = index(vec![(2024, vec![month(2, 5, 1)]), (2023, vec![month(12, 1, 1)])], 6, 1);
    assert_eq!(merge(&a, &a), a);
}

#[test]
fn winning_month_brings_its_day_counts() {
    let with_days = |photos: u32, stamp: i64, days: &[(u32, u32)]| MonthBucket {
        days: days
            .iter()
            .map(|&(day, photos_this_day)| DayBucket { day, photos_this_day })
            .collect(),
        ..month(7, photos, stamp)
    };
    let fetched = index(vec![(2022, vec![with_days(4, 10, &[(3, 4)])])], 4, 10);
    let local = index(vec![(2022, vec![with_days(5, 20, &[(9, 1), (3, 4)])])], 5, 20);

    let merged = merge(&fetched, &local);

    let july = merged.month(2022, 7).unwrap();
    assert_eq!(july.photos_this_month, 5);
    assert_eq!(july.days.len(), 2);
    assert_eq!(july.day(9).map(|d| d.photos_this_day), Some(1));
}
