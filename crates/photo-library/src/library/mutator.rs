//! Incremental index updates without a rebuild.
//!
//! Both operations are copy-on-write: they leave the input untouched and return a new
//! index with the touched month stamped at `now` (never moved backwards). `total_photo_count` is left alone;
//! it is advisory and gets corrected by the next rebuild or merge.

use chrono::{Datelike, NaiveDate};

use crate::library::index::{LibraryIndex, MonthBucket, YearBucket};

/// Count one more photo on `date`, creating the year and month buckets if needed.
pub fn add_day(index: &LibraryIndex, date: NaiveDate, now: i64) -> LibraryIndex {
    let mut updated = index.clone();
    let (year, month) = (date.year(), date.month());

    let year_pos = match updated.years.iter().position(|y| y.year == year) {
        Some(pos) => pos,
        None => {
            updated.years.push(YearBucket {
                year,
                months: Vec::new(),
            });
            updated.years.len() - 1
        }
    };
    let months = &mut updated.years[year_pos].months;
    let month_pos = match months.iter().position(|m| m.month == month) {
        Some(pos) => pos,
        None => {
            months.push(MonthBucket {
                month,
                photos_this_month: 0,
                days: Vec::new(),
                source_timestamp: now,
            });
            months.len() - 1
        }
    };

    let bucket = &mut months[month_pos];
    bucket.photos_this_month = bucket.photos_this_month.saturating_add(1);
    bucket.count_day(date.day());
    bucket.source_timestamp = bucket.source_timestamp.max(now);

    updated.sort_descending();
    updated.last_updated = updated.last_updated.max(now);
    updated
}

/// Replace a month's count with an authoritative value from a full client-side count.
///
/// Returns `None` (no-op) if the month was never seen; callers keep their current index.
/// Day counts are left as recorded, the count covers the whole month.
pub fn update_count(index: &LibraryIndex, date: NaiveDate, new_count: u32, now: i64) -> Option<LibraryIndex> {
    let (year, month) = (date.year(), date.month());
    index.month(year, month)?;

    let mut updated = index.clone();
    let bucket = updated
        .years
        .iter_mut()
        .find(|y| y.year == year)
        .and_then(|y| y.months.iter_mut().find(|m| m.month == month))?;
    bucket.photos_this_month = new_count;
    bucket.source_timestamp = now;

    updated.last_updated = updated.last_updated.max(now);
    Some(updated)
}
