//! Gallery consumers: the index's ordering as the gallery scrolls, jumps, and selects over it.
//!
//! Nothing here mutates an index. Count corrections discovered while paginating a month
//! go back through [`LibrarySync::reconcile_month_count`](crate::sync::LibrarySync::reconcile_month_count).

mod selection;
mod virtual_layout;

pub use selection::{PhotoPosition, select_range};
pub use virtual_layout::{DEFAULT_MONTH_SIZE_ESTIMATE, DEFAULT_OVERSCAN, VirtualLayout};

use std::cmp::Ordering;

use crate::library::LibraryIndex;

/// A (year, month) position on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineMonth {
    pub key: MonthKey,
    pub photos: u32,
}

/// Flattened, strictly descending sequence of months: one visual unit per entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthTimeline {
    months: Vec<TimelineMonth>,
    total_photos: u64,
}

impl MonthTimeline {
    pub fn from_index(index: &LibraryIndex) -> Self {
        let months = index
            .years
            .iter()
            .flat_map(|year| {
                year.months.iter().map(move |month| TimelineMonth {
                    key: MonthKey::new(year.year, month.month),
                    photos: month.photos_this_month,
                })
            })
            .collect();
        Self {
            months,
            total_photos: index.total_photo_count,
        }
    }

    pub fn months(&self) -> &[TimelineMonth] {
        &self.months
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&TimelineMonth> {
        self.months.get(position)
    }

    /// Exact "jump to time": position of `key`, if the month has an entry.
    pub fn position_of(&self, key: MonthKey) -> Option<usize> {
        self.months.binary_search_by(|m| descending(m.key, key)).ok()
    }

    /// Position of `key`, or of the newest month older than it; the last month if
    /// `key` predates everything. `None` only for an empty timeline.
    pub fn nearest_position(&self, key: MonthKey) -> Option<usize> {
        if self.months.is_empty() {
            return None;
        }
        match self.months.binary_search_by(|m| descending(m.key, key)) {
            Ok(pos) => Some(pos),
            Err(insert_at) => Some(insert_at.min(self.months.len() - 1)),
        }
    }

    /// Months strictly between two positions on the timeline, in timeline order.
    pub fn months_between(&self, a: MonthKey, b: MonthKey) -> &[TimelineMonth] {
        let (Some(a), Some(b)) = (self.position_of(a), self.position_of(b)) else {
            return &[];
        };
        let (first, last) = if a <= b { (a, b) } else { (b, a) };
        if last - first < 2 {
            return &[];
        }
        &self.months[first + 1..last]
    }

    /// Scrollbar weight per month: `photos / total_photo_count`. All zero for an empty library.
    pub fn weights(&self) -> Vec<f64> {
        if self.total_photos == 0 {
            return vec![0.0; self.months.len()];
        }
        let total = self.total_photos as f64;
        self.months.iter().map(|m| f64::from(m.photos) / total).collect()
    }

    /// Month under a scrollbar position in `0.0..=1.0`, walking cumulative weights.
    ///
    /// Weights need not sum to 1 (the total is advisory); anything past the last
    /// month's share maps to the last month.
    pub fn month_at_fraction(&self, fraction: f64) -> Option<MonthKey> {
        let last = self.months.last()?;
        let fraction = fraction.clamp(0.0, 1.0);
        let mut cumulative = 0.0;
        for (month, weight) in self.months.iter().zip(self.weights()) {
            cumulative += weight;
            if fraction < cumulative {
                return Some(month.key);
            }
        }
        Some(last.key)
    }
}

/// Comparator for a descending list: newer months sort first.
fn descending(candidate: MonthKey, target: MonthKey) -> Ordering {
    target.cmp(&candidate)
}
