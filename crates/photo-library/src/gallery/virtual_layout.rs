//! Windowed rendering over the month timeline.
//!
//! One row per month plus a trailing "no more photos" footer. Rows start at an
//! estimated height and switch to their measured height once rendered.

use std::ops::Range;

use super::MonthTimeline;

/// Row height assumed for a month that hasn't been measured yet.
pub const DEFAULT_MONTH_SIZE_ESTIMATE: u32 = 1000;
/// Rows realized beyond each edge of the viewport.
pub const DEFAULT_OVERSCAN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualLayout {
    estimate: u32,
    overscan: usize,
    /// Measured height per row, `None` until rendered. The last row is the footer.
    measured: Vec<Option<u32>>,
}

impl VirtualLayout {
    pub fn for_timeline(timeline: &MonthTimeline) -> Self {
        Self::new(timeline.len(), DEFAULT_MONTH_SIZE_ESTIMATE, DEFAULT_OVERSCAN)
    }

    pub fn new(month_count: usize, estimate: u32, overscan: usize) -> Self {
        Self {
            estimate,
            overscan,
            measured: vec![None; month_count + 1],
        }
    }

    /// Month rows plus the footer row.
    pub fn row_count(&self) -> usize {
        self.measured.len()
    }

    pub fn is_footer(&self, row: usize) -> bool {
        row + 1 == self.measured.len()
    }

    /// Records a rendered row's height. Out-of-range rows are ignored.
    pub fn set_measured_size(&mut self, row: usize, size: u32) {
        if let Some(slot) = self.measured.get_mut(row) {
            *slot = Some(size);
        }
    }

    pub fn size_of(&self, row: usize) -> u32 {
        self.measured
            .get(row)
            .map(|measured| measured.unwrap_or(self.estimate))
            .unwrap_or(0)
    }

    /// Scroll offset at which `row` starts. Rows past the end start at the total size.
    pub fn offset_of(&self, row: usize) -> u64 {
        (0..row.min(self.measured.len())).map(|r| u64::from(self.size_of(r))).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.offset_of(self.measured.len())
    }

    /// Row covering `offset`; the last row for offsets past the end.
    pub fn row_at_offset(&self, offset: u64) -> usize {
        let mut start = 0u64;
        for row in 0..self.measured.len() {
            let end = start + u64::from(self.size_of(row));
            if offset < end {
                return row;
            }
            start = end;
        }
        self.measured.len() - 1
    }

    /// Rows to realize for a viewport, widened by the overscan on both sides.
    pub fn visible_range(&self, scroll_offset: u64, viewport: u64) -> Range<usize> {
        let first = self.row_at_offset(scroll_offset);
        let last = self.row_at_offset(scroll_offset + viewport.saturating_sub(1));
        first.saturating_sub(self.overscan)..(last + self.overscan + 1).min(self.measured.len())
    }

    /// Scroll offset for a scrollbar position: the start of the month under `fraction`.
    pub fn offset_for_fraction(&self, timeline: &MonthTimeline, fraction: f64) -> u64 {
        timeline
            .month_at_fraction(fraction)
            .and_then(|key| timeline.position_of(key))
            .map(|row| self.offset_of(row))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{LibraryIndex, MonthBucket, YearBucket};

    fn timeline(counts: &[(u32, u32)]) -> MonthTimeline {
        let index = LibraryIndex {
            years: vec![YearBucket {
                year: 2024,
                months: counts
                    .iter()
                    .map(|&(month, photos)| MonthBucket {
                        month,
                        photos_this_month: photos,
                        days: Vec::new(),
                        source_timestamp: 0,
                    })
                    .collect(),
            }],
            total_photo_count: counts.iter().map(|&(_, p)| u64::from(p)).sum(),
            ..LibraryIndex::default()
        };
        MonthTimeline::from_index(&index)
    }

    #[test]
    fn adds_footer_row_and_estimates_sizes() {
        let layout = VirtualLayout::for_timeline(&timeline(&[(3, 5), (2, 5), (1, 5)]));
        assert_eq!(layout.row_count(), 4);
        assert!(layout.is_footer(3));
        assert!(!layout.is_footer(2));
        assert_eq!(layout.total_size(), 4000);
        assert_eq!(layout.offset_of(2), 2000);
    }

    #[test]
    fn empty_timeline_still_has_footer() {
        let layout = VirtualLayout::for_timeline(&MonthTimeline::default());
        assert_eq!(layout.row_count(), 1);
        assert!(layout.is_footer(0));
        assert_eq!(layout.visible_range(0, 500), 0..1);
    }

    #[test]
    fn measured_sizes_replace_estimates() {
        let mut layout = VirtualLayout::new(3, 1000, 0);
        layout.set_measured_size(0, 250);
        layout.set_measured_size(99, 1);
        assert_eq!(layout.offset_of(1), 250);
        assert_eq!(layout.total_size(), 3250);
        assert_eq!(layout.row_at_offset(249), 0);
        assert_eq!(layout.row_at_offset(250), 1);
        assert_eq!(layout.row_at_offset(1_000_000), 3);
    }

    #[test]
    fn visible_range_includes_overscan() {
        let layout = VirtualLayout::new(10, 100, 2);
        // Rows 5..=6 are on screen.
        assert_eq!(layout.visible_range(500, 200), 3..9);
        assert_eq!(layout.visible_range(0, 100), 0..3);
        assert_eq!(layout.visible_range(1000, 100), 8..11);
    }

    #[test]
    fn scrollbar_fraction_lands_on_month_start() {
        let timeline = timeline(&[(3, 50), (2, 25), (1, 25)]);
        let mut layout = VirtualLayout::for_timeline(&timeline);
        layout.set_measured_size(0, 400);
        assert_eq!(layout.offset_for_fraction(&timeline, 0.1), 0);
        assert_eq!(layout.offset_for_fraction(&timeline, 0.6), 400);
        assert_eq!(layout.offset_for_fraction(&timeline, 0.9), 1400);
        assert_eq!(layout.offset_for_fraction(&MonthTimeline::default(), 0.5), 0);
    }
}
