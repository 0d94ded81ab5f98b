//! Shift-click range selection across months.

use super::{MonthKey, MonthTimeline};

/// A photo's place in the gallery: its month and its index within that month's listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoPosition {
    pub month: MonthKey,
    pub index: usize,
}

/// Collects every photo between `anchor` and `target`, inclusive, in timeline order.
///
/// Within one month this is a slice. Across months it is the tail of the newer
/// month, every month in between, and the head of the older month. `photos_of`
/// supplies a month's listing; indexes past its end are clamped. Returns nothing
/// if either month isn't on the timeline.
pub fn select_range<T>(
    timeline: &MonthTimeline,
    anchor: PhotoPosition,
    target: PhotoPosition,
    mut photos_of: impl FnMut(MonthKey) -> Vec<T>,
) -> Vec<T> {
    let (Some(anchor_pos), Some(target_pos)) = (
        timeline.position_of(anchor.month),
        timeline.position_of(target.month),
    ) else {
        return Vec::new();
    };

    if anchor_pos == target_pos {
        let photos = photos_of(anchor.month);
        let (from, to) = ordered(anchor.index, target.index);
        return clamped(photos, from, to);
    }

    let (newer, older) = if anchor_pos < target_pos {
        (anchor, target)
    } else {
        (target, anchor)
    };

    let mut selected = clamped(photos_of(newer.month), newer.index, usize::MAX);
    for month in timeline.months_between(newer.month, older.month) {
        selected.extend(photos_of(month.key));
    }
    selected.extend(clamped(photos_of(older.month), 0, older.index));
    selected
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Elements `from..=to` of `photos`, clamped to its length.
fn clamped<T>(photos: Vec<T>, from: usize, to: usize) -> Vec<T> {
    photos
        .into_iter()
        .skip(from)
        .take(to.saturating_sub(from).saturating_add(1))
        .collect()
}
