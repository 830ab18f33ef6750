//! Axis arithmetic for mapping continuous footprints onto the grid.
//!
//! Every helper works on a single axis; the container applies them to x and y
//! independently so one axis never borrows the other's extent.

use std::ops::Range;

/// Returns the interval `[center - size/2, center + size/2]` covered on one axis.
#[inline]
pub fn interval(center: f64, size: f64) -> (f64, f64) {
    let half = size / 2.0;
    (center - half, center + half)
}

/// Shifts a centre so the interval of `size` lies within `[0, length]`.
///
/// If the lower edge pokes below 0 the centre moves right by the overhang; if
/// the upper edge passes `length` it moves left by the overhang. The caller
/// guarantees `size <= length`, otherwise no shift can satisfy both edges.
///
/// # Example
/// ```
/// use box_stacking::geometry::clamp_center;
///
/// assert_eq!(clamp_center(3.0, 20.0, 1000.0), 10.0);
/// assert_eq!(clamp_center(995.0, 20.0, 1000.0), 990.0);
/// assert_eq!(clamp_center(500.0, 20.0, 1000.0), 500.0);
/// ```
pub fn clamp_center(center: f64, size: f64, length: f64) -> f64 {
    let half = size / 2.0;
    let (lo, hi) = interval(center, size);
    // Snap to the edge instead of adding the overhang so the edge lands exactly.
    if lo < 0.0 {
        half
    } else if hi > length {
        length - half
    } else {
        center
    }
}

/// Maps a continuous interval to the grid cells it touches.
///
/// Cell `i` covers `[i, i + 1)`. The range starts at `floor(lo)` and ends at
/// `ceil(hi)` (exclusive), clipped to `0..cells` and never empty as long as
/// `cells > 0`.
pub fn cell_range(lo: f64, hi: f64, cells: usize) -> Range<usize> {
    if cells == 0 {
        return 0..0;
    }
    let max = cells as f64;
    let start = lo.floor().clamp(0.0, max - 1.0) as usize;
    let end = (hi.ceil().clamp(0.0, max) as usize).max(start + 1);
    start..end
}
