//! Piecewise-linear interpolation with nearest-boundary clamping

use std::cmp::Ordering;

/// `f64` wrapper with a total order, usable as a `BTreeMap` key
#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Evaluate the polyline through `points` (sorted by x, unique x) at `x`
///
/// Outside the sampled range the nearest boundary value is returned unchanged.
/// Returns `None` for an empty polyline or a NaN query.
pub fn piecewise_linear(points: &[(f64, f64)], x: f64) -> Option<f64> {
    let first = points.first()?;
    let last = points.last()?;
    if x.is_nan() {
        return None;
    }
    if x <= first.0 {
        return Some(first.1);
    }
    if x >= last.0 {
        return Some(last.1);
    }

    // first.0 < x < last.0, so 1 <= idx < len
    let idx = points.partition_point(|(px, _)| *px <= x);
    let (x0, y0) = points[idx - 1];
    let (x1, y1) = points[idx];
    let fraction = (x - x0) / (x1 - x0);
    Some(y0 + fraction * (y1 - y0))
}
