//! Index-range resolution over sorted coordinate axes.
//!
//! The remote-subsetting processors resolve one [`AxisSlice`] per axis from
//! the axis values alone, so the server can evaluate the slice before any
//! data variable is transferred.

use serde::{Deserialize, Serialize};

/// Half-open index slice `[start, end)` along one axis. `end == None` means
/// "through the last element".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisSlice {
    pub start: usize,
    pub end: Option<usize>,
}

impl AxisSlice {
    /// Full axis.
    pub fn full() -> Self {
        Self { start: 0, end: None }
    }

    /// Concrete `[start, stop)` bounds for an axis of `len` elements.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let stop = self.end.unwrap_or(len).min(len);
        (self.start.min(stop), stop)
    }

    /// Number of elements the slice selects from an axis of `len` elements.
    pub fn len(&self, len: usize) -> usize {
        let (start, stop) = self.bounds(len);
        stop - start
    }

    pub fn is_empty(&self, len: usize) -> bool {
        self.len(len) == 0
    }

    /// Apply the slice to axis values.
    pub fn apply<'a, T>(&self, values: &'a [T]) -> &'a [T] {
        let (start, stop) = self.bounds(values.len());
        &values[start..stop]
    }

    /// DAP2 hyperslab `[start:1:last]` for an axis of `len` elements, or
    /// `None` if the slice selects nothing.
    pub fn hyperslab(&self, len: usize) -> Option<String> {
        let (start, stop) = self.bounds(len);
        if stop <= start {
            return None;
        }
        Some(format!("[{}:1:{}]", start, stop - 1))
    }
}

/// Resolve the slice of a sorted ascending `axis` covering `[lo, hi]`.
///
/// - `start` is the first index with `v >= lo`, or 0 if there is none.
/// - `end` is the first index with `v > hi`, or open-ended if there is none.
///
/// Returns `None` for an empty axis; callers must skip the fetch.
pub fn resolve_range(axis: &[f64], lo: f64, hi: f64) -> Option<AxisSlice> {
    if axis.is_empty() {
        return None;
    }

    let start = axis.iter().position(|&v| v >= lo).unwrap_or(0);
    let end = axis.iter().position(|&v| v > hi);

    Some(AxisSlice { start, end })
}
