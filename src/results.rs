//! # Query Results
//!
//! Plain result wrappers returned by [`Context`](crate::context::Context)
//! operations. `TimeSeries` is deliberately thin: the reference system's
//! arithmetic conveniences (`+`, `*`, scalar map, etc.) on the result type
//! are out of scope here — this exposes the points accessor only.

/// Write statistics for a namespace over a date range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub namespace: u32,
    pub start: u64,
    pub end: u64,
    pub data_points: u64,
    pub byte_count: u64,
}

/// A sequence of `(timestamp, value)` points at a fixed interval.
///
/// A step with no underlying data carries `None` rather than being omitted,
/// so every step in `[start, end)` has a slot at its own cursor position —
/// `aggregate_series` relies on this to keep a caller's step count aligned
/// with the range it asked for even where some steps had nothing to
/// aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    points: Vec<(u64, Option<f32>)>,
}

impl TimeSeries {
    /// Builds a series from `(timestamp, value)` pairs, sorted by timestamp.
    pub fn new(mut points: Vec<(u64, Option<f32>)>) -> Self {
        points.sort_by_key(|(t, _)| *t);
        Self { points }
    }

    pub fn points(&self) -> &[(u64, Option<f32>)] {
        &self.points
    }

    pub fn timestamps(&self) -> impl Iterator<Item = u64> + '_ {
        self.points.iter().map(|(t, _)| *t)
    }

    /// The present values, in timestamp order, skipping steps with no data.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.points.iter().filter_map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
