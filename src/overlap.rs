use std::fmt::{self, Debug, Formatter};

use crate::clock::TimeInterval;

/// Non-wrapping half-open span of hours, `start <= end`.
#[derive(Copy, Clone, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Debug for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl Segment {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn len(self) -> f64 {
        self.end - self.start
    }

    /// Hours shared with the other segment, zero when disjoint.
    pub fn overlap(self, other: Self) -> f64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0.0)
    }
}

/// Overlap of two possibly wrapping intervals.
pub fn overlap(lhs: TimeInterval, rhs: TimeInterval) -> f64 {
    lhs.segments()
        .flat_map(|left| rhs.segments().map(move |right| left.overlap(right)))
        .sum()
}

/// Overlap of one interval with every interval of a band, sub-ranges are not deduplicated.
pub fn overlap_all(interval: TimeInterval, others: &[TimeInterval]) -> f64 {
    others.iter().map(|other| overlap(interval, *other)).sum()
}
