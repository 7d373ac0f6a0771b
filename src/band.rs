use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::clock::{TimeInterval, parse_ranges};

/// Time-of-day slab label.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BandLabel {
    A,
    B,
    C,
    D,
}

impl BandLabel {
    pub const ALL: [Self; 4] = [Self::A, Self::B, Self::C, Self::D];
}

impl Display for BandLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        f.write_str(label)
    }
}

/// Named set of clock intervals.
#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    pub label: BandLabel,
    pub intervals: Vec<TimeInterval>,
}

impl Band {
    pub const fn new(label: BandLabel, intervals: Vec<TimeInterval>) -> Self {
        Self { label, intervals }
    }

    /// Build the band from user input, dropping sub-ranges that do not parse.
    pub fn parse_lenient(label: BandLabel, ranges: &str) -> Self {
        Self::new(label, parse_ranges(ranges))
    }

    /// Sum of the interval lengths in hours, overlapping intervals count twice.
    pub fn duration(&self) -> f64 {
        self.intervals.iter().map(|interval| interval.duration()).sum()
    }

    /// Render the intervals back as a composite range string.
    pub fn ranges(&self) -> String {
        self.intervals.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}
