use std::{
    fmt::{self, Debug, Display, Formatter},
    iter::once,
    str::FromStr,
};

use jiff::civil::Time;

use crate::{error::ParseError, overlap::Segment, prelude::*};

pub const HOURS_PER_DAY: f64 = 24.0;

/// Sub-range delimiters of a composite range string, in priority order.
const DELIMITERS: [char; 3] = [',', '|', ';'];

/// Fractional hour of the day, always within `0.0..24.0`.
#[derive(Copy, Clone, PartialEq, PartialOrd)]
pub struct TimePoint(f64);

impl TimePoint {
    pub const MIDNIGHT: Self = Self(0.0);

    pub fn from_hours(hours: f64) -> Option<Self> {
        (0.0..HOURS_PER_DAY).contains(&hours).then_some(Self(hours))
    }

    pub const fn hours(self) -> f64 {
        self.0
    }

    /// Round to the nearest whole minute of the day.
    pub fn to_time(self) -> Time {
        let minutes = ((self.0 * 60.0).round() as i64).clamp(0, 24 * 60 - 1);
        Time::constant((minutes / 60) as i8, (minutes % 60) as i8, 0, 0)
    }
}

impl From<Time> for TimePoint {
    fn from(time: Time) -> Self {
        Self(
            f64::from(time.hour())
                + f64::from(time.minute()) / 60.0
                + f64::from(time.second()) / 3600.0,
        )
    }
}

impl Debug for TimePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.0)
    }
}

impl Display for TimePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_time().strftime("%H:%M"))
    }
}

impl FromStr for TimePoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(hours), Some(minutes), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::MalformedClock(s.to_string()));
        };
        let hours = f64::from(parse_integer(hours)?);
        let minutes = f64::from(parse_integer(minutes)?);
        Self::from_hours(hours + minutes / 60.0)
            .ok_or_else(|| ParseError::OutOfRange(s.to_string()))
    }
}

fn parse_integer(part: &str) -> Result<i32, ParseError> {
    part.trim()
        .parse()
        .map_err(|source| ParseError::InvalidInteger { input: part.to_string(), source })
}

/// Half-open clock interval. When `start >= end` it wraps past midnight,
/// so `start == end` spans the whole day.
#[derive(Copy, Clone, PartialEq)]
pub struct TimeInterval {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl Debug for TimeInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl Display for TimeInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for TimeInterval {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::MalformedRange(s.to_string()));
        };
        Ok(Self::new(start.trim().parse()?, end.trim().parse()?))
    }
}

impl TimeInterval {
    pub const fn new(start: TimePoint, end: TimePoint) -> Self {
        Self { start, end }
    }

    pub fn wraps(self) -> bool {
        self.start >= self.end
    }

    /// Split into non-wrapping segments: `[start, 24)` and `[0, end)` when wrapping.
    pub fn segments(self) -> impl Iterator<Item = Segment> {
        let (head, tail) = if self.wraps() {
            (
                Segment::new(self.start.hours(), HOURS_PER_DAY),
                Some(Segment::new(TimePoint::MIDNIGHT.hours(), self.end.hours())),
            )
        } else {
            (Segment::new(self.start.hours(), self.end.hours()), None)
        };
        once(head).chain(tail)
    }

    /// Length in hours.
    pub fn duration(self) -> f64 {
        self.segments().map(Segment::len).sum()
    }
}

/// Leniently parse a composite range string like `06:00-09:00,12:00-18:00`.
///
/// The string is split on the first of `,`, `|` or `;` it contains. Sub-ranges that
/// fail to parse are dropped, so an entirely malformed input yields an empty list.
pub fn parse_ranges(input: &str) -> Vec<TimeInterval> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }
    let delimiter = DELIMITERS.into_iter().find(|delimiter| input.contains(*delimiter));
    let parts: Vec<&str> = match delimiter {
        Some(delimiter) => {
            input.split(delimiter).map(str::trim).filter(|part| !part.is_empty()).collect()
        }
        None => vec![input],
    };
    parts
        .into_iter()
        .filter_map(|part| match part.parse() {
            Ok(interval) => Some(interval),
            Err(error) => {
                warn!(part, %error, "dropping the sub-range");
                None
            }
        })
        .collect()
}
