use std::num::ParseIntError;

use thiserror::Error;

/// A clock or range string does not follow the `HH:MM` / `HH:MM-HH:MM` grammar.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("`{0}` is not a clock time, expected HH:MM")]
    MalformedClock(String),

    #[error("`{input}` is not an integer")]
    InvalidInteger {
        input: String,
        #[source]
        source: ParseIntError,
    },

    #[error("`{0}` is outside of the day, expected 00:00 to 23:59")]
    OutOfRange(String),

    #[error("`{0}` is not a time range, expected HH:MM-HH:MM")]
    MalformedRange(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A computed quantity cannot be represented as a decimal.
    #[error("{what} is not a finite number: {value}")]
    NonFinite { what: &'static str, value: String },
}
