//! Quantum descriptors: the fixed-width time buckets that partition rows.
//!
//! A quantum is attached to exactly one timestamp column of the partition key
//! and is written in table DDL as `quantum(time, 15, 'm')`. The width is a
//! per-table property, never a constant.

use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Errors produced when parsing a quantum spec such as `15m`.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
pub enum ParseQuantumError {
    /// The spec string was empty or only whitespace.
    #[snafu(display("quantum spec is empty"))]
    Empty,

    /// The spec did not start with a numeric interval.
    #[snafu(display("quantum spec '{spec}' is missing a numeric interval"))]
    MissingInterval {
        /// The spec as given.
        spec: String,
    },

    /// The spec did not include a unit suffix.
    #[snafu(display("quantum spec '{spec}' is missing a unit suffix (expected s|m|h|d)"))]
    MissingUnit {
        /// The spec as given.
        spec: String,
    },

    /// The interval is zero or does not fit in a `u32`.
    #[snafu(display("quantum interval in '{spec}' must be between 1 and {}", u32::MAX))]
    IntervalOutOfRange {
        /// The spec as given.
        spec: String,
    },

    /// The unit suffix is not one the store understands.
    #[snafu(display("unknown quantum unit '{unit}' in '{spec}' (expected s|m|h|d)"))]
    UnknownUnit {
        /// The spec as given.
        spec: String,
        /// The unrecognized unit suffix.
        unit: String,
    },
}

/// Time unit of a quantum interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QuantumUnit {
    /// Seconds (`'s'`).
    Seconds,
    /// Minutes (`'m'`).
    Minutes,
    /// Hours (`'h'`).
    Hours,
    /// Days (`'d'`).
    Days,
}

impl QuantumUnit {
    /// Single-letter unit code used in DDL and by the store.
    pub fn code(self) -> char {
        match self {
            QuantumUnit::Seconds => 's',
            QuantumUnit::Minutes => 'm',
            QuantumUnit::Hours => 'h',
            QuantumUnit::Days => 'd',
        }
    }

    /// Unit for a code or one of its spelled-out aliases, in any case.
    pub fn from_name(name: &str) -> Option<Self> {
        let unit = match name.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => QuantumUnit::Seconds,
            "m" | "min" | "mins" | "minute" | "minutes" => QuantumUnit::Minutes,
            "h" | "hr" | "hrs" | "hour" | "hours" => QuantumUnit::Hours,
            "d" | "day" | "days" => QuantumUnit::Days,
            _ => return None,
        };
        Some(unit)
    }

    fn millis(self) -> i64 {
        match self {
            QuantumUnit::Seconds => MILLIS_PER_SECOND,
            QuantumUnit::Minutes => MILLIS_PER_MINUTE,
            QuantumUnit::Hours => MILLIS_PER_HOUR,
            QuantumUnit::Days => MILLIS_PER_DAY,
        }
    }
}

/// A `(interval, unit)` pair, e.g. `(15, Minutes)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Quantum {
    interval: u32,
    unit: QuantumUnit,
}

impl Quantum {
    /// Build a quantum. The interval must be positive; a zero interval is
    /// rejected by [`crate::schema::validate`].
    pub fn new(interval: u32, unit: QuantumUnit) -> Self {
        Quantum { interval, unit }
    }

    /// The number of units in one quantum.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// The unit of the interval.
    pub fn unit(&self) -> QuantumUnit {
        self.unit
    }

    /// Quantum width in milliseconds.
    pub fn width_millis(&self) -> i64 {
        i64::from(self.interval) * self.unit.millis()
    }

    /// Quantum width as a [`chrono::Duration`].
    pub fn width(&self) -> Duration {
        Duration::milliseconds(self.width_millis())
    }

    /// Parse a quantum spec (e.g. `15m`, `1h`, `30s`, `2d`).
    ///
    /// Accepts common unit aliases (`sec`, `min`, `hr`, `day`, ...) in any case.
    ///
    /// # Errors
    /// Returns [`ParseQuantumError`] if the spec is empty, lacks a number or
    /// unit, has a zero or oversized interval, or uses an unknown unit.
    pub fn parse(spec: &str) -> Result<Self, ParseQuantumError> {
        spec.parse()
    }
}

impl fmt::Display for Quantum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.interval, self.unit.code())
    }
}

impl FromStr for Quantum {
    type Err = ParseQuantumError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let spec = input.trim();
        ensure!(!spec.is_empty(), EmptySnafu);

        let split = spec
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(spec.len());
        let (digits, unit) = (&spec[..split], spec[split..].trim());
        ensure!(!digits.is_empty(), MissingIntervalSnafu { spec });
        ensure!(!unit.is_empty(), MissingUnitSnafu { spec });

        // `digits` is all ASCII digits, so parsing only fails on overflow.
        let interval = digits
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .context(IntervalOutOfRangeSnafu { spec })?;
        let unit = QuantumUnit::from_name(unit).context(UnknownUnitSnafu { spec, unit })?;

        Ok(Quantum::new(interval, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_follows_unit() {
        assert_eq!(Quantum::new(15, QuantumUnit::Minutes).width_millis(), 900_000);
        assert_eq!(Quantum::new(30, QuantumUnit::Seconds).width_millis(), 30_000);
        assert_eq!(Quantum::new(2, QuantumUnit::Hours).width(), Duration::hours(2));
        assert_eq!(Quantum::new(1, QuantumUnit::Days).width(), Duration::days(1));
    }

    #[test]
    fn parse_accepts_units_and_aliases() {
        let cases = [
            ("15m", Quantum::new(15, QuantumUnit::Minutes)),
            ("1 h", Quantum::new(1, QuantumUnit::Hours)),
            ("  30sec ", Quantum::new(30, QuantumUnit::Seconds)),
            ("2DAYS", Quantum::new(2, QuantumUnit::Days)),
            ("10MiN", Quantum::new(10, QuantumUnit::Minutes)),
        ];

        for (input, expected) in cases {
            assert_eq!(input.parse::<Quantum>().unwrap(), expected, "{input:?}");
        }
    }

    #[test]
    fn parse_rejects_malformed_specs() {
        assert_eq!(Quantum::parse("  ").unwrap_err(), ParseQuantumError::Empty);
        assert!(matches!(
            Quantum::parse("15").unwrap_err(),
            ParseQuantumError::MissingUnit { .. }
        ));
        assert!(matches!(
            Quantum::parse("m").unwrap_err(),
            ParseQuantumError::MissingInterval { .. }
        ));
        assert!(matches!(
            Quantum::parse("0m").unwrap_err(),
            ParseQuantumError::IntervalOutOfRange { .. }
        ));
        assert!(matches!(
            Quantum::parse("5000000000s").unwrap_err(),
            ParseQuantumError::IntervalOutOfRange { .. }
        ));
        assert_eq!(
            Quantum::parse("1w").unwrap_err(),
            ParseQuantumError::UnknownUnit {
                spec: "1w".to_string(),
                unit: "w".to_string(),
            }
        );
        assert!(matches!(
            Quantum::parse("1.5h").unwrap_err(),
            ParseQuantumError::UnknownUnit { unit, .. } if unit == ".5h"
        ));
    }

    #[test]
    fn unit_names_round_trip_through_codes() {
        for unit in [
            QuantumUnit::Seconds,
            QuantumUnit::Minutes,
            QuantumUnit::Hours,
            QuantumUnit::Days,
        ] {
            assert_eq!(QuantumUnit::from_name(&unit.code().to_string()), Some(unit));
        }
        assert_eq!(QuantumUnit::from_name("Hours"), Some(QuantumUnit::Hours));
        assert_eq!(QuantumUnit::from_name("week"), None);
    }

    #[test]
    fn display_uses_unit_code() {
        assert_eq!(Quantum::new(15, QuantumUnit::Minutes).to_string(), "15m");
        assert_eq!("15m".parse::<Quantum>().unwrap().to_string(), "15m");
    }
}
