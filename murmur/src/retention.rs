//! Retention declarations used when creating a file.
//!
//! A [`RetentionDef`] is the creation-time description of one archive:
//! how many seconds each point covers and how many points are kept. It is
//! not stored as such; the planner turns a list of them into archive
//! descriptors.
//!
//! Declarations can also be written as text, `precision:points`, where
//! either side may carry a unit suffix:
//!
//! | text      | seconds per point | points |
//! |-----------|-------------------|--------|
//! | `60:1440` | 60                | 1440   |
//! | `15m:8`   | 900               | 8      |
//! | `12h:2y`  | 43200             | 1460   |
//!
//! A unit on the right-hand side turns it into a duration, which is divided
//! by the precision to get the point count.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigurationError, Result};

/// A time unit accepted in textual retention definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitMultiplier {
    /// One second.
    Seconds = 1,
    /// Sixty seconds.
    Minutes = 60,
    /// One hour.
    Hours = 3600,
    /// One day.
    Days = 86_400,
    /// 365 days.
    Years = 31_536_000,
}

impl UnitMultiplier {
    /// Number of seconds in one unit.
    pub fn seconds(self) -> u32 {
        self as u32
    }

    /// Looks a unit up by name or any prefix of it (`m`, `min`, `minutes`).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        [
            ("seconds", Self::Seconds),
            ("minutes", Self::Minutes),
            ("hours", Self::Hours),
            ("days", Self::Days),
            ("years", Self::Years),
        ]
        .into_iter()
        .find(|(full, _)| full.starts_with(&name))
        .map(|(_, unit)| unit)
    }
}

/// One archive declaration: `points` slots of `seconds_per_point` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetentionDef {
    /// Sampling interval of the archive.
    pub seconds_per_point: u32,
    /// Number of slots in the archive.
    pub points: u32,
}

impl RetentionDef {
    /// Creates a declaration from raw numbers.
    pub fn new(seconds_per_point: u32, points: u32) -> Self {
        Self {
            seconds_per_point,
            points,
        }
    }

    /// Builds a declaration from a precision in `unit`s and a point count.
    ///
    /// When `points_unit` is given, `points` is a duration in that unit and is
    /// converted to a slot count by dividing by the precision.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRetention`] if the precision is
    /// zero, the numbers overflow, or the duration is shorter than one point.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use murmur::{RetentionDef, UnitMultiplier};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let def = RetentionDef::calc(12, UnitMultiplier::Hours, 2, Some(UnitMultiplier::Years))?;
    /// assert_eq!(def, RetentionDef::new(43_200, 1460));
    /// # Ok(())
    /// # }
    /// ```
    pub fn calc(
        precision: u32,
        unit: UnitMultiplier,
        points: u32,
        points_unit: Option<UnitMultiplier>,
    ) -> Result<Self> {
        let describe = || match points_unit {
            Some(p) => format!("{precision}x{}s:{points}x{}s", unit.seconds(), p.seconds()),
            None => format!("{precision}x{}s:{points}", unit.seconds()),
        };
        let invalid = |reason: &str| ConfigurationError::InvalidRetention {
            input: describe(),
            reason: reason.to_string(),
        };

        let seconds_per_point = precision
            .checked_mul(unit.seconds())
            .ok_or_else(|| invalid("precision overflows 32 bits"))?;
        if seconds_per_point == 0 {
            return Err(invalid("precision must be positive").into());
        }

        let points = match points_unit {
            None => points,
            Some(p) => {
                let duration = u64::from(points) * u64::from(p.seconds());
                u32::try_from(duration / u64::from(seconds_per_point))
                    .map_err(|_| invalid("point count overflows 32 bits"))?
            }
        };
        if points == 0 {
            return Err(invalid("retention must hold at least one point").into());
        }

        Ok(Self::new(seconds_per_point, points))
    }

    /// Seconds of history the declared archive holds.
    pub fn retention(&self) -> u64 {
        u64::from(self.seconds_per_point) * u64::from(self.points)
    }
}

impl FromStr for RetentionDef {
    type Err = crate::MurmurError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigurationError::InvalidRetention {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (precision, points) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected precision:points"))?;
        let (precision, unit) = split_quantity(precision).ok_or_else(|| invalid("bad precision"))?;
        let (points, points_unit) = split_quantity(points).ok_or_else(|| invalid("bad points"))?;

        let unit = unit.unwrap_or(UnitMultiplier::Seconds);
        Self::calc(precision, unit, points, points_unit).map_err(|e| match e {
            crate::MurmurError::Configuration(ConfigurationError::InvalidRetention {
                reason, ..
            }) => invalid(&reason).into(),
            other => other,
        })
    }
}

/// Splits `"15m"` into `(15, Some(Minutes))` and `"8"` into `(8, None)`.
fn split_quantity(text: &str) -> Option<(u32, Option<UnitMultiplier>)> {
    let text = text.trim();
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(digits_end);
    let number = number.parse().ok()?;
    if suffix.is_empty() {
        return Some((number, None));
    }
    Some((number, Some(UnitMultiplier::from_name(suffix)?)))
}

impl fmt::Display for RetentionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds_per_point, self.points)
    }
}
