//! Aggregation functions used when propagating into coarser archives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AggregationError;

/// How a window of finer samples is reduced to one coarser sample.
///
/// The discriminant is the code stored in the first four bytes of the file
/// header. The mapping is exhaustive; unknown codes are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Arithmetic mean of the known values.
    #[default]
    Average = 1,

    /// Sum of the known values.
    Sum = 2,

    /// The chronologically last known value.
    Last = 3,

    /// Largest known value.
    Max = 4,

    /// Smallest known value.
    Min = 5,
}

impl AggregationMethod {
    /// All methods, in code order.
    pub const ALL: [Self; 5] = [Self::Average, Self::Sum, Self::Last, Self::Max, Self::Min];

    /// Returns the on-disk code for this method.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Returns the lowercase name of this method.
    pub fn name(self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Sum => "sum",
            Self::Last => "last",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    /// Reduces known values, given in chronological order, to one value.
    ///
    /// Returns `None` for an empty slice; callers only aggregate windows that
    /// hold at least one known sample.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use murmur::AggregationMethod;
    ///
    /// let values = [1.0, 4.0, 2.0];
    /// assert_eq!(AggregationMethod::Average.apply(&values), Some(7.0 / 3.0));
    /// assert_eq!(AggregationMethod::Sum.apply(&values), Some(7.0));
    /// assert_eq!(AggregationMethod::Last.apply(&values), Some(2.0));
    /// assert_eq!(AggregationMethod::Max.apply(&values), Some(4.0));
    /// assert_eq!(AggregationMethod::Min.apply(&values), Some(1.0));
    /// assert_eq!(AggregationMethod::Sum.apply(&[]), None);
    /// ```
    #[allow(clippy::cast_precision_loss)] // window sizes are far below 2^52
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        let last = *values.last()?;
        let value = match self {
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Last => last,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        };
        Some(value)
    }
}

impl TryFrom<i32> for AggregationMethod {
    type Error = AggregationError;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Average),
            2 => Ok(Self::Sum),
            3 => Ok(Self::Last),
            4 => Ok(Self::Max),
            5 => Ok(Self::Min),
            _ => Err(AggregationError::UnknownCode { code }),
        }
    }
}

impl FromStr for AggregationMethod {
    type Err = AggregationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" => Ok(Self::Average),
            "sum" => Ok(Self::Sum),
            "last" => Ok(Self::Last),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            _ => Err(AggregationError::UnknownName {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
