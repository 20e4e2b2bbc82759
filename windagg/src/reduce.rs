//! Reducers that turn a window's worth of values into one number

use std::{fmt, str::FromStr};

use crate::error::ConfigError;

/// Which summary statistic an aggregator computes
///
/// Every reducer maps a non-empty slice of values to a single scalar. Invalid inputs (NaN,
/// zero or negative values where the statistic is undefined) are not special-cased; the
/// floating point result propagates as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationType {
    /// Arithmetic mean
    Mean,
    /// n-th root of the product of n values
    GeometricMean,
    /// Reciprocal of the mean of reciprocals
    HarmonicMean,
    /// Middle value, or the average of the two middle values for an even count
    Median,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Arithmetic sum
    Sum,
}

impl AggregationType {
    /// All reducers, in declaration order
    pub const ALL: [AggregationType; 7] = [
        Self::Mean,
        Self::GeometricMean,
        Self::HarmonicMean,
        Self::Median,
        Self::Min,
        Self::Max,
        Self::Sum,
    ];

    /// The configuration name of this reducer
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::GeometricMean => "geometricMean",
            Self::HarmonicMean => "harmonicMean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
        }
    }

    /// Reduce `values` to a single number
    ///
    /// `values` is expected to be non-empty; an empty slice yields NaN.
    ///
    /// ```
    /// use windagg::AggregationType;
    ///
    /// assert_eq!(AggregationType::Median.aggregate(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    /// assert_eq!(AggregationType::Max.aggregate(&[3.0, 9.0, 1.0]), 9.0);
    /// ```
    pub fn aggregate(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Self::Mean => mean(values),
            Self::GeometricMean => geometric_mean(values),
            Self::HarmonicMean => harmonic_mean(values),
            Self::Median => median(values),
            Self::Min => values.iter().copied().fold(f64::NAN, f64::min),
            Self::Max => values.iter().copied().fold(f64::NAN, f64::max),
            Self::Sum => values.iter().sum(),
        }
    }

    /// Reduce every group, then reduce the per-group results with the same reducer
    ///
    /// This is an aggregate of aggregates: a combined mean is the mean of the group means,
    /// not the mean of all values. Empty groups are skipped; `None` if no group had values.
    ///
    /// ```
    /// use windagg::AggregationType;
    ///
    /// let groups: [&[f64]; 2] = [&[1.0, 1.0], &[10.0]];
    /// assert_eq!(AggregationType::Mean.aggregate_groups(groups), Some(5.5));
    /// ```
    pub fn aggregate_groups<'a>(self, groups: impl IntoIterator<Item = &'a [f64]>) -> Option<f64> {
        let per_group: Vec<f64> = groups
            .into_iter()
            .filter(|group| !group.is_empty())
            .map(|group| self.aggregate(group))
            .collect();
        if per_group.is_empty() {
            None
        } else {
            Some(self.aggregate(&per_group))
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// log domain keeps long windows from overflowing the product
fn geometric_mean(values: &[f64]) -> f64 {
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    (log_sum / values.len() as f64).exp()
}

fn harmonic_mean(values: &[f64]) -> f64 {
    let reciprocal_sum: f64 = values.iter().map(|v| v.recip()).sum();
    values.len() as f64 / reciprocal_sum
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Self::Mean),
            "geometricMean" | "geometric_mean" => Ok(Self::GeometricMean),
            "harmonicMean" | "harmonic_mean" => Ok(Self::HarmonicMean),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            other => Err(ConfigError::UnknownAggregationType(other.to_owned())),
        }
    }
}
