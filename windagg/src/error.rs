//! Error types
//!
//! Configuration problems are fatal and surface from construction. Ingest problems are
//! per-message: they are reported and the message is dropped, but nothing already buffered
//! is affected. Flushing has no error type, since reducers are total over non-empty input.

use std::fmt;

/// Why an [`AggregatorConfig`](crate::AggregatorConfig) was rejected
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// `intervalCount` was zero or negative
    NonPositiveIntervalCount(i64),
    /// `intervalCount` was a string that does not hold an integer
    InvalidIntervalCount(String),
    /// `intervalCount × unit` does not fit in a millisecond counter
    IntervalOverflow {
        /// The configured count
        count: u64,
        /// The configured unit
        unit: crate::IntervalUnit,
    },
    /// `intervalUnit` was not one of `s`, `m`, `h`, `d`
    UnknownIntervalUnit(String),
    /// `aggregationType` was not one of the supported reducers
    UnknownAggregationType(String),
    /// `invalidPayload` was neither `propagate` nor `reject`
    UnknownInvalidPayloadPolicy(String),
    /// `timeZone` is not a known IANA time zone
    UnknownTimeZone {
        /// The configured name
        name: String,
        /// What jiff reported
        source: jiff::Error,
    },
    /// The configuration document could not be parsed
    Parse(String),
    /// The configuration file could not be read
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveIntervalCount(count) => {
                write!(f, "interval count must be positive, got {count}")
            }
            Self::InvalidIntervalCount(text) => {
                write!(f, "interval count `{text}` is not an integer")
            }
            Self::IntervalOverflow { count, unit } => {
                write!(f, "interval of {count}{unit} is too long")
            }
            Self::UnknownIntervalUnit(unit) => write!(
                f,
                "unknown interval unit `{unit}`, expected one of `s`, `m`, `h`, `d`"
            ),
            Self::UnknownAggregationType(kind) => write!(
                f,
                "unknown aggregation type `{kind}`, expected one of `mean`, `geometricMean`, \
                 `harmonicMean`, `median`, `min`, `max`, `sum`"
            ),
            Self::UnknownInvalidPayloadPolicy(policy) => write!(
                f,
                "unknown invalid payload policy `{policy}`, expected `propagate` or `reject`"
            ),
            Self::UnknownTimeZone { name, source } => {
                write!(f, "unknown time zone `{name}`: {source}")
            }
            Self::Parse(reason) => write!(f, "invalid configuration: {reason}"),
            Self::Io(err) => write!(f, "couldn't read configuration: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnknownTimeZone { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Why a single input message could not be buffered
#[derive(Debug)]
#[non_exhaustive]
pub enum IngestError {
    /// The input was not a JSON object shaped like a message
    Malformed(serde_json::Error),
    /// The payload did not parse as a number and the aggregator rejects such payloads
    InvalidPayload {
        /// Topic the message was addressed to
        topic: String,
        /// The offending payload
        payload: serde_json::Value,
    },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed message: {err}"),
            Self::InvalidPayload { topic, payload } => {
                write!(f, "payload {payload} on topic `{topic}` is not a number")
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::InvalidPayload { .. } => None,
        }
    }
}

/// Why [`WindowedAggregator::start`](crate::WindowedAggregator::start) refused to arm timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StartError {
    /// Timers are already armed
    AlreadyStarted,
    /// The aggregator has been shut down and cannot be restarted
    ShutDown,
    /// No scheduler was configured and there is no tokio runtime to fall back to
    NoRuntime,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => f.write_str("aggregator is already started"),
            Self::ShutDown => f.write_str("aggregator has been shut down"),
            Self::NoRuntime => {
                f.write_str("no scheduler configured and not running inside a tokio runtime")
            }
        }
    }
}

impl std::error::Error for StartError {}
