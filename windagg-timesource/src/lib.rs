// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::{
    fmt::Debug,
    time::{SystemTime, UNIX_EPOCH},
};

use jiff::tz::TimeZone;

/// Module containing fake time sources for testing
///
/// To enable this module, you must enable the `test-util` feature.
#[cfg(feature = "test-util")]
pub mod fakes;

/// Trait for providing custom time sources
///
/// Implementors of this trait can be used to provide custom time behavior
/// for testing or specialized use cases.
pub trait Time: Send + Sync + Debug {
    /// Get the current system time
    fn now(&self) -> SystemTime;
}

/// Tokio-specific time source implementations
///
/// [`TokioTime`](tokio::TokioTime) derives the wall clock from tokio's clock, so code that
/// reads the wall clock and code that sleeps on tokio timers observe the same
/// passage of time under `tokio::time::pause`.
///
/// This requires that the `tokio` feature be enabled.
#[cfg(feature = "tokio")]
pub mod tokio {
    use std::time::SystemTime;

    use tokio::time::Instant as TokioInstant;

    use crate::{Time, TimeSource};

    impl TimeSource {
        /// Create a new TimeSource whose wall clock starts at `starting_timestamp` and
        /// then advances with tokio's clock.
        ///
        /// # Examples
        ///
        /// ```
        /// # #[tokio::main(flavor = "current_thread")]
        /// # async fn main() {
        /// use std::time::{Duration, UNIX_EPOCH};
        /// use windagg_timesource::TimeSource;
        ///
        /// tokio::time::pause();
        /// let ts = TimeSource::tokio(UNIX_EPOCH);
        ///
        /// tokio::time::advance(Duration::from_secs(5)).await;
        /// assert_eq!(ts.epoch_millis(), 5_000);
        /// # }
        /// ```
        pub fn tokio(starting_timestamp: SystemTime) -> Self {
            TimeSource::custom(TokioTime::initialize_at(starting_timestamp))
        }
    }

    /// A time source implementation that uses tokio's time utilities
    #[derive(Copy, Clone, Debug)]
    pub struct TokioTime {
        start_time: TokioInstant,
        start_system_time: SystemTime,
    }

    impl TokioTime {
        /// Initialize a new TokioTime that reports `initial_time` right now
        pub fn initialize_at(initial_time: SystemTime) -> Self {
            Self {
                start_time: TokioInstant::now(),
                start_system_time: initial_time,
            }
        }
    }

    impl Time for TokioTime {
        fn now(&self) -> SystemTime {
            self.start_system_time + self.start_time.elapsed()
        }
    }

}

/// Enum representing different time source options
///
/// TimeSource provides a unified interface for reading the wall clock, whether from the
/// system clock or from a custom time source for testing.
#[derive(Clone, Default)]
pub enum TimeSource {
    /// Use the system time
    #[default]
    System,
    #[cfg(feature = "custom-timesource")]
    /// Use a custom time source
    Custom(std::sync::Arc<dyn Time + Send + Sync>),
}

impl std::fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "TimeSource::System"),
            #[cfg(feature = "custom-timesource")]
            Self::Custom(_) => write!(f, "TimeSource::Custom(...)"),
        }
    }
}

impl TimeSource {
    /// Get the current [`SystemTime`] from this time source
    pub fn system_time(&self) -> SystemTime {
        match self {
            Self::System => SystemTime::now(),
            #[cfg(feature = "custom-timesource")]
            Self::Custom(ts) => ts.now(),
        }
    }

    /// Milliseconds since the UNIX epoch, in UTC
    ///
    /// Times before the epoch are reported as negative values.
    pub fn epoch_millis(&self) -> i64 {
        epoch_millis(self.system_time())
    }

    /// Milliseconds since the UNIX epoch, shifted by the UTC offset `tz` has right now
    ///
    /// A value that is a multiple of one hour lands on the top of a local hour, which is
    /// what makes this suitable for aligning periodic work to the local wall clock.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::UNIX_EPOCH;
    /// use jiff::tz::{Offset, TimeZone};
    /// use windagg_timesource::{TimeSource, fakes::StaticTimeSource};
    ///
    /// let ts = TimeSource::custom(StaticTimeSource::at_time(UNIX_EPOCH));
    /// let tz = TimeZone::fixed(Offset::constant(-5));
    /// assert_eq!(ts.local_epoch_millis(&tz), -5 * 3_600_000);
    /// ```
    pub fn local_epoch_millis(&self, tz: &TimeZone) -> i64 {
        local_epoch_millis(self.system_time(), tz)
    }

    /// Create a new TimeSource with a custom time implementation
    ///
    /// This method is only available when the `custom-timesource` feature is enabled.
    ///
    /// # Examples
    ///
    /// ```
    /// use windagg_timesource::{TimeSource, fakes::StaticTimeSource};
    /// use std::time::UNIX_EPOCH;
    ///
    /// let ts = TimeSource::custom(StaticTimeSource::at_time(UNIX_EPOCH));
    /// assert_eq!(ts.system_time(), UNIX_EPOCH);
    /// ```
    #[cfg(feature = "custom-timesource")]
    pub fn custom(custom: impl Time + 'static) -> TimeSource {
        Self::Custom(std::sync::Arc::new(custom))
    }
}

/// Milliseconds between the UNIX epoch and `time`, negative before the epoch
pub fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}

/// [`epoch_millis`] shifted by the UTC offset of `tz` at `time`
///
/// Instants outside the range jiff can represent are treated as UTC.
pub fn local_epoch_millis(time: SystemTime, tz: &TimeZone) -> i64 {
    let millis = epoch_millis(time);
    let offset_seconds = jiff::Timestamp::from_millisecond(millis)
        .map(|ts| tz.to_offset(ts).seconds())
        .unwrap_or(0);
    millis.saturating_add(i64::from(offset_seconds) * 1_000)
}
