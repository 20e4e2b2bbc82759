// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime},
};

use crate::Time;

/// Simple static timesource that will always return the same time
#[derive(Debug)]
pub struct StaticTimeSource {
    now: SystemTime,
}

impl StaticTimeSource {
    /// Create a new StaticTimeSource that always returns the given time
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
    pub fn at_time(time: impl Into<SystemTime>) -> Self {
        Self { now: time.into() }
    }

    /// Create a StaticTimeSource `millis` milliseconds after the UNIX epoch
    pub fn at_epoch_millis(millis: u64) -> Self {
        Self::at_time(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
    }
}

impl Time for StaticTimeSource {
    fn now(&self) -> SystemTime {
        self.now
    }
}

/// Timesource loaded with one time that can be moved through a shared handle
///
/// Clones share the same clock, so a test can keep one clone and hand another
/// to the code under test.
#[derive(Debug, Clone)]
pub struct ManuallyAdvancedTimeSource(Arc<Mutex<StaticTimeSource>>);

impl ManuallyAdvancedTimeSource {
    /// Create a new ManuallyAdvancedTimeSource that is started with the given time.
    pub fn at_time(time: impl Into<SystemTime>) -> Self {
        Self(Arc::new(Mutex::new(StaticTimeSource::at_time(time))))
    }

    /// Replace the wall-clock time
    ///
    /// # Examples
    ///
    /// ```
    /// use windagg_timesource::{TimeSource, fakes::ManuallyAdvancedTimeSource};
    /// use std::time::{Duration, UNIX_EPOCH};
    ///
    /// let clock = ManuallyAdvancedTimeSource::at_time(UNIX_EPOCH);
    /// let ts = TimeSource::custom(clock.clone());
    ///
    /// clock.update_time(UNIX_EPOCH + Duration::from_secs(100));
    /// assert_eq!(ts.epoch_millis(), 100_000);
    /// ```
    pub fn update_time(&self, time: impl Into<SystemTime>) {
        self.lock().now = time.into();
    }

    /// Move the wall clock forward by `elapsed`
    ///
    /// # Examples
    ///
    /// ```
    /// use windagg_timesource::{TimeSource, fakes::ManuallyAdvancedTimeSource};
    /// use std::time::{Duration, UNIX_EPOCH};
    ///
    /// let clock = ManuallyAdvancedTimeSource::at_time(UNIX_EPOCH);
    /// let ts = TimeSource::custom(clock.clone());
    ///
    /// clock.advance(Duration::from_secs(30));
    /// clock.advance(Duration::from_millis(250));
    /// assert_eq!(ts.epoch_millis(), 30_250);
    /// ```
    pub fn advance(&self, elapsed: Duration) {
        self.lock().now += elapsed;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StaticTimeSource> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Time for ManuallyAdvancedTimeSource {
    fn now(&self) -> SystemTime {
        self.lock().now
    }
}
