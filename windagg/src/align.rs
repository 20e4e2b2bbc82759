//! Alignment of flush boundaries to the local wall clock
//!
//! Boundaries fall on multiples of the interval counted from the local-time epoch, so a
//! one hour interval flushes at the top of every local hour no matter when the process
//! started.

use std::time::Duration;

/// Time from `local_epoch_ms` until the next boundary of an `interval_ms` grid
///
/// When `local_epoch_ms` sits exactly on a boundary the next boundary is a full interval
/// away; the current instant never counts as a boundary.
///
/// ```
/// use std::time::Duration;
/// use windagg::align::aligned_start_delay;
///
/// // 10:00:45 with a one minute interval: 15s to go
/// assert_eq!(aligned_start_delay(36_045_000, 60_000), Duration::from_secs(15));
/// // exactly 10:00:00: a whole minute to go
/// assert_eq!(aligned_start_delay(36_000_000, 60_000), Duration::from_secs(60));
/// ```
///
/// # Panics
///
/// If `interval_ms` is zero or larger than `i64::MAX`. [`AggregatorConfig`] never
/// produces such an interval.
///
/// [`AggregatorConfig`]: crate::AggregatorConfig
pub fn aligned_start_delay(local_epoch_ms: i64, interval_ms: u64) -> Duration {
    let interval = i64::try_from(interval_ms).expect("interval fits in i64");
    assert!(interval > 0, "interval must be positive");
    let remainder = local_epoch_ms.rem_euclid(interval);
    Duration::from_millis(interval.abs_diff(remainder))
}

/// Local epoch millisecond of the boundary that [`aligned_start_delay`] waits for
pub fn next_boundary(local_epoch_ms: i64, interval_ms: u64) -> i64 {
    let delay = aligned_start_delay(local_epoch_ms, interval_ms);
    local_epoch_ms.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX))
}
