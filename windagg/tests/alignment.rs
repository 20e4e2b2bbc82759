use std::time::Duration;

use assert2::check;
use jiff::tz::TimeZone;
use rstest::rstest;
use windagg::test_util::test_message_sink;
use windagg::timesource::TimeSource;
use windagg::timesource::fakes::{ManuallyAdvancedTimeSource, StaticTimeSource};
use windagg::{AggregationType, AggregatorConfig, IntervalUnit, WindowedAggregator};

const HOUR_MS: u64 = 3_600_000;
// 2024-03-31T12:00:00Z, the day Berlin moves from +01:00 to +02:00
const BERLIN_DST_NOON_UTC: u64 = 1_711_886_400_000;

fn daily_in(zone: &str) -> AggregatorConfig {
    AggregatorConfig::new(1, IntervalUnit::Day, AggregationType::Sum)
        .unwrap()
        .time_zone(TimeZone::get(zone).unwrap())
}

fn with_clock(config: AggregatorConfig, time_source: TimeSource) -> WindowedAggregator {
    WindowedAggregator::builder(config)
        .time_source(time_source)
        .build(test_message_sink().sink)
}

#[rstest]
// 13:00 CET: 11h to local midnight
#[case(BERLIN_DST_NOON_UTC - 24 * HOUR_MS, 11 * HOUR_MS)]
// 14:00 CEST: 10h to local midnight
#[case(BERLIN_DST_NOON_UTC, 10 * HOUR_MS)]
// 02:00 CEST the next day
#[case(BERLIN_DST_NOON_UTC + 12 * HOUR_MS, 22 * HOUR_MS)]
fn daily_boundary_is_local_midnight(#[case] now_ms: u64, #[case] expected_ms: u64) {
    let aggregator = with_clock(
        daily_in("Europe/Berlin"),
        TimeSource::custom(StaticTimeSource::at_epoch_millis(now_ms)),
    );
    check!(aggregator.start_delay() == Duration::from_millis(expected_ms));
}

#[test]
fn delay_tracks_the_clock() {
    let clock = ManuallyAdvancedTimeSource::at_time(
        std::time::UNIX_EPOCH + Duration::from_millis(BERLIN_DST_NOON_UTC),
    );
    let config = AggregatorConfig::new(15, IntervalUnit::Minute, AggregationType::Sum)
        .unwrap()
        .time_zone(TimeZone::UTC);
    let aggregator = with_clock(config, TimeSource::custom(clock.clone()));

    check!(aggregator.start_delay() == Duration::from_secs(15 * 60));
    clock.advance(Duration::from_secs(5 * 60 + 30));
    check!(aggregator.start_delay() == Duration::from_secs(9 * 60 + 30));
    clock.advance(Duration::from_secs(9 * 60 + 30));
    check!(aggregator.start_delay() == Duration::from_secs(15 * 60));
}
