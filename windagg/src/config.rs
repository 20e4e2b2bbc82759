//! Aggregator configuration
//!
//! Configuration is supplied by whoever hosts the aggregator, usually as a TOML or JSON
//! document using the camelCase keys below. It is validated once, up front: an
//! [`AggregatorConfig`] that exists is one the aggregator can run with.
//!
//! ```toml
//! intervalCount = 5
//! intervalUnit = "m"
//! aggregationType = "mean"
//! submitPerTopic = true
//! submitIncompleteInterval = false
//! defaultTopic = "avg"
//! # optional
//! invalidPayload = "propagate"
//! timeZone = "Europe/Berlin"
//! ```

use std::{fmt, path::Path, str::FromStr, time::Duration};

use jiff::tz::TimeZone;
use serde::{Deserialize, Deserializer};

use crate::{error::ConfigError, reduce::AggregationType};

/// Unit of the flush interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    /// `s`
    Second,
    /// `m`
    Minute,
    /// `h`
    Hour,
    /// `d`
    Day,
}

impl IntervalUnit {
    /// Length of one unit in milliseconds
    pub const fn millis(self) -> u64 {
        match self {
            Self::Second => 1_000,
            Self::Minute => 60 * 1_000,
            Self::Hour => 60 * 60 * 1_000,
            Self::Day => 24 * 60 * 60 * 1_000,
        }
    }

    /// The short configuration name (`s`, `m`, `h` or `d`)
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
            Self::Day => "d",
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" | "second" | "seconds" => Ok(Self::Second),
            "m" | "minute" | "minutes" => Ok(Self::Minute),
            "h" | "hour" | "hours" => Ok(Self::Hour),
            "d" | "day" | "days" => Ok(Self::Day),
            other => Err(ConfigError::UnknownIntervalUnit(other.to_owned())),
        }
    }
}

/// What to do with a payload that does not parse as a number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InvalidPayloadPolicy {
    /// Buffer it as NaN and let the reducer deal with it
    #[default]
    Propagate,
    /// Drop the message and report an [`IngestError::InvalidPayload`](crate::IngestError::InvalidPayload)
    Reject,
}

impl FromStr for InvalidPayloadPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "propagate" => Ok(Self::Propagate),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::UnknownInvalidPayloadPolicy(other.to_owned())),
        }
    }
}

/// Validated configuration for a [`WindowedAggregator`](crate::WindowedAggregator)
///
/// Build one with [`AggregatorConfig::new`] and the chainable setters, or deserialize one
/// from a configuration document.
///
/// ```
/// use std::time::Duration;
/// use windagg::{AggregationType, AggregatorConfig, IntervalUnit};
///
/// let config = AggregatorConfig::new(15, IntervalUnit::Second, AggregationType::Sum)?
///     .submit_per_topic(true)
///     .default_topic("total");
/// assert_eq!(config.interval(), Duration::from_secs(15));
/// # Ok::<(), windagg::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    interval_count: u64,
    interval_unit: IntervalUnit,
    interval_millis: u64,
    aggregation_type: AggregationType,
    submit_per_topic: bool,
    submit_incomplete_interval: bool,
    default_topic: String,
    invalid_payload: InvalidPayloadPolicy,
    time_zone: TimeZone,
}

impl AggregatorConfig {
    /// Create a configuration flushing every `count` × `unit`
    ///
    /// Fails if the interval is empty or too long to represent. Everything else starts at
    /// its default: combined output, incomplete first interval discarded, empty default
    /// topic, NaN-propagating ingestion, and the system time zone.
    pub fn new(
        count: u64,
        unit: IntervalUnit,
        aggregation_type: AggregationType,
    ) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::NonPositiveIntervalCount(0));
        }
        let interval_millis = count
            .checked_mul(unit.millis())
            .filter(|ms| i64::try_from(*ms).is_ok())
            .ok_or(ConfigError::IntervalOverflow { count, unit })?;
        Ok(Self {
            interval_count: count,
            interval_unit: unit,
            interval_millis,
            aggregation_type,
            submit_per_topic: false,
            submit_incomplete_interval: false,
            default_topic: String::new(),
            invalid_payload: InvalidPayloadPolicy::default(),
            time_zone: TimeZone::system(),
        })
    }

    /// Emit one message per topic instead of one combined message
    pub fn submit_per_topic(mut self, enabled: bool) -> Self {
        self.submit_per_topic = enabled;
        self
    }

    /// Emit what was buffered before the first aligned boundary instead of discarding it
    pub fn submit_incomplete_interval(mut self, enabled: bool) -> Self {
        self.submit_incomplete_interval = enabled;
        self
    }

    /// Topic of the combined message
    pub fn default_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = topic.into();
        self
    }

    /// How to treat payloads that are not numbers
    pub fn invalid_payload(mut self, policy: InvalidPayloadPolicy) -> Self {
        self.invalid_payload = policy;
        self
    }

    /// Time zone whose wall clock interval boundaries are aligned to
    pub fn time_zone(mut self, tz: TimeZone) -> Self {
        self.time_zone = tz;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(document).map_err(|err| ConfigError::Parse(err.to_string()))?;
        raw.validate()
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&document)
    }

    /// Validate a JSON configuration object
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_value(value).map_err(|err| ConfigError::Parse(err.to_string()))?;
        raw.validate()
    }

    /// The flush interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis)
    }

    /// The flush interval in milliseconds
    pub fn interval_millis(&self) -> u64 {
        self.interval_millis
    }

    /// The configured interval count
    pub fn interval_count(&self) -> u64 {
        self.interval_count
    }

    /// The configured interval unit
    pub fn interval_unit(&self) -> IntervalUnit {
        self.interval_unit
    }

    /// The configured reducer
    pub fn aggregation_type(&self) -> AggregationType {
        self.aggregation_type
    }

    /// Whether one message per topic is emitted
    pub fn is_per_topic(&self) -> bool {
        self.submit_per_topic
    }

    /// Whether the partial first interval is emitted
    pub fn is_incomplete_interval_submitted(&self) -> bool {
        self.submit_incomplete_interval
    }

    /// Topic of the combined message
    pub fn combined_topic(&self) -> &str {
        &self.default_topic
    }

    /// The configured invalid payload policy
    pub fn invalid_payload_policy(&self) -> InvalidPayloadPolicy {
        self.invalid_payload
    }

    /// The zone interval boundaries are aligned to
    pub fn zone(&self) -> &TimeZone {
        &self.time_zone
    }
}

impl<'de> Deserialize<'de> for AggregatorConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawConfig::deserialize(deserializer)?
            .validate()
            .map_err(serde::de::Error::custom)
    }
}

// Unknown keys are ignored so a host can keep its own settings in the same document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(alias = "interval-count")]
    interval_count: IntervalCount,
    #[serde(alias = "intervalUnits", alias = "interval-units")]
    interval_unit: String,
    aggregation_type: String,
    #[serde(default)]
    submit_per_topic: bool,
    #[serde(default)]
    submit_incomplete_interval: bool,
    #[serde(default, alias = "topic")]
    default_topic: String,
    #[serde(default)]
    invalid_payload: Option<String>,
    #[serde(default)]
    time_zone: Option<String>,
}

// Hosts that keep settings as form strings send `"intervalCount": "5"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalCount {
    Number(i64),
    Text(String),
}

impl IntervalCount {
    fn positive(self) -> Result<u64, ConfigError> {
        let count = match self {
            Self::Number(count) => count,
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidIntervalCount(text))?,
        };
        u64::try_from(count).map_err(|_| ConfigError::NonPositiveIntervalCount(count))
    }
}

impl RawConfig {
    fn validate(self) -> Result<AggregatorConfig, ConfigError> {
        let count = self.interval_count.positive()?;
        let unit: IntervalUnit = self.interval_unit.parse()?;
        let kind: AggregationType = self.aggregation_type.parse()?;
        let mut config = AggregatorConfig::new(count, unit, kind)?
            .submit_per_topic(self.submit_per_topic)
            .submit_incomplete_interval(self.submit_incomplete_interval)
            .default_topic(self.default_topic);
        if let Some(policy) = self.invalid_payload {
            config = config.invalid_payload(policy.parse()?);
        }
        if let Some(name) = self.time_zone {
            let tz = TimeZone::get(&name)
                .map_err(|source| ConfigError::UnknownTimeZone { name, source })?;
            config = config.time_zone(tz);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(1, IntervalUnit::Second, 1_000)]
    #[case(5, IntervalUnit::Minute, 300_000)]
    #[case(2, IntervalUnit::Hour, 7_200_000)]
    #[case(1, IntervalUnit::Day, 86_400_000)]
    fn interval_duration(#[case] count: u64, #[case] unit: IntervalUnit, #[case] millis: u64) {
        let config = AggregatorConfig::new(count, unit, AggregationType::Mean).unwrap();
        check!(config.interval_millis() == millis);
        check!(config.interval() == Duration::from_millis(millis));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let_assert!(
            Err(ConfigError::NonPositiveIntervalCount(0)) =
                AggregatorConfig::new(0, IntervalUnit::Minute, AggregationType::Max)
        );
    }

    #[test]
    fn huge_interval_is_rejected() {
        let_assert!(
            Err(ConfigError::IntervalOverflow { .. }) =
                AggregatorConfig::new(u64::MAX / 1_000, IntervalUnit::Day, AggregationType::Max)
        );
    }

    #[test]
    fn toml_document() {
        let config = AggregatorConfig::from_toml_str(
            r#"
            intervalCount = 10
            intervalUnit = "s"
            aggregationType = "harmonicMean"
            submitPerTopic = true
            submitIncompleteInterval = true
            defaultTopic = "combined"
            invalidPayload = "reject"
            timeZone = "UTC"
            "#,
        )
        .unwrap();
        check!(config.interval_millis() == 10_000);
        check!(config.aggregation_type() == AggregationType::HarmonicMean);
        check!(config.is_per_topic());
        check!(config.is_incomplete_interval_submitted());
        check!(config.combined_topic() == "combined");
        check!(config.invalid_payload_policy() == InvalidPayloadPolicy::Reject);
    }

    #[test]
    fn defaults_for_optional_keys() {
        let config = AggregatorConfig::from_json_value(json!({
            "intervalCount": 1,
            "intervalUnit": "h",
            "aggregationType": "median",
        }))
        .unwrap();
        check!(!config.is_per_topic());
        check!(!config.is_incomplete_interval_submitted());
        check!(config.combined_topic() == "");
        check!(config.invalid_payload_policy() == InvalidPayloadPolicy::Propagate);
    }

    #[test]
    fn node_style_keys_are_accepted() {
        let config = AggregatorConfig::from_json_value(json!({
            "id": "4f2a",
            "name": "hourly max",
            "intervalCount": 1,
            "intervalUnits": "h",
            "aggregationType": "max",
            "topic": "hourly",
            "wires": [["a1"]],
        }))
        .unwrap();
        check!(config.interval_unit() == IntervalUnit::Hour);
        check!(config.combined_topic() == "hourly");
    }

    #[rstest]
    #[case(json!(15))]
    #[case(json!("15"))]
    #[case(json!(" 15 "))]
    fn interval_count_accepts_numeric_strings(#[case] count: serde_json::Value) {
        let config = AggregatorConfig::from_json_value(json!({
            "intervalCount": count,
            "intervalUnit": "s",
            "aggregationType": "sum",
        }))
        .unwrap();
        check!(config.interval_count() == 15);
        check!(config.interval_millis() == 15_000);
    }

    #[rstest]
    #[case(json!({"intervalCount": -3, "intervalUnit": "s", "aggregationType": "sum"}), "positive")]
    #[case(json!({"intervalCount": 0, "intervalUnit": "s", "aggregationType": "sum"}), "positive")]
    #[case(json!({"intervalCount": 1, "intervalUnit": "w", "aggregationType": "sum"}), "interval unit")]
    #[case(json!({"intervalCount": 1, "intervalUnit": "s", "aggregationType": "mode"}), "aggregation type")]
    #[case(json!({"intervalCount": 1, "intervalUnit": "s", "aggregationType": "sum", "invalidPayload": "ignore"}), "payload policy")]
    #[case(json!({"intervalCount": 1, "intervalUnit": "s", "aggregationType": "sum", "timeZone": "Mars/Olympus"}), "time zone")]
    #[case(json!({"intervalUnit": "s", "aggregationType": "sum"}), "intervalCount")]
    #[case(json!({"intervalCount": "five", "intervalUnit": "s", "aggregationType": "sum"}), "not an integer")]
    #[case(json!({"intervalCount": "-2", "intervalUnit": "s", "aggregationType": "sum"}), "positive")]
    fn invalid_documents(#[case] document: serde_json::Value, #[case] needle: &str) {
        let_assert!(Err(err) = AggregatorConfig::from_json_value(document));
        let message = err.to_string();
        check!(message.contains(needle), "{message}");
    }

    #[test]
    fn deserialize_validates() {
        let result: Result<AggregatorConfig, _> = serde_json::from_value(json!({
            "intervalCount": 0,
            "intervalUnit": "m",
            "aggregationType": "mean",
        }));
        check!(result.is_err());
    }

    #[test]
    fn from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggregator.toml");
        std::fs::write(
            &path,
            "intervalCount = 3\nintervalUnit = \"m\"\naggregationType = \"min\"\n",
        )
        .unwrap();
        let config = AggregatorConfig::from_toml_file(&path).unwrap();
        check!(config.interval() == Duration::from_secs(180));

        let_assert!(Err(ConfigError::Io(_)) = AggregatorConfig::from_toml_file(dir.path().join("missing.toml")));
    }
}
