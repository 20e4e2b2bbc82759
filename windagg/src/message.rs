//! Input and output messages
//!
//! A [`Message`] is a loosely typed JSON record. Only `topic` and `payload` mean anything to
//! the aggregator; every other field is carried along untouched so that per-topic output can
//! forward whatever metadata the most recent input on that topic had.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A message flowing into or out of an aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Partition key. Any JSON value; see [`Message::topic_key`] for how it becomes a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Value>,
    /// The value. `null` and `""` mean "no value".
    #[serde(default)]
    pub payload: Value,
    /// Everything else the message carried
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Message {
    /// A message with just a topic and a payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            topic: Some(Value::String(topic.into())),
            payload: payload.into(),
            fields: Map::new(),
        }
    }

    /// Add a passthrough field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The buffer key this message is aggregated under
    ///
    /// Missing and falsy topics (`null`, `false`, `0`, `""`) all map to the empty string.
    /// Strings are used verbatim. Numbers with no fractional part drop the `.0`, arrays
    /// join their elements with `,`, and objects use their JSON text.
    ///
    /// ```
    /// use serde_json::json;
    /// use windagg::Message;
    ///
    /// assert_eq!(Message::new("temp", 1).topic_key(), "temp");
    /// let numeric: Message = serde_json::from_value(json!({"topic": 7, "payload": 1})).unwrap();
    /// assert_eq!(numeric.topic_key(), "7");
    /// let float: Message = serde_json::from_value(json!({"topic": 2.0, "payload": 1})).unwrap();
    /// assert_eq!(float.topic_key(), "2");
    /// assert_eq!(Message::default().topic_key(), "");
    /// ```
    pub fn topic_key(&self) -> String {
        match &self.topic {
            None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
            Some(Value::String(topic)) => topic.clone(),
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
            Some(other) => topic_text(other),
        }
    }

    /// Whether the payload is the "no value" sentinel (`null` or `""`)
    pub fn has_value(&self) -> bool {
        !matches!(&self.payload, Value::Null) && self.payload.as_str() != Some("")
    }

    /// The payload as a number, NaN if it does not parse
    ///
    /// Strings are parsed leniently: leading whitespace is skipped and the longest numeric
    /// prefix is used, so `"12.5 kWh"` reads as `12.5`.
    ///
    /// ```
    /// use windagg::Message;
    ///
    /// assert_eq!(Message::new("t", " 12.5 kWh").numeric_payload(), 12.5);
    /// assert_eq!(Message::new("t", 3).numeric_payload(), 3.0);
    /// assert!(Message::new("t", "n/a").numeric_payload().is_nan());
    /// ```
    pub fn numeric_payload(&self) -> f64 {
        parse_payload(&self.payload)
    }

    pub(crate) fn set_numeric_payload(&mut self, value: f64) {
        self.payload = number(value);
    }
}

fn topic_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        // f64's Display never prints a trailing `.0`
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(topic_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// JSON number for `value`, `null` when it is not finite
pub(crate) fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)")
        .expect("float prefix pattern is valid")
});

fn parse_payload(payload: &Value) -> f64 {
    match payload {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_float_prefix(s),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn parse_float_prefix(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let Some(prefix) = FLOAT_PREFIX.find(trimmed) else {
        return f64::NAN;
    };
    let digits = prefix.as_str();
    match digits.trim_start_matches(['+', '-']) {
        "Infinity" if digits.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => digits.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("3", 3.0)]
    #[case("  -4.25", -4.25)]
    #[case("1e3", 1000.0)]
    #[case("2.5E-1xyz", 0.25)]
    #[case(".5", 0.5)]
    #[case("7.", 7.0)]
    #[case("+8", 8.0)]
    #[case("12abc", 12.0)]
    #[case("1e", 1.0)]
    #[case("Infinity", f64::INFINITY)]
    #[case("-Infinity and beyond", f64::NEG_INFINITY)]
    fn string_payloads(#[case] payload: &str, #[case] expected: f64) {
        check!(parse_float_prefix(payload) == expected);
    }

    #[rstest]
    #[case(json!("abc"))]
    #[case(json!("-"))]
    #[case(json!("."))]
    #[case(json!(true))]
    #[case(json!([1, 2]))]
    #[case(json!({"v": 1}))]
    fn non_numeric_payloads(#[case] payload: Value) {
        check!(parse_payload(&payload).is_nan());
    }

    #[test]
    fn no_value_sentinels() {
        check!(!Message::new("t", "").has_value());
        check!(!Message::new("t", Value::Null).has_value());
        check!(!Message::default().has_value());
        check!(Message::new("t", 0).has_value());
        check!(Message::new("t", " ").has_value());
    }

    #[rstest]
    #[case(json!({"payload": 1}), "")]
    #[case(json!({"topic": null, "payload": 1}), "")]
    #[case(json!({"topic": "", "payload": 1}), "")]
    #[case(json!({"topic": 0, "payload": 1}), "")]
    #[case(json!({"topic": false, "payload": 1}), "")]
    #[case(json!({"topic": true, "payload": 1}), "true")]
    #[case(json!({"topic": 42, "payload": 1}), "42")]
    #[case(json!({"topic": 2.0, "payload": 1}), "2")]
    #[case(json!({"topic": -3.0, "payload": 1}), "-3")]
    #[case(json!({"topic": 2.5, "payload": 1}), "2.5")]
    #[case(json!({"topic": [1, 2], "payload": 1}), "1,2")]
    #[case(json!({"topic": ["a", null, [2.0, true]], "payload": 1}), "a,,2,true")]
    #[case(json!({"topic": {"id": 1}, "payload": 1}), r#"{"id":1}"#)]
    #[case(json!({"topic": "room/1", "payload": 1}), "room/1")]
    fn topic_coercion(#[case] input: Value, #[case] expected: &str) {
        let message: Message = serde_json::from_value(input).unwrap();
        check!(message.topic_key() == expected);
    }

    #[test]
    fn passthrough_fields_survive_round_trip() {
        let input = json!({"topic": "t", "payload": "5", "_msgid": "abc", "meta": {"unit": "C"}});
        let message: Message = serde_json::from_value(input.clone()).unwrap();
        check!(message.fields.get("_msgid") == Some(&json!("abc")));
        check!(serde_json::to_value(&message).unwrap() == input);
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        let mut message = Message::new("t", 1);
        message.set_numeric_payload(f64::NAN);
        check!(message.payload == Value::Null);
        message.set_numeric_payload(2.5);
        check!(message.payload == json!(2.5));
    }
}
