//! Per-topic value buffers

use hashbrown::HashMap;

use crate::message::Message;

/// Values buffered since the last flush, keyed by topic
///
/// A topic is present only while it has at least one value. The most recent message for
/// each topic is kept alongside so per-topic output can reuse its passthrough fields.
#[derive(Debug, Default)]
pub struct TopicBuffers {
    values: HashMap<String, Vec<f64>>,
    last_message: HashMap<String, Message>,
}

/// Everything a flush consumes, detached from the live buffers
#[derive(Debug, Default)]
pub struct Drained {
    /// Values per topic, every list non-empty
    pub values: HashMap<String, Vec<f64>>,
    /// Most recent message per topic
    pub last_message: HashMap<String, Message>,
}

impl TopicBuffers {
    /// Empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `topic` and remember `message` as the topic's latest
    pub fn push(&mut self, topic: String, value: f64, message: Message) {
        self.values.entry(topic.clone()).or_default().push(value);
        self.last_message.insert(topic, message);
    }

    /// Swap out every buffered value and message, leaving the buffers empty
    ///
    /// Values and messages are taken together, so nothing from before the call can leak
    /// into the next window.
    pub fn take(&mut self) -> Drained {
        Drained {
            values: std::mem::take(&mut self.values),
            last_message: std::mem::take(&mut self.last_message),
        }
    }

    /// Drop everything buffered, returning how many values were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.value_count();
        self.values.clear();
        self.last_message.clear();
        dropped
    }

    /// Number of topics with buffered values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total number of buffered values across topics
    pub fn value_count(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    /// Values buffered for `topic`, in arrival order
    pub fn values(&self, topic: &str) -> Option<&[f64]> {
        self.values.get(topic).map(Vec::as_slice)
    }

    /// Topics with buffered values, in no particular order
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
