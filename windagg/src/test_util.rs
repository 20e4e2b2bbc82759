//! A sink that records emitted messages so tests can inspect them
//!
//! This requires that the `test-util` feature be enabled.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{message::Message, sink::MessageSink};

/// Sink half of [`test_message_sink`]
#[derive(Debug, Clone, Default)]
pub struct TestMessageSink {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl MessageSink for TestMessageSink {
    fn send(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

/// Inspector half of [`test_message_sink`]
#[derive(Debug, Clone)]
pub struct Inspector {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl Inspector {
    /// Everything emitted so far
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything emitted so far
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Payloads of everything emitted so far, sorted by topic
    pub fn payloads_by_topic(&self) -> Vec<(String, serde_json::Value)> {
        let mut payloads: Vec<_> = self
            .messages()
            .into_iter()
            .map(|m| (m.topic_key(), m.payload))
            .collect();
        payloads.sort_by(|a, b| a.0.cmp(&b.0));
        payloads
    }
}

/// A sink and an inspector sharing one message log
pub struct TestSink {
    /// Hand this to the aggregator
    pub sink: TestMessageSink,
    /// Keep this to look at what was emitted
    pub inspector: Inspector,
}

/// Create a [`TestSink`]
///
/// ```
/// use windagg::{Message, sink::MessageSink, test_util::test_message_sink};
///
/// let test_sink = test_message_sink();
/// test_sink.sink.send(Message::new("t", 1.0));
/// assert_eq!(test_sink.inspector.messages().len(), 1);
/// ```
pub fn test_message_sink() -> TestSink {
    let sink = TestMessageSink::default();
    let inspector = Inspector {
        messages: sink.messages.clone(),
    };
    TestSink { sink, inspector }
}
