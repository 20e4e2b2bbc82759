//! Destinations for aggregated messages

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::message::Message;

/// Receives the messages an aggregator emits at each boundary
///
/// `send` is called from whatever context the flush runs on and must not block.
pub trait MessageSink: Send + Sync {
    /// Accept one emitted message
    fn send(&self, message: Message);
}

impl MessageSink for mpsc::UnboundedSender<Message> {
    fn send(&self, message: Message) {
        if mpsc::UnboundedSender::send(self, message).is_err() {
            tracing::debug!("output channel closed, dropping aggregated message");
        }
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Arc<S> {
    fn send(&self, message: Message) {
        (**self).send(message)
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn send(&self, message: Message) {
        (**self).send(message)
    }
}

/// Adapts a closure into a [`MessageSink`]
///
/// ```
/// use windagg::{Message, sink::{FnSink, MessageSink}};
///
/// let sink = FnSink(|message: Message| println!("{}", message.topic_key()));
/// sink.send(Message::new("t", 1.0));
/// ```
pub struct FnSink<F>(pub F);

impl<F> MessageSink for FnSink<F>
where
    F: Fn(Message) + Send + Sync,
{
    fn send(&self, message: Message) {
        (self.0)(message)
    }
}

/// Type-erased sink
pub type BoxMessageSink = Box<dyn MessageSink>;
