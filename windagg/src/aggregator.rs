//! The windowed aggregator: ingest, flush and timer lifecycle

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use serde_json::{Map, Value};
use windagg_timesource::TimeSource;

use crate::{
    align::aligned_start_delay,
    buffer::{Drained, TopicBuffers},
    config::{AggregatorConfig, InvalidPayloadPolicy},
    error::{IngestError, StartError},
    message::{Message, number},
    scheduler::{Scheduler, TimerHandle, TokioScheduler},
    sink::{BoxMessageSink, MessageSink},
};

/// Buffers values by topic and emits one summary per wall-clock aligned interval
///
/// The lifecycle is:
/// 1. [`start`](Self::start) arms a one-shot timer for the first aligned boundary.
/// 2. At that boundary the partial first window is emitted or discarded (see
///    [`AggregatorConfig::submit_incomplete_interval`]) and a repeating timer is armed.
/// 3. Every interval after that, [`flush`](Self::flush) reduces and emits what was buffered.
/// 4. [`shutdown`](Self::shutdown) cancels both timers and drops anything still buffered.
///
/// Ingest and flush may race freely: a value lands either before or after a flush's
/// clear, never both.
///
/// Clones are handles to the same aggregator. Separate aggregators never share buffers.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use windagg::{AggregationType, AggregatorConfig, IntervalUnit, Message, WindowedAggregator};
/// use windagg::test_util::test_message_sink;
///
/// let config = AggregatorConfig::new(1, IntervalUnit::Minute, AggregationType::Max)?
///     .submit_per_topic(true);
/// let output = test_message_sink();
/// let aggregator = WindowedAggregator::new(config, output.sink);
///
/// for payload in ["3", "9", "1"] {
///     aggregator.ingest(Message::new("t", payload))?;
/// }
/// aggregator.flush();
///
/// let emitted = output.inspector.messages();
/// assert_eq!(emitted.len(), 1);
/// assert_eq!(emitted[0].topic, Some(json!("t")));
/// assert_eq!(emitted[0].payload, json!(9.0));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct WindowedAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    config: AggregatorConfig,
    sink: BoxMessageSink,
    time_source: TimeSource,
    buffers: Mutex<TopicBuffers>,
    timers: Mutex<Timers>,
}

#[derive(Default)]
struct Timers {
    lifecycle: Lifecycle,
    scheduler: Option<Arc<dyn Scheduler>>,
    first_boundary: Option<TimerHandle>,
    periodic: Option<TimerHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lifecycle {
    #[default]
    Idle,
    Running,
    ShutDown,
}

/// What [`WindowedAggregator::ingest`] did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// The value was buffered under `topic`
    Buffered {
        /// Buffer key
        topic: String,
        /// Parsed value, possibly NaN
        value: f64,
    },
    /// The payload was `null` or `""`; nothing was buffered
    Skipped,
}

/// Builder for [`WindowedAggregator`]
///
/// Only needed to replace the clock or the scheduler; [`WindowedAggregator::new`] covers
/// everything else.
pub struct WindowedAggregatorBuilder {
    config: AggregatorConfig,
    time_source: TimeSource,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl WindowedAggregatorBuilder {
    /// Read the wall clock from `time_source` when aligning the first boundary
    pub fn time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Arm timers through `scheduler`
    ///
    /// Defaults to a [`TokioScheduler`] on the runtime that calls
    /// [`start`](WindowedAggregator::start).
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Build an aggregator that emits into `sink`
    pub fn build(self, sink: impl MessageSink + 'static) -> WindowedAggregator {
        WindowedAggregator {
            inner: Arc::new(Inner {
                config: self.config,
                sink: Box::new(sink),
                time_source: self.time_source,
                buffers: Mutex::new(TopicBuffers::new()),
                timers: Mutex::new(Timers {
                    scheduler: self.scheduler,
                    ..Timers::default()
                }),
            }),
        }
    }
}

impl WindowedAggregator {
    /// Aggregator on the system clock that emits into `sink`
    pub fn new(config: AggregatorConfig, sink: impl MessageSink + 'static) -> Self {
        Self::builder(config).build(sink)
    }

    /// Start building an aggregator with a custom clock or scheduler
    pub fn builder(config: AggregatorConfig) -> WindowedAggregatorBuilder {
        WindowedAggregatorBuilder {
            config,
            time_source: TimeSource::default(),
            scheduler: None,
        }
    }

    /// The configuration this aggregator runs with
    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    /// Buffer the value carried by `message`
    ///
    /// A `null` or `""` payload is skipped without error. Any other payload is parsed as a
    /// number; what happens when that fails depends on the configured
    /// [`InvalidPayloadPolicy`]. The message itself is remembered as the latest for its
    /// topic, replacing any earlier one.
    pub fn ingest(&self, message: Message) -> Result<Ingested, IngestError> {
        if !message.has_value() {
            tracing::trace!("skipping message without a value");
            return Ok(Ingested::Skipped);
        }
        let topic = message.topic_key();
        let value = message.numeric_payload();
        let policy = self.inner.config.invalid_payload_policy();
        if value.is_nan() && policy == InvalidPayloadPolicy::Reject {
            return Err(IngestError::InvalidPayload {
                topic,
                payload: message.payload,
            });
        }
        tracing::trace!(%topic, value, "buffering value");
        self.inner.lock_buffers().push(topic.clone(), value, message);
        Ok(Ingested::Buffered { topic, value })
    }

    /// [`ingest`](Self::ingest) a JSON value, which must be an object shaped like a [`Message`]
    pub fn ingest_value(&self, value: Value) -> Result<Ingested, IngestError> {
        let message = serde_json::from_value(value).map_err(IngestError::Malformed)?;
        self.ingest(message)
    }

    /// [`ingest`](Self::ingest) a JSON document
    pub fn ingest_json(&self, document: &str) -> Result<Ingested, IngestError> {
        let message = serde_json::from_str(document).map_err(IngestError::Malformed)?;
        self.ingest(message)
    }

    /// Ingest `input`, logging and dropping it if it can't be buffered
    ///
    /// This is the entry point for hosts that feed an unbounded stream of messages: one bad
    /// message never affects the ones around it.
    pub fn handle_input(&self, input: Value) {
        if let Err(err) = self.ingest_value(input) {
            tracing::error!(%err, "dropping input message");
        }
    }

    /// Reduce, emit and clear everything buffered so far, returning how many messages were
    /// emitted
    ///
    /// Runs at every boundary; calling it by hand closes the current window early.
    ///
    /// Each value is emitted by exactly one flush, but emitting happens outside the
    /// buffer lock. A manual flush racing the timer may therefore reach the sink after
    /// the window that followed it.
    pub fn flush(&self) -> usize {
        self.inner.flush()
    }

    /// Clear everything buffered so far without emitting, returning how many values were
    /// dropped
    pub fn discard(&self) -> usize {
        self.inner.lock_buffers().clear()
    }

    /// How long from now until the first aligned boundary
    pub fn start_delay(&self) -> Duration {
        let config = &self.inner.config;
        let now = self.inner.time_source.local_epoch_millis(config.zone());
        aligned_start_delay(now, config.interval_millis())
    }

    /// Arm the first-boundary timer, returning the delay until it fires
    ///
    /// Without an explicit scheduler this must be called from within a tokio runtime.
    pub fn start(&self) -> Result<Duration, StartError> {
        let scheduler = {
            let mut timers = self.inner.lock_timers();
            match timers.lifecycle {
                Lifecycle::Running => return Err(StartError::AlreadyStarted),
                Lifecycle::ShutDown => return Err(StartError::ShutDown),
                Lifecycle::Idle => {}
            }
            let scheduler = match &timers.scheduler {
                Some(scheduler) => scheduler.clone(),
                None => {
                    let scheduler: Arc<dyn Scheduler> = Arc::new(
                        TokioScheduler::try_current().map_err(|_| StartError::NoRuntime)?,
                    );
                    timers.scheduler = Some(scheduler.clone());
                    scheduler
                }
            };
            timers.lifecycle = Lifecycle::Running;
            scheduler
        };

        let delay = self.start_delay();
        let weak = Arc::downgrade(&self.inner);
        let handle = scheduler.arm_once(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_first_boundary();
                }
            }),
        );
        self.inner.keep_timer(handle, |timers| &mut timers.first_boundary);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            interval_ms = self.inner.config.interval_millis(),
            "aggregator started, waiting for first aligned boundary"
        );
        Ok(delay)
    }

    /// Cancel all timers and drop anything buffered. No final flush happens.
    ///
    /// Idempotent. A shut down aggregator can't be started again.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Whether [`start`](Self::start) succeeded and [`shutdown`](Self::shutdown) has not been called
    pub fn is_running(&self) -> bool {
        self.inner.lock_timers().lifecycle == Lifecycle::Running
    }

    /// Topics with buffered values, sorted
    pub fn pending_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .inner
            .lock_buffers()
            .topics()
            .map(str::to_owned)
            .collect();
        topics.sort();
        topics
    }

    /// Values buffered for `topic`, in arrival order
    pub fn pending_values(&self, topic: &str) -> Vec<f64> {
        self.inner
            .lock_buffers()
            .values(topic)
            .map(<[f64]>::to_vec)
            .unwrap_or_default()
    }
}

impl Inner {
    fn lock_buffers(&self) -> MutexGuard<'_, TopicBuffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) -> usize {
        // the lock is released before reducing, so ingest only waits for the swap
        let drained = self.lock_buffers().take();
        let topics = drained.values.len();
        let emitted = if self.config.is_per_topic() {
            self.emit_per_topic(drained)
        } else {
            self.emit_combined(drained)
        };
        tracing::debug!(topics, emitted, "flushed window");
        emitted
    }

    fn emit_per_topic(&self, drained: Drained) -> usize {
        let Drained {
            values,
            mut last_message,
        } = drained;
        let kind = self.config.aggregation_type();
        let mut per_topic: Vec<(String, Vec<f64>)> = values.into_iter().collect();
        per_topic.sort_by(|a, b| a.0.cmp(&b.0));

        let mut emitted = 0;
        for (topic, values) in per_topic {
            if values.is_empty() {
                continue;
            }
            let aggregate = kind.aggregate(&values);
            let mut message = last_message.remove(&topic).unwrap_or_default();
            message.topic = Some(Value::String(topic));
            message.set_numeric_payload(aggregate);
            self.sink.send(message);
            emitted += 1;
        }
        emitted
    }

    fn emit_combined(&self, drained: Drained) -> usize {
        let kind = self.config.aggregation_type();
        let Some(combined) = kind.aggregate_groups(drained.values.values().map(Vec::as_slice))
        else {
            return 0;
        };
        self.sink.send(Message {
            topic: Some(Value::String(self.config.combined_topic().to_owned())),
            payload: number(combined),
            fields: Map::new(),
        });
        1
    }

    fn on_first_boundary(self: Arc<Self>) {
        if self.config.is_incomplete_interval_submitted() {
            self.flush();
        } else {
            let dropped = self.lock_buffers().clear();
            if dropped > 0 {
                tracing::debug!(dropped, "discarded values from incomplete first interval");
            }
        }

        let Some(scheduler) = self.lock_timers().scheduler.clone() else {
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self);
        let handle = scheduler.arm_repeating(
            self.config.interval(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush();
                }
            }),
        );
        self.keep_timer(handle, |timers| &mut timers.periodic);
    }

    // Stores a freshly armed timer, or cancels it straight away if shutdown won the race.
    fn keep_timer(
        &self,
        handle: TimerHandle,
        slot: impl FnOnce(&mut Timers) -> &mut Option<TimerHandle>,
    ) {
        let mut timers = self.lock_timers();
        if timers.lifecycle == Lifecycle::Running {
            *slot(&mut timers) = Some(handle);
        } else {
            handle.cancel();
        }
    }

    fn shutdown(&self) {
        let (first_boundary, periodic) = {
            let mut timers = self.lock_timers();
            if timers.lifecycle == Lifecycle::ShutDown {
                return;
            }
            timers.lifecycle = Lifecycle::ShutDown;
            (timers.first_boundary.take(), timers.periodic.take())
        };
        for handle in first_boundary.iter().chain(periodic.iter()) {
            handle.cancel();
        }
        let dropped = self.lock_buffers().clear();
        tracing::info!(dropped, "aggregator shut down");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in timers.first_boundary.iter().chain(timers.periodic.iter()) {
            handle.cancel();
        }
    }
}
