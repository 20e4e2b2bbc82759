#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod aggregator;
pub mod align;
pub mod buffer;
pub mod config;
pub mod error;
pub mod message;
pub mod reduce;
pub mod scheduler;
pub mod sink;

#[cfg(feature = "test-util")]
pub mod test_util;

pub use aggregator::{Ingested, WindowedAggregator, WindowedAggregatorBuilder};
pub use config::{AggregatorConfig, IntervalUnit, InvalidPayloadPolicy};
pub use error::{ConfigError, IngestError, StartError};
pub use message::Message;
pub use reduce::AggregationType;
pub use sink::MessageSink;

pub use windagg_timesource as timesource;
