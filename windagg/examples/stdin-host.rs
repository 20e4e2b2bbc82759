//! Reads JSON messages from stdin, one per line, and prints each window's output to
//! stdout as JSON lines.
//!
//! ```text
//! cargo run --example stdin-host -- aggregator.toml < readings.jsonl
//! ```
//!
//! `aggregator.toml` holds the same keys as the JSON configuration, for example:
//!
//! ```toml
//! intervalCount = 10
//! intervalUnit = "s"
//! aggregationType = "mean"
//! submitPerTopic = true
//! ```
//!
//! Stops on Ctrl-C or end of input. Anything still buffered is dropped.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use windagg::{AggregatorConfig, Message, WindowedAggregator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the aggregates, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: stdin-host <config.toml>")?;
    let config = AggregatorConfig::from_toml_file(&path)
        .with_context(|| format!("loading configuration from {path}"))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let aggregator = WindowedAggregator::new(config, tx);
    let delay = aggregator.start()?;
    info!(?delay, "waiting for the first window to close");

    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(%err, "could not serialize output message"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str(&line) {
                    Ok(value) => aggregator.handle_input(value),
                    Err(err) => warn!(%err, "skipping line that is not JSON"),
                },
                None => {
                    info!("end of input");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    aggregator.shutdown();
    // dropping the last handle drops the sender, which ends the printer
    drop(aggregator);
    printer.await?;
    Ok(())
}
