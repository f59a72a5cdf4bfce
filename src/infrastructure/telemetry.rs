//! Telemetry sink and notification transport
//!
//! The sink is the durable recorder: the engine awaits it synchronously.
//! Notifications are best-effort: the producer never blocks, and a report
//! dropped from the channel is still on record via the sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::report::{CurrentAssetSnapshot, StrategyReport};

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record_report(&self, report: &StrategyReport) -> Result<()>;
    async fn record_snapshot(&self, snapshot: &CurrentAssetSnapshot) -> Result<()>;
}

/// Appends one JSON document per line to a local file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open telemetry file {}", self.path.display()))?;
        writeln!(file, "{}", line).context("append telemetry line")?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for JsonlSink {
    async fn record_report(&self, report: &StrategyReport) -> Result<()> {
        self.append(&report.to_json()?)
    }

    async fn record_snapshot(&self, snapshot: &CurrentAssetSnapshot) -> Result<()> {
        self.append(&snapshot.to_json()?)
    }
}

/// One-way bounded channel toward the notification consumer. `try_send`
/// only: a full or closed channel drops the payload.
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<String>>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier without a consumer; every payload is dropped.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn try_notify(&self, payload: String) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(payload) {
                debug!("notification dropped: {}", e);
            }
        }
    }
}
