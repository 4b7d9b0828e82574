//! Telemetry
//!
//! [`Telemetry`] is a cheap, cloneable handle. Recording never blocks: events
//! go through a channel to a background exporter that ships them in batches
//! to a [`TelemetrySink`]. `close` stops the exporter after draining every
//! event recorded so far, within a deadline, and is the last step before the
//! process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events exported in one call at most
const MAX_BATCH: usize = 100;

/// Upper bound of one export request to an HTTP collector
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// One telemetry event
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("export request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("export rejected with status {0}")]
    Rejected(u16),
}

/// Destination of exported events
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn export(&self, batch: &[Event]) -> Result<(), TelemetryError>;
}

/// Writes events to the log
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn export(&self, batch: &[Event]) -> Result<(), TelemetryError> {
        for event in batch {
            debug!(event = %event.name, attributes = ?event.attributes, "telemetry");
        }
        Ok(())
    }
}

/// Posts batches as a JSON array to an HTTP collector
pub struct HttpSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TelemetryError> {
        Self::with_timeout(endpoint, EXPORT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn export(&self, batch: &[Event]) -> Result<(), TelemetryError> {
        let response = self.client.post(&self.endpoint).json(batch).send().await?;
        if !response.status().is_success() {
            return Err(TelemetryError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

struct Exporter {
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<usize>>>,
}

/// Handle to the telemetry pipeline
#[derive(Clone)]
pub struct Telemetry {
    tx: mpsc::UnboundedSender<Event>,
    exporter: Arc<Exporter>,
}

impl Telemetry {
    /// Spawns the exporter; must be called inside a tokio runtime
    pub fn start(sink: Arc<dyn TelemetrySink>, flush_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let task = tokio::spawn(export_loop(rx, sink, stop.clone(), flush_interval));

        Self {
            tx,
            exporter: Arc::new(Exporter {
                stop,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Records an event; dropped with a warning once telemetry is closed
    pub fn record(&self, name: &str, attributes: Value) {
        let attributes = match attributes {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_string(), other)]),
        };

        let event = Event {
            name: name.to_string(),
            timestamp: Utc::now(),
            attributes,
        };

        if self.exporter.stop.is_cancelled() || self.tx.send(event).is_err() {
            warn!(event = name, "telemetry closed, event dropped");
        }
    }

    /// Flushes every recorded event and stops the exporter.
    ///
    /// An exporter still busy after `deadline` is aborted and its pending
    /// events are lost. Safe to call more than once; later calls return
    /// immediately.
    pub async fn close(&self, deadline: Duration) {
        let Some(mut task) = self.exporter.task.lock().await.take() else {
            return;
        };

        self.exporter.stop.cancel();
        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(exported)) => info!(exported, "telemetry flushed"),
            Ok(Err(e)) => warn!(error = %e, "telemetry exporter failed"),
            Err(_) => {
                task.abort();
                warn!(?deadline, "telemetry flush timed out, pending events dropped");
            }
        }
    }
}

async fn export_loop(
    mut rx: mpsc::UnboundedReceiver<Event>,
    sink: Arc<dyn TelemetrySink>,
    stop: CancellationToken,
    flush_interval: Duration,
) -> usize {
    let mut buffer = Vec::new();
    let mut exported = 0;
    let mut ticker = tokio::time::interval(flush_interval);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            Some(event) = rx.recv() => {
                buffer.push(event);
                if buffer.len() >= MAX_BATCH {
                    exported += flush(sink.as_ref(), &mut buffer).await;
                }
            }
            _ = ticker.tick() => {
                exported += flush(sink.as_ref(), &mut buffer).await;
            }
        }
    }

    while let Ok(event) = rx.try_recv() {
        buffer.push(event);
    }
    exported + flush(sink.as_ref(), &mut buffer).await
}

async fn flush(sink: &dyn TelemetrySink, buffer: &mut Vec<Event>) -> usize {
    if buffer.is_empty() {
        return 0;
    }

    let batch = std::mem::take(buffer);
    match sink.export(&batch).await {
        Ok(()) => batch.len(),
        Err(e) => {
            warn!(error = %e, dropped = batch.len(), "telemetry export failed");
            0
        }
    }
}
