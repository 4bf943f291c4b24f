//! Stream tailer: consumes a push-style feed one item at a time.
//!
//! Each item is filed under the UTC date of its own `created_utc`, not the
//! time it was received. The tailer throttles itself to one item per
//! configured interval whatever the arrival rate. A bad item is logged and
//! skipped; only a lost connection ends the run. Reconnecting is left to
//! the process supervisor.
//!
//! There is no persisted cursor. After a restart, items emitted while the
//! process was down are only recovered if the feed's first poll still
//! returns them, and those may then be appended twice.

use crate::error::{IngestError, Result};
use crate::models::{PartitionKey, Record};
use crate::outputs::sink::PartitionSink;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// A remote feed of new items for a named set of topics.
pub trait SubmissionFeed {
    fn topics(&self) -> &[String];

    /// Open the connection. The stream yields raw items and ends with an
    /// [`IngestError::Connection`] if the connection drops.
    fn submissions(self) -> impl Stream<Item = Result<Value>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerSettings {
    /// Minimum time spent per item.
    pub throttle: Duration,
    /// Line log name inside each date partition.
    pub log_name: String,
    /// Keys to keep from each item; empty keeps the item verbatim.
    pub fields: Vec<String>,
}

/// Counts for a tail run that ended because the feed finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailReport {
    pub processed: usize,
    pub failed: usize,
    pub per_partition: BTreeMap<PartitionKey, usize>,
}

pub struct StreamTailer {
    sink: PartitionSink,
    settings: TailerSettings,
}

impl StreamTailer {
    pub fn new(sink: PartitionSink, settings: TailerSettings) -> Self {
        Self { sink, settings }
    }

    /// Tail `feed` until it ends or its connection fails.
    pub async fn tail<F: SubmissionFeed>(&self, feed: F) -> Result<TailReport> {
        info!(topics = %feed.topics().join("+"), "Starting stream");
        self.run(feed.submissions()).await
    }

    /// Consume `items` one at a time.
    ///
    /// Returns `Ok` only when the stream ends on its own, which a live feed
    /// never does.
    #[instrument(level = "info", skip_all, fields(log = %self.settings.log_name))]
    pub async fn run<S>(&self, items: S) -> Result<TailReport>
    where
        S: Stream<Item = Result<Value>>,
    {
        let mut items = std::pin::pin!(items);
        let mut report = TailReport::default();

        while let Some(item) = items.next().await {
            match item {
                Err(e @ IngestError::Connection(_)) => {
                    error!(
                        error = %e,
                        processed = report.processed,
                        failed = report.failed,
                        "Feed connection lost"
                    );
                    return Err(e);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "Skipping unreadable item");
                }
                Ok(raw) => match self.process(raw).await {
                    Ok(key) => {
                        report.processed += 1;
                        *report.per_partition.entry(key).or_default() += 1;
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(error = %e, "Error processing item");
                    }
                },
            }
            sleep(self.settings.throttle).await;
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            partitions = report.per_partition.len(),
            "Feed ended"
        );
        Ok(report)
    }

    async fn process(&self, raw: Value) -> Result<PartitionKey> {
        let id = item_id(&raw);
        let (key, record) = route(raw, &self.settings.fields)?;

        self.sink
            .append(&key, &self.settings.log_name, std::slice::from_ref(&record))
            .await
            .map_err(|e| IngestError::Item {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        debug!(%id, partition = %key, "Saved item");
        Ok(key)
    }
}

fn item_id(raw: &Value) -> String {
    match raw.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Work out an item's partition from its own timestamp and shape its record.
fn route(raw: Value, fields: &[String]) -> Result<(PartitionKey, Record)> {
    let id = item_id(&raw);
    let Value::Object(item) = raw else {
        return Err(IngestError::Item {
            id,
            reason: "item is not a JSON object".into(),
        });
    };

    let key = item
        .get("created_utc")
        .and_then(Value::as_f64)
        .and_then(PartitionKey::from_unix_seconds)
        .ok_or_else(|| IngestError::Item {
            id: id.clone(),
            reason: "missing or invalid created_utc".into(),
        })?;

    let record = if fields.is_empty() {
        item
    } else {
        fields
            .iter()
            .map(|f| (f.clone(), item.get(f).cloned().unwrap_or(Value::Null)))
            .collect()
    };

    Ok((key, record))
}
