//! Date-partitioned persistence for raw records.
//!
//! # Layout
//!
//! ```text
//! data_root/
//! └── 2024-05-01/
//!     ├── headlines_page_1.json    # snapshot, overwritten on re-run
//!     ├── tickers_group_1.json     # snapshot
//!     └── reddit_stream.jsonl      # append-only, one JSON object per line
//! ```
//!
//! The sink never deduplicates. Re-running a batch for a date overwrites its
//! snapshots; restarting the tailer may append items that are already present.

use crate::error::{IngestError, Result};
use crate::models::{PartitionKey, Record};
use crate::utils::ensure_writable_dir;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Filesystem sink rooted at one directory, one subdirectory per date.
#[derive(Debug, Clone)]
pub struct PartitionSink {
    root: PathBuf,
}

impl PartitionSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn partition_dir(&self, key: &PartitionKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    /// Create the root if needed and check it accepts writes.
    pub async fn ensure_writable(&self) -> Result<()> {
        ensure_writable_dir(&self.root).await
    }

    async fn ensure_partition(&self, key: &PartitionKey) -> Result<PathBuf> {
        let dir = self.partition_dir(key);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| IngestError::persistence(&dir, e))?;
        Ok(dir)
    }

    /// Append `records` to the partition's line log `log_name`.
    ///
    /// All lines of one call go out in a single write, so a partition's log
    /// never interleaves with another call's output.
    ///
    /// # Arguments
    ///
    /// * `key` - Date partition; its directory is created on first use
    /// * `log_name` - File name inside the partition, e.g. `reddit_stream.jsonl`
    /// * `records` - Written as compact JSON, one object per line, in order
    ///
    /// # Returns
    ///
    /// The number of records written. An empty slice writes nothing and
    /// creates no directory.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let sink = PartitionSink::new("data/raw");
    /// sink.append(&key, "reddit_stream.jsonl", &[record]).await?;
    /// // data/raw/2024-05-01/reddit_stream.jsonl gains one line
    /// ```
    #[instrument(level = "debug", skip(self, records), fields(partition = %key, count = records.len()))]
    pub async fn append(
        &self,
        key: &PartitionKey,
        log_name: &str,
        records: &[Record],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let path = self.ensure_partition(key).await?.join(log_name);

        let mut buf = Vec::with_capacity(records.len() * 512);
        for record in records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| IngestError::persistence(&path, e.into()))?;
            buf.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| IngestError::persistence(&path, e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| IngestError::persistence(&path, e))?;
        file.flush()
            .await
            .map_err(|e| IngestError::persistence(&path, e))?;

        debug!(path = %path.display(), bytes = buf.len(), "Appended records");
        Ok(records.len())
    }

    /// Write `payload` as the whole-file artifact `name`, replacing any
    /// previous version. Readers see either the old or the new file.
    ///
    /// # Arguments
    ///
    /// * `key` - Date partition the artifact belongs to
    /// * `name` - File name inside the partition, e.g. `headlines_page_1.json`
    /// * `payload` - Pretty-printed as JSON
    ///
    /// # Returns
    ///
    /// The path of the written file.
    ///
    /// # Errors
    ///
    /// [`IngestError::Persistence`] naming the path that could not be written.
    #[instrument(level = "info", skip(self, payload), fields(partition = %key))]
    pub async fn write_snapshot(
        &self,
        key: &PartitionKey,
        name: &str,
        payload: &Value,
    ) -> Result<PathBuf> {
        let dir = self.ensure_partition(key).await?;
        let path = dir.join(name);
        let tmp = dir.join(format!(".{name}.tmp"));

        let json = serde_json::to_vec_pretty(payload)
            .map_err(|e| IngestError::persistence(&path, e.into()))?;
        fs::write(&tmp, json)
            .await
            .map_err(|e| IngestError::persistence(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| IngestError::persistence(&path, e))?;

        info!(path = %path.display(), "Wrote snapshot");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn key(day: u32) -> PartitionKey {
        PartitionKey::new(NaiveDate::from_ymd_opt(2024, 5, day).unwrap())
    }

    fn record(id: &str) -> Record {
        json!({"id": id, "title": format!("post {id}")})
            .as_object()
            .cloned()
            .unwrap()
    }

    async fn read_lines(path: &Path) -> Vec<Record> {
        let text = fs::read_to_string(path).await.unwrap();
        text.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_sequential_appends_keep_both_records_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = PartitionSink::new(tmp.path());

        sink.append(&key(1), "log.jsonl", &[record("a")]).await.unwrap();
        sink.append(&key(1), "log.jsonl", &[record("b")]).await.unwrap();

        let lines = read_lines(&tmp.path().join("2024-05-01/log.jsonl")).await;
        assert_eq!(lines, vec![record("a"), record("b")]);
    }

    #[tokio::test]
    async fn test_append_routes_by_partition() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = PartitionSink::new(tmp.path());

        let n = sink
            .append(&key(1), "log.jsonl", &[record("a"), record("b")])
            .await
            .unwrap();
        assert_eq!(n, 2);
        sink.append(&key(2), "log.jsonl", &[record("c")]).await.unwrap();

        assert_eq!(read_lines(&tmp.path().join("2024-05-01/log.jsonl")).await.len(), 2);
        assert_eq!(read_lines(&tmp.path().join("2024-05-02/log.jsonl")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_append_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = PartitionSink::new(tmp.path());

        assert_eq!(sink.append(&key(1), "log.jsonl", &[]).await.unwrap(), 0);
        assert!(!tmp.path().join("2024-05-01").exists());
    }

    #[tokio::test]
    async fn test_snapshot_overwrites_previous_version() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = PartitionSink::new(tmp.path());

        sink.write_snapshot(&key(1), "page.json", &json!({"v": 1}))
            .await
            .unwrap();
        let path = sink
            .write_snapshot(&key(1), "page.json", &json!({"v": 2}))
            .await
            .unwrap();

        let stored: Value = serde_json::from_str(&fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(stored, json!({"v": 2}));
        assert!(!tmp.path().join("2024-05-01/.page.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the partition directory should be.
        std::fs::write(tmp.path().join("2024-05-01"), b"not a dir").unwrap();
        let sink = PartitionSink::new(tmp.path());

        let err = sink
            .append(&key(1), "log.jsonl", &[record("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Persistence { .. }));
    }
}
