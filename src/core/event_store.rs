//! Append-only batch log with file-based persistence.
//!
//! Each orchestrator batch writes its events as newline-delimited JSON
//! (JSONL) under `<batches>/<batch_id>/events.jsonl`. Replaying the log
//! rebuilds the batch summary for status reporting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::config::paths;
use crate::domain::{BatchEvent, BatchSummary, EventType};

/// File-based batch log using JSONL format
#[derive(Debug, Clone)]
pub struct BatchLog {
    batch_id: Uuid,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl BatchLog {
    /// Create or open the log for a batch under `batches_dir`
    pub async fn open(batches_dir: &Path, batch_id: Uuid) -> Result<Self> {
        let batch_dir = paths::batch_dir(batches_dir, &batch_id);

        fs::create_dir_all(&batch_dir)
            .await
            .with_context(|| format!("Failed to create batch directory: {}", batch_dir.display()))?;

        Ok(Self {
            batch_id,
            events_path: paths::batch_log(batches_dir, &batch_id),
        })
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &BatchEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<BatchEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: BatchEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Rebuild the batch summary from the log
    pub async fn summary(&self) -> Result<Option<BatchSummary>> {
        let events = self.replay().await?;
        Ok(BatchSummary::from_events(&events))
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> Result<Option<BatchEvent>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }

    /// List all batch IDs under `batches_dir`
    pub async fn list_batches(batches_dir: &Path) -> Result<Vec<Uuid>> {
        if !batches_dir.exists() {
            return Ok(Vec::new());
        }

        let mut batches = Vec::new();
        let mut entries = fs::read_dir(batches_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        batches.push(uuid);
                    }
                }
            }
        }

        batches.sort();
        Ok(batches)
    }
}
