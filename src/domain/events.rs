//! Batch events for the append-only batch log.
//!
//! Every state change of an analysis batch is recorded as an immutable event.
//! The summary of any batch can be reconstructed by replaying its events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::ErrorKind;

use super::analysis::ClassificationLabel;

/// A single event in a batch log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The batch this event belongs to
    pub batch_id: Uuid,

    /// Document the event concerns (item events only)
    pub document_id: Option<String>,

    /// Post-barrier stage the event concerns (stage events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    pub event_type: EventType,

    /// Human-readable summary
    pub payload_summary: String,

    pub status: ItemStatus,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Records produced (or, for `BatchStarted`, the requested document ids)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<ClassificationLabel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl BatchEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        batch_id: Uuid,
        event_type: EventType,
        payload_summary: String,
        status: ItemStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            batch_id,
            document_id: None,
            stage: None,
            event_type,
            payload_summary,
            status,
            duration_ms: None,
            error: None,
            error_kind: None,
            record_ids: Vec::new(),
            label: None,
            confidence: None,
        }
    }

    pub fn for_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn for_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, kind: ErrorKind, error: String) -> Self {
        self.error_kind = Some(kind);
        self.error = Some(error);
        self
    }

    pub fn with_records(mut self, record_ids: Vec<String>) -> Self {
        self.record_ids = record_ids;
        self
    }

    pub fn with_classification(mut self, label: ClassificationLabel, confidence: f64) -> Self {
        self.label = Some(label);
        self.confidence = Some(confidence);
        self
    }
}

/// Types of events that can occur during a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A batch was accepted; `record_ids` holds the requested document ids
    BatchStarted,

    /// A document was classified and its analysis persisted
    ItemCompleted,

    /// A document failed (extraction, persistence, limits, ...)
    ItemFailed,

    /// A document was never dispatched because the batch was cancelled
    ItemNotDispatched,

    /// All dispatched classification work has finished
    BarrierReached,

    StageCompleted,
    StageSkipped,
    StageFailed,

    /// The batch stopped dispatching on request
    BatchCancelled,

    /// The summary has been reported
    BatchCompleted,
}

/// Post-barrier stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Boundaries,
    Recommendations,
}

/// Status of an item or stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = BatchEvent::new(
            Uuid::new_v4(),
            EventType::ItemCompleted,
            "Classified doc-1".to_string(),
            ItemStatus::Completed,
        )
        .for_document("doc-1")
        .with_records(vec!["analysis-1".to_string()])
        .with_classification(ClassificationLabel::Treaty, 0.75);

        let json = serde_json::to_string(&event).unwrap();
        let parsed: BatchEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::ItemCompleted);
        assert_eq!(parsed.document_id.as_deref(), Some("doc-1"));
        assert_eq!(parsed.label, Some(ClassificationLabel::Treaty));
        assert_eq!(parsed.confidence, Some(0.75));
    }

    #[test]
    fn test_event_with_error() {
        let event = BatchEvent::new(
            Uuid::new_v4(),
            EventType::ItemFailed,
            "Failed doc-5".to_string(),
            ItemStatus::Failed,
        )
        .with_error(ErrorKind::Extraction, "document content is empty".to_string());

        assert_eq!(event.error_kind, Some(ErrorKind::Extraction));
        assert_eq!(event.error.as_deref(), Some("document content is empty"));
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let event = BatchEvent::new(
            Uuid::new_v4(),
            EventType::BarrierReached,
            "barrier".to_string(),
            ItemStatus::Completed,
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("record_ids"));
        assert!(!json.contains("error_kind"));
    }
}
