//! Batch summary and reconstruction from events.
//!
//! A batch is one orchestrator pass over an ordered list of document ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::ErrorKind;

use super::analysis::ClassificationLabel;
use super::events::{BatchEvent, EventType, Stage};

/// What the orchestrator reports once a batch has drained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,

    pub state: BatchState,

    /// Items classified and persisted
    pub processed: usize,

    /// Items that failed, each with its error kind
    pub failed: usize,

    /// Items skipped because the batch was cancelled first
    pub not_dispatched: usize,

    /// One result per requested id, in request order
    pub results: Vec<ItemResult>,

    pub boundaries: StageOutcome,

    pub recommendations: StageOutcome,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    /// Create an empty running summary for the given ids
    pub fn new(batch_id: Uuid, document_ids: &[String]) -> Self {
        Self {
            batch_id,
            state: BatchState::Running,
            processed: 0,
            failed: 0,
            not_dispatched: 0,
            results: document_ids
                .iter()
                .map(|id| ItemResult {
                    document_id: id.clone(),
                    outcome: ItemOutcome::Pending,
                })
                .collect(),
            boundaries: StageOutcome::NotRequested,
            recommendations: StageOutcome::NotRequested,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record the outcome for the item at `index`, keeping counters in step
    pub fn record(&mut self, index: usize, outcome: ItemOutcome) {
        let Some(slot) = self.results.get_mut(index) else {
            return;
        };

        match slot.outcome {
            ItemOutcome::Succeeded { .. } => self.processed -= 1,
            ItemOutcome::Failed { .. } => self.failed -= 1,
            ItemOutcome::NotDispatched => self.not_dispatched -= 1,
            ItemOutcome::Pending => {}
        }
        match outcome {
            ItemOutcome::Succeeded { .. } => self.processed += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::NotDispatched => self.not_dispatched += 1,
            ItemOutcome::Pending => {}
        }
        slot.outcome = outcome;
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, BatchState::Cancelled)
    }

    /// Reconstruct a summary by replaying a batch log
    pub fn from_events(events: &[BatchEvent]) -> Option<Self> {
        let first = events.first()?;
        if first.event_type != EventType::BatchStarted {
            return None;
        }

        let mut summary = Self::new(first.batch_id, &first.record_ids);
        summary.started_at = first.timestamp;

        for event in &events[1..] {
            summary.apply_event(event);
        }

        Some(summary)
    }

    /// Apply a single event to update the summary
    pub fn apply_event(&mut self, event: &BatchEvent) {
        match event.event_type {
            EventType::BatchStarted => {
                self.started_at = event.timestamp;
            }
            EventType::ItemCompleted => {
                let outcome = ItemOutcome::Succeeded {
                    analysis_id: event.record_ids.first().cloned().unwrap_or_default(),
                    label: event.label.unwrap_or(ClassificationLabel::Indeterminate),
                    confidence: event.confidence.unwrap_or_default(),
                };
                self.record_for(event, outcome);
            }
            EventType::ItemFailed => {
                let outcome = ItemOutcome::Failed {
                    kind: event.error_kind.unwrap_or(ErrorKind::Internal),
                    message: event.error.clone().unwrap_or_default(),
                };
                self.record_for(event, outcome);
            }
            EventType::ItemNotDispatched => {
                self.record_for(event, ItemOutcome::NotDispatched);
            }
            EventType::BarrierReached => {}
            EventType::StageCompleted => {
                self.set_stage(
                    event.stage,
                    StageOutcome::Completed {
                        record_ids: event.record_ids.clone(),
                    },
                );
            }
            EventType::StageSkipped => {
                self.set_stage(
                    event.stage,
                    StageOutcome::Skipped {
                        reason: event.payload_summary.clone(),
                    },
                );
            }
            EventType::StageFailed => {
                self.set_stage(
                    event.stage,
                    StageOutcome::Failed {
                        kind: event.error_kind.unwrap_or(ErrorKind::Internal),
                        message: event.error.clone().unwrap_or_default(),
                    },
                );
            }
            EventType::BatchCancelled => {
                self.state = BatchState::Cancelled;
            }
            EventType::BatchCompleted => {
                if !self.is_cancelled() {
                    self.state = BatchState::Completed;
                }
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    fn record_for(&mut self, event: &BatchEvent, outcome: ItemOutcome) {
        let Some(document_id) = event.document_id.as_deref() else {
            return;
        };
        // the same id may be requested twice; fill the first open slot
        let index = self
            .results
            .iter()
            .position(|r| r.document_id == document_id && r.outcome == ItemOutcome::Pending)
            .or_else(|| self.results.iter().position(|r| r.document_id == document_id));
        if let Some(index) = index {
            self.record(index, outcome);
        }
    }

    fn set_stage(&mut self, stage: Option<Stage>, outcome: StageOutcome) {
        match stage {
            Some(Stage::Boundaries) => self.boundaries = outcome,
            Some(Stage::Recommendations) => self.recommendations = outcome,
            None => {}
        }
    }
}

/// Per-id entry of a batch summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub document_id: String,
    pub outcome: ItemOutcome,
}

/// What happened to one requested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ItemOutcome {
    /// Not finished yet (only seen while a batch is running)
    Pending,

    Succeeded {
        analysis_id: String,
        label: ClassificationLabel,
        confidence: f64,
    },

    Failed {
        kind: ErrorKind,
        message: String,
    },

    NotDispatched,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// What happened to a post-barrier stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StageOutcome {
    NotRequested,
    Completed { record_ids: Vec<String> },
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Running,
    Completed,
    Cancelled,
}
