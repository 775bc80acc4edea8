//! Batch orchestrator for the analysis engine.
//!
//! Runs classification over a batch of document ids on a bounded worker
//! pool, waits for every dispatched item at a barrier, then runs the
//! requested post-barrier stages (boundaries, recommendations). A single
//! item's failure never aborts the batch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    AnalysisType, BatchEvent, BatchState, BatchSummary, EventType, ItemOutcome, ItemStatus,
    Jurisdiction, Stage, StageOutcome,
};

use super::engine::Engine;
use super::error::{EngineError, ErrorKind};
use super::event_store::BatchLog;
use super::limits::{BatchTracker, LimitViolation};

/// What a batch should do
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Ordered; duplicates are classified once per occurrence
    pub document_ids: Vec<String>,

    /// Classification always runs; `jurisdictional` adds the boundary stage
    pub analysis_types: BTreeSet<AnalysisType>,

    pub include_jus_cogens: bool,

    /// Restricts the boundary stage; empty means all jurisdictions
    pub jurisdictions: Vec<Jurisdiction>,
}

impl BatchRequest {
    pub fn new<I, S>(document_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut analysis_types = BTreeSet::new();
        analysis_types.insert(AnalysisType::CustomaryVsTreaty);
        Self {
            document_ids: document_ids.into_iter().map(Into::into).collect(),
            analysis_types,
            ..Default::default()
        }
    }

    pub fn with_boundaries(mut self) -> Self {
        self.analysis_types.insert(AnalysisType::Jurisdictional);
        self
    }

    pub fn with_jus_cogens(mut self) -> Self {
        self.include_jus_cogens = true;
        self
    }

    pub fn for_jurisdictions(mut self, jurisdictions: Vec<Jurisdiction>) -> Self {
        self.jurisdictions = jurisdictions;
        self
    }

    pub fn wants_boundaries(&self) -> bool {
        self.analysis_types.contains(&AnalysisType::Jurisdictional)
    }
}

/// Stops a running batch from dispatching further items
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Batch rejected before any work was dispatched
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch rejected: {0}")]
    Rejected(#[from] LimitViolation),
}

/// Result of one dispatched item
struct ItemReport {
    index: usize,
    document_id: String,
    duration_ms: u64,
    outcome: ItemOutcome,
}

/// Coordinates the engine over batches
#[derive(Debug, Clone)]
pub struct Orchestrator {
    engine: Engine,

    /// Where batch logs go; no logging when unset
    batches_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            batches_dir: None,
        }
    }

    /// Record every batch as JSONL under `batches_dir`
    pub fn with_batch_log(mut self, batches_dir: impl Into<PathBuf>) -> Self {
        self.batches_dir = Some(batches_dir.into());
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn batches_dir(&self) -> Option<&Path> {
        self.batches_dir.as_deref()
    }

    /// Run a batch to completion
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchSummary, BatchError> {
        self.run_with_cancel(request, &CancelHandle::new()).await
    }

    /// Run a batch, stopping dispatch once `cancel` fires
    ///
    /// Items already dispatched drain before the summary is reported.
    #[instrument(skip(self, request, cancel), fields(items = request.document_ids.len()))]
    pub async fn run_with_cancel(
        &self,
        request: &BatchRequest,
        cancel: &CancelHandle,
    ) -> Result<BatchSummary, BatchError> {
        let limits = &self.engine.settings().limits;
        limits.validate_batch(request.document_ids.len())?;

        let batch_id = Uuid::new_v4();
        let log = self.open_log(batch_id).await;
        let mut summary = BatchSummary::new(batch_id, &request.document_ids);
        let mut tracker = BatchTracker::new();

        info!(%batch_id, "Starting batch");
        emit(
            log.as_ref(),
            BatchEvent::new(
                batch_id,
                EventType::BatchStarted,
                format!("Batch of {} documents started", request.document_ids.len()),
                ItemStatus::Running,
            )
            .with_records(request.document_ids.clone()),
        )
        .await;

        // Dispatch
        let semaphore = Arc::new(Semaphore::new(limits.max_concurrency.max(1)));
        let mut workers = JoinSet::new();
        let mut dispatched = vec![false; request.document_ids.len()];

        for (index, document_id) in request.document_ids.iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }

            dispatched[index] = true;
            tracker.record_dispatch();

            let engine = self.engine.clone();
            let document_id = document_id.clone();
            workers.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let outcome = match engine.classify_with_report(&document_id).await {
                    Ok((analysis, report)) => ItemOutcome::Succeeded {
                        analysis_id: analysis.id,
                        label: report.label,
                        confidence: report.confidence,
                    },
                    Err(e) => ItemOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                };
                ItemReport {
                    index,
                    document_id,
                    duration_ms: started.elapsed().as_millis() as u64,
                    outcome,
                }
            });
        }

        // Barrier: every dispatched item finishes, success or failure
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    tracker.record_outcome(report.outcome.is_success());
                    emit(log.as_ref(), item_event(batch_id, &report)).await;
                    summary.record(report.index, report.outcome);
                }
                Err(e) => error!(error = %e, "Worker task ended abnormally"),
            }
        }

        for (index, was_dispatched) in dispatched.iter().enumerate() {
            let document_id = &request.document_ids[index];
            if !was_dispatched {
                emit(
                    log.as_ref(),
                    BatchEvent::new(
                        batch_id,
                        EventType::ItemNotDispatched,
                        "Batch cancelled before dispatch".to_string(),
                        ItemStatus::Skipped,
                    )
                    .for_document(document_id.clone()),
                )
                .await;
                summary.record(index, ItemOutcome::NotDispatched);
            } else if summary.results[index].outcome == ItemOutcome::Pending {
                let outcome = ItemOutcome::Failed {
                    kind: ErrorKind::Internal,
                    message: "worker task ended abnormally".to_string(),
                };
                tracker.record_outcome(false);
                emit(
                    log.as_ref(),
                    BatchEvent::new(
                        batch_id,
                        EventType::ItemFailed,
                        format!("Document {} failed", document_id),
                        ItemStatus::Failed,
                    )
                    .for_document(document_id.clone())
                    .with_error(ErrorKind::Internal, "worker task ended abnormally".to_string()),
                )
                .await;
                summary.record(index, outcome);
            }
        }

        emit(
            log.as_ref(),
            BatchEvent::new(
                batch_id,
                EventType::BarrierReached,
                format!(
                    "{} processed, {} failed, {} not dispatched",
                    summary.processed, summary.failed, summary.not_dispatched
                ),
                ItemStatus::Completed,
            )
            .with_duration(tracker.elapsed_ms()),
        )
        .await;

        let cancelled = cancel.is_cancelled();
        if cancelled {
            summary.state = BatchState::Cancelled;
            warn!(%batch_id, not_dispatched = summary.not_dispatched, "Batch cancelled");
            emit(
                log.as_ref(),
                BatchEvent::new(
                    batch_id,
                    EventType::BatchCancelled,
                    format!("{} documents not dispatched", summary.not_dispatched),
                    ItemStatus::Skipped,
                ),
            )
            .await;
        }

        // Post-barrier stages
        if request.wants_boundaries() {
            let outcome = if cancelled {
                StageOutcome::Skipped {
                    reason: "batch cancelled".to_string(),
                }
            } else {
                let processed = processed_ids(&summary);
                stage_outcome(
                    self.engine
                        .detect_boundaries(&request.jurisdictions, &processed)
                        .await
                        .map(|records| records.into_iter().map(|b| b.id).collect()),
                )
            };
            emit(log.as_ref(), stage_event(batch_id, Stage::Boundaries, &outcome)).await;
            summary.boundaries = outcome;
        }

        if request.include_jus_cogens {
            let outcome = if cancelled {
                StageOutcome::Skipped {
                    reason: "batch cancelled".to_string(),
                }
            } else {
                stage_outcome(
                    self.engine
                        .generate_recommendations()
                        .await
                        .map(|records| records.into_iter().map(|r| r.id).collect()),
                )
            };
            emit(log.as_ref(), stage_event(batch_id, Stage::Recommendations, &outcome)).await;
            summary.recommendations = outcome;
        }

        if !cancelled {
            summary.state = BatchState::Completed;
        }
        summary.completed_at = Some(chrono::Utc::now());

        emit(
            log.as_ref(),
            BatchEvent::new(
                batch_id,
                EventType::BatchCompleted,
                format!("Batch finished in {}ms", tracker.elapsed_ms()),
                ItemStatus::Completed,
            )
            .with_duration(tracker.elapsed_ms()),
        )
        .await;

        info!(
            %batch_id,
            processed = summary.processed,
            failed = summary.failed,
            not_dispatched = summary.not_dispatched,
            elapsed_ms = tracker.elapsed_ms(),
            "Batch completed"
        );

        Ok(summary)
    }

    async fn open_log(&self, batch_id: Uuid) -> Option<BatchLog> {
        let dir = self.batches_dir.as_deref()?;
        match BatchLog::open(dir, batch_id).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(%batch_id, error = %e, "Batch log unavailable, continuing without it");
                None
            }
        }
    }
}

/// Successful ids in request order
fn processed_ids(summary: &BatchSummary) -> Vec<String> {
    summary
        .results
        .iter()
        .filter(|r| r.outcome.is_success())
        .map(|r| r.document_id.clone())
        .collect()
}

fn stage_outcome(result: Result<Vec<String>, EngineError>) -> StageOutcome {
    match result {
        Ok(record_ids) => StageOutcome::Completed { record_ids },
        Err(EngineError::InsufficientData(reason)) => StageOutcome::Skipped { reason },
        Err(e) => StageOutcome::Failed {
            kind: e.kind(),
            message: e.to_string(),
        },
    }
}

fn item_event(batch_id: Uuid, report: &ItemReport) -> BatchEvent {
    let event = match &report.outcome {
        ItemOutcome::Succeeded {
            analysis_id,
            label,
            confidence,
        } => BatchEvent::new(
            batch_id,
            EventType::ItemCompleted,
            format!("Document {} classified as {}", report.document_id, label),
            ItemStatus::Completed,
        )
        .with_records(vec![analysis_id.clone()])
        .with_classification(*label, *confidence),
        ItemOutcome::Failed { kind, message } => BatchEvent::new(
            batch_id,
            EventType::ItemFailed,
            format!("Document {} failed", report.document_id),
            ItemStatus::Failed,
        )
        .with_error(*kind, message.clone()),
        ItemOutcome::NotDispatched | ItemOutcome::Pending => BatchEvent::new(
            batch_id,
            EventType::ItemNotDispatched,
            "Not dispatched".to_string(),
            ItemStatus::Skipped,
        ),
    };
    event
        .for_document(report.document_id.clone())
        .with_duration(report.duration_ms)
}

fn stage_event(batch_id: Uuid, stage: Stage, outcome: &StageOutcome) -> BatchEvent {
    let event = match outcome {
        StageOutcome::Completed { record_ids } => BatchEvent::new(
            batch_id,
            EventType::StageCompleted,
            format!("{} records written", record_ids.len()),
            ItemStatus::Completed,
        )
        .with_records(record_ids.clone()),
        StageOutcome::Skipped { reason } => {
            BatchEvent::new(batch_id, EventType::StageSkipped, reason.clone(), ItemStatus::Skipped)
        }
        StageOutcome::Failed { kind, message } => BatchEvent::new(
            batch_id,
            EventType::StageFailed,
            "Stage failed".to_string(),
            ItemStatus::Failed,
        )
        .with_error(*kind, message.clone()),
        StageOutcome::NotRequested => BatchEvent::new(
            batch_id,
            EventType::StageSkipped,
            "not requested".to_string(),
            ItemStatus::Skipped,
        ),
    };
    event.for_stage(stage)
}

/// Append to the batch log when there is one; failures only warn
async fn emit(log: Option<&BatchLog>, event: BatchEvent) {
    let Some(log) = log else {
        return;
    };
    if let Err(e) = log.append(&event).await {
        warn!(batch_id = %log.batch_id(), error = %e, "Failed to append batch event");
    }
}
