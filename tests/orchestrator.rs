//! Orchestrator Integration Tests
//!
//! Batches over the engine: failure isolation, write timeouts,
//! cancellation, post-barrier stages and the batch log.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{document, engine_with, seeded, settings, SlowStore, CUSTOMARY_TEXT, TREATY_TEXT};
use spacelaw::core::{BatchError, BatchLog, BatchRequest, CancelHandle, ErrorKind, Lexicon, Orchestrator};
use spacelaw::domain::{
    AnalysisType, BatchState, ClassificationLabel, DocumentStatus, ItemOutcome, Jurisdiction, LawType,
    StageOutcome,
};
use spacelaw::store::{Page, Store};
use spacelaw::Engine;
use tempfile::TempDir;

fn ten_documents() -> Vec<spacelaw::Document> {
    (1..=10)
        .map(|i| {
            let content = if i == 5 {
                ""
            } else if i % 2 == 0 {
                TREATY_TEXT
            } else {
                CUSTOMARY_TEXT
            };
            document(&format!("doc-{}", i), Jurisdiction::International, LawType::Pending, content)
        })
        .collect()
}

fn ids(documents: &[spacelaw::Document]) -> Vec<String> {
    documents.iter().map(|d| d.id.clone()).collect()
}

#[tokio::test]
async fn test_empty_document_fails_alone() {
    let documents = ten_documents();
    let engine = engine_with(&documents, settings()).await;
    let orchestrator = Orchestrator::new(engine.clone());

    let summary = orchestrator.run(&BatchRequest::new(ids(&documents))).await.unwrap();

    assert_eq!(summary.processed, 9);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.not_dispatched, 0);
    assert_eq!(summary.state, BatchState::Completed);

    // results stay in request order
    let order: Vec<&str> = summary.results.iter().map(|r| r.document_id.as_str()).collect();
    assert_eq!(order, ids(&documents).iter().map(String::as_str).collect::<Vec<_>>());

    match &summary.results[4].outcome {
        ItemOutcome::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Extraction);
            assert!(message.contains("doc-5"));
        }
        other => panic!("expected doc-5 to fail, got {:?}", other),
    }
    assert!(matches!(
        summary.results[0].outcome,
        ItemOutcome::Succeeded {
            label: ClassificationLabel::Customary,
            ..
        }
    ));
    assert!(matches!(
        summary.results[1].outcome,
        ItemOutcome::Succeeded {
            label: ClassificationLabel::Treaty,
            ..
        }
    ));

    let failed = engine.store().get_document("doc-5").await.unwrap().unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    let analyses = engine.store().list_analyses(None, Page::all()).await.unwrap();
    assert_eq!(analyses.len(), 9);

    // stages not requested
    assert_eq!(summary.boundaries, StageOutcome::NotRequested);
    assert_eq!(summary.recommendations, StageOutcome::NotRequested);
}

#[tokio::test]
async fn test_rerun_produces_new_analyses() {
    let documents = ten_documents();
    let engine = engine_with(&documents, settings()).await;
    let orchestrator = Orchestrator::new(engine.clone());
    let request = BatchRequest::new(ids(&documents));

    orchestrator.run(&request).await.unwrap();
    orchestrator.run(&request).await.unwrap();

    let analyses = engine.store().list_analyses(Some("doc-1"), Page::all()).await.unwrap();
    assert_eq!(analyses.len(), 2);
    assert_ne!(analyses[0].id, analyses[1].id);
}

#[tokio::test]
async fn test_write_timeout_fails_item_and_batch_continues() {
    let documents = ten_documents();
    let store: Arc<dyn Store> = Arc::new(SlowStore::new(Duration::from_millis(500), &["doc-3"]));
    let store = seeded(store, &documents).await;

    let mut settings = settings();
    settings.limits.write_timeout_ms = 50;
    let engine = Engine::new(store, Lexicon::builtin().unwrap(), settings).unwrap();

    let summary = Orchestrator::new(engine)
        .run(&BatchRequest::new(ids(&documents)))
        .await
        .unwrap();

    assert_eq!(summary.processed, 8);
    assert_eq!(summary.failed, 2);
    assert!(matches!(
        summary.results[2].outcome,
        ItemOutcome::Failed {
            kind: ErrorKind::Persistence,
            ..
        }
    ));
}

#[tokio::test]
async fn test_timed_out_write_may_still_land() {
    let documents = ten_documents();
    let store: Arc<dyn Store> = Arc::new(SlowStore::detached(Duration::from_millis(100), &["doc-3"]));
    let store = seeded(store, &documents).await;

    let mut settings = settings();
    settings.limits.write_timeout_ms = 20;
    let engine = Engine::new(store, Lexicon::builtin().unwrap(), settings).unwrap();

    let summary = Orchestrator::new(engine.clone())
        .run(&BatchRequest::new(ids(&documents)))
        .await
        .unwrap();

    assert!(matches!(
        summary.results[2].outcome,
        ItemOutcome::Failed {
            kind: ErrorKind::Persistence,
            ..
        }
    ));
    let doc = engine.store().get_document("doc-3").await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);

    // the abandoned write commits later and is visible to readers
    tokio::time::sleep(Duration::from_millis(250)).await;
    let late = engine
        .store()
        .latest_analysis("doc-3", AnalysisType::CustomaryVsTreaty, Some(engine.methodology()))
        .await
        .unwrap();
    assert!(late.is_some());
    let doc = engine.store().get_document("doc-3").await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let documents = ten_documents();
    let engine = engine_with(&documents, settings()).await;
    let cancel = CancelHandle::new();
    cancel.cancel();

    let request = BatchRequest::new(ids(&documents)).with_boundaries().with_jus_cogens();
    let summary = Orchestrator::new(engine.clone())
        .run_with_cancel(&request, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.state, BatchState::Cancelled);
    assert_eq!(summary.not_dispatched, 10);
    assert_eq!(summary.processed + summary.failed, 0);
    assert!(matches!(summary.boundaries, StageOutcome::Skipped { .. }));
    assert!(matches!(summary.recommendations, StageOutcome::Skipped { .. }));
    assert!(engine.store().list_analyses(None, Page::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_batch_drains_dispatched_work() {
    let documents = ten_documents();
    let store: Arc<dyn Store> = Arc::new(SlowStore::new(Duration::from_millis(100), &["doc-1"]));
    let store = seeded(store, &documents).await;

    let mut settings = settings();
    settings.limits.max_concurrency = 1;
    let engine = Engine::new(store, Lexicon::builtin().unwrap(), settings).unwrap();

    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let summary = Orchestrator::new(engine)
        .run_with_cancel(&BatchRequest::new(ids(&documents)), &cancel)
        .await
        .unwrap();

    // doc-1 was in flight when the batch was cancelled and still completed
    assert!(summary.results[0].outcome.is_success());
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.not_dispatched, 9);
    assert_eq!(summary.state, BatchState::Cancelled);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected() {
    let documents = ten_documents();
    let mut settings = settings();
    settings.limits.max_batch_size = 3;
    let engine = engine_with(&documents, settings).await;

    let result = Orchestrator::new(engine.clone())
        .run(&BatchRequest::new(ids(&documents)))
        .await;

    assert!(matches!(result, Err(BatchError::Rejected(_))));
    assert!(engine.store().list_analyses(None, Page::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_content_fails_with_limit_kind() {
    let big = document("big", Jurisdiction::Us, LawType::Treaty, &TREATY_TEXT.repeat(10));
    let small = document("small", Jurisdiction::Us, LawType::Treaty, TREATY_TEXT);
    let mut settings = settings();
    settings.limits.max_content_bytes = 500;
    let engine = engine_with(&[big, small], settings).await;

    let summary = Orchestrator::new(engine)
        .run(&BatchRequest::new(["big", "small"]))
        .await
        .unwrap();

    assert!(matches!(
        summary.results[0].outcome,
        ItemOutcome::Failed {
            kind: ErrorKind::LimitExceeded,
            ..
        }
    ));
    assert!(summary.results[1].outcome.is_success());
}

#[tokio::test]
async fn test_missing_document_is_reported_not_found() {
    let engine = engine_with(&[], settings()).await;
    let summary = Orchestrator::new(engine)
        .run(&BatchRequest::new(["ghost"]))
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert!(matches!(
        summary.results[0].outcome,
        ItemOutcome::Failed {
            kind: ErrorKind::NotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn test_boundary_stage_runs_after_barrier() {
    let us = document("us-1", Jurisdiction::Us, LawType::Treaty, TREATY_TEXT)
        .with_keywords(["liability", "orbital debris"]);
    let ru = document("ru-1", Jurisdiction::Russia, LawType::Customary, CUSTOMARY_TEXT)
        .with_keywords(["liability", "orbital-debris"]);
    let engine = engine_with(&[us, ru], settings()).await;

    let request = BatchRequest::new(["us-1", "ru-1"]).with_boundaries();
    let summary = Orchestrator::new(engine.clone()).run(&request).await.unwrap();

    assert_eq!(summary.processed, 2);
    let StageOutcome::Completed { record_ids } = &summary.boundaries else {
        panic!("expected boundaries to complete, got {:?}", summary.boundaries);
    };
    assert_eq!(record_ids.len(), 1);

    let boundary = engine.store().get_boundary(&record_ids[0]).await.unwrap().unwrap();
    assert_eq!(boundary.conflicts.len(), 2);
}

#[tokio::test]
async fn test_boundary_stage_skips_single_jurisdiction() {
    let documents = ten_documents();
    let engine = engine_with(&documents, settings()).await;

    let request = BatchRequest::new(ids(&documents)).with_boundaries().with_jus_cogens();
    let summary = Orchestrator::new(engine).run(&request).await.unwrap();

    assert!(matches!(summary.boundaries, StageOutcome::Skipped { .. }));
    assert_eq!(
        summary.recommendations,
        StageOutcome::Completed { record_ids: vec![] }
    );
}

#[tokio::test]
async fn test_batch_log_replays_to_summary() {
    let temp = TempDir::new().unwrap();
    let documents = ten_documents();
    let engine = engine_with(&documents, settings()).await;
    let orchestrator = Orchestrator::new(engine).with_batch_log(temp.path());

    let request = BatchRequest::new(ids(&documents)).with_boundaries();
    let summary = orchestrator.run(&request).await.unwrap();

    let log = BatchLog::open(temp.path(), summary.batch_id).await.unwrap();
    let replayed = log.summary().await.unwrap().unwrap();

    assert_eq!(replayed.batch_id, summary.batch_id);
    assert_eq!(replayed.state, BatchState::Completed);
    assert_eq!(replayed.processed, summary.processed);
    assert_eq!(replayed.failed, summary.failed);
    assert_eq!(replayed.results, summary.results);
    assert_eq!(replayed.boundaries, summary.boundaries);

    assert_eq!(BatchLog::list_batches(temp.path()).await.unwrap(), vec![summary.batch_id]);
}
