//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use spacelaw::config::EngineSettings;
use spacelaw::core::Lexicon;
use spacelaw::domain::{
    AnalysisType, Document, DocumentUpdate, Jurisdiction, JurisdictionalBoundary,
    JusCogensRecommendation, LawType, LegalAnalysis, SpaceEvent,
};
use spacelaw::store::{DocumentFilter, MemoryStore, Page, PersistenceError, Store};
use spacelaw::Engine;

pub const CUSTOMARY_TEXT: &str = "Consistent state practice and opinio juris establish this \
    rule of customary international law. General practice accepted as law confirms it.";

pub const TREATY_TEXT: &str = "The States Parties to this Treaty agree to the following \
    provisions. This Convention entered into force upon ratification by five parties.";

pub fn document(id: &str, jurisdiction: Jurisdiction, law_type: LawType, content: &str) -> Document {
    Document::new(
        format!("Document {}", id),
        content,
        format!("https://example.org/{}", id),
        law_type,
        jurisdiction,
    )
    .with_id(id)
}

pub fn settings() -> EngineSettings {
    EngineSettings::default()
}

pub async fn seeded(store: Arc<dyn Store>, documents: &[Document]) -> Arc<dyn Store> {
    for document in documents {
        store.insert_document(document).await.unwrap();
    }
    store
}

pub async fn engine_with(documents: &[Document], settings: EngineSettings) -> Engine {
    let store = seeded(Arc::new(MemoryStore::new()), documents).await;
    Engine::new(store, Lexicon::builtin().unwrap(), settings).unwrap()
}

/// Delegates to a [`MemoryStore`], sleeping before selected writes
pub struct SlowStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
    /// Documents whose analysis write is delayed
    slow_documents: Vec<String>,
    /// Delayed writes run on their own task and commit even when the caller
    /// stops waiting, like a blocking database write
    detached: bool,
}

impl SlowStore {
    pub fn new(delay: Duration, slow_documents: &[&str]) -> Self {
        Self {
            inner: Arc::new(MemoryStore::new()),
            delay,
            slow_documents: slow_documents.iter().map(|s| s.to_string()).collect(),
            detached: false,
        }
    }

    pub fn detached(delay: Duration, slow_documents: &[&str]) -> Self {
        Self {
            detached: true,
            ..Self::new(delay, slow_documents)
        }
    }
}

#[async_trait]
impl Store for SlowStore {
    fn name(&self) -> &str {
        "slow"
    }

    async fn insert_document(&self, document: &Document) -> Result<(), PersistenceError> {
        self.inner.insert_document(document).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, PersistenceError> {
        self.inner.get_document(id).await
    }

    async fn update_document(&self, update: &DocumentUpdate) -> Result<bool, PersistenceError> {
        self.inner.update_document(update).await
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> Result<Vec<Document>, PersistenceError> {
        self.inner.list_documents(filter, page).await
    }

    async fn delete_document(&self, id: &str) -> Result<bool, PersistenceError> {
        self.inner.delete_document(id).await
    }

    async fn insert_event(&self, event: &SpaceEvent) -> Result<(), PersistenceError> {
        self.inner.insert_event(event).await
    }

    async fn list_events(&self, page: Page) -> Result<Vec<SpaceEvent>, PersistenceError> {
        self.inner.list_events(page).await
    }

    async fn insert_analysis(&self, analysis: &LegalAnalysis) -> Result<(), PersistenceError> {
        if !self.slow_documents.contains(&analysis.document_id) {
            return self.inner.insert_analysis(analysis).await;
        }

        if self.detached {
            let inner = self.inner.clone();
            let delay = self.delay;
            let analysis = analysis.clone();
            return tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.insert_analysis(&analysis).await
            })
            .await
            .unwrap();
        }

        tokio::time::sleep(self.delay).await;
        self.inner.insert_analysis(analysis).await
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<LegalAnalysis>, PersistenceError> {
        self.inner.get_analysis(id).await
    }

    async fn list_analyses(
        &self,
        document_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<LegalAnalysis>, PersistenceError> {
        self.inner.list_analyses(document_id, page).await
    }

    async fn latest_analysis(
        &self,
        document_id: &str,
        analysis_type: AnalysisType,
        methodology: Option<&str>,
    ) -> Result<Option<LegalAnalysis>, PersistenceError> {
        self.inner
            .latest_analysis(document_id, analysis_type, methodology)
            .await
    }

    async fn insert_boundary(&self, boundary: &JurisdictionalBoundary) -> Result<(), PersistenceError> {
        self.inner.insert_boundary(boundary).await
    }

    async fn get_boundary(&self, id: &str) -> Result<Option<JurisdictionalBoundary>, PersistenceError> {
        self.inner.get_boundary(id).await
    }

    async fn list_boundaries(&self, page: Page) -> Result<Vec<JurisdictionalBoundary>, PersistenceError> {
        self.inner.list_boundaries(page).await
    }

    async fn insert_recommendation(
        &self,
        recommendation: &JusCogensRecommendation,
    ) -> Result<(), PersistenceError> {
        self.inner.insert_recommendation(recommendation).await
    }

    async fn get_recommendation(
        &self,
        id: &str,
    ) -> Result<Option<JusCogensRecommendation>, PersistenceError> {
        self.inner.get_recommendation(id).await
    }

    async fn list_recommendations(
        &self,
        page: Page,
    ) -> Result<Vec<JusCogensRecommendation>, PersistenceError> {
        self.inner.list_recommendations(page).await
    }
}
