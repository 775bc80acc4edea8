//! In-memory store for tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentFilter, Page, PersistenceError, Store};
use crate::domain::{
    AnalysisType, Document, DocumentUpdate, JurisdictionalBoundary, JusCogensRecommendation,
    LegalAnalysis, SpaceEvent,
};

#[derive(Debug, Default)]
struct Tables {
    documents: BTreeMap<String, Document>,
    events: Vec<SpaceEvent>,
    /// Write order
    analyses: Vec<LegalAnalysis>,
    boundaries: Vec<JurisdictionalBoundary>,
    recommendations: Vec<JusCogensRecommendation>,
}

/// [`Store`] kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paged<T: Clone>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items.skip(page.offset).take(page.limit).collect()
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_document(&self, document: &Document) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.documents.contains_key(&document.id) {
            return Err(PersistenceError::Conflict(format!(
                "document {} already exists",
                document.id
            )));
        }
        tables.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, PersistenceError> {
        Ok(self.tables.read().await.documents.get(id).cloned())
    }

    async fn update_document(&self, update: &DocumentUpdate) -> Result<bool, PersistenceError> {
        let mut tables = self.tables.write().await;
        let Some(document) = tables.documents.get_mut(&update.document_id) else {
            return Ok(false);
        };
        document.status = update.status;
        if let Some(law_type) = update.law_type {
            document.law_type = law_type;
        }
        if let Some(summary) = &update.summary {
            document.summary = Some(summary.clone());
        }
        Ok(true)
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> Result<Vec<Document>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(paged(
            tables.documents.values().filter(|d| filter.matches(d)).cloned(),
            page,
        ))
    }

    async fn delete_document(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.documents.remove(id).is_none() {
            return Ok(false);
        }
        tables.analyses.retain(|a| a.document_id != id);
        Ok(true)
    }

    async fn insert_event(&self, event: &SpaceEvent) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.events.iter().any(|e| e.id == event.id) {
            return Err(PersistenceError::Conflict(format!("event {} already exists", event.id)));
        }
        tables.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, page: Page) -> Result<Vec<SpaceEvent>, PersistenceError> {
        let tables = self.tables.read().await;
        let mut events = tables.events.clone();
        events.sort_by(|a, b| a.date_occurred.cmp(&b.date_occurred).then_with(|| a.id.cmp(&b.id)));
        Ok(paged(events.into_iter(), page))
    }

    async fn insert_analysis(&self, analysis: &LegalAnalysis) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&analysis.document_id) {
            return Err(PersistenceError::Conflict(format!(
                "analysis {} references missing document {}",
                analysis.id, analysis.document_id
            )));
        }
        if tables.analyses.iter().any(|a| a.id == analysis.id) {
            return Err(PersistenceError::Conflict(format!(
                "analysis {} already exists",
                analysis.id
            )));
        }
        tables.analyses.push(analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<LegalAnalysis>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(tables.analyses.iter().find(|a| a.id == id).cloned())
    }

    async fn list_analyses(
        &self,
        document_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<LegalAnalysis>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(paged(
            tables
                .analyses
                .iter()
                .filter(|a| document_id.map_or(true, |id| a.document_id == id))
                .cloned(),
            page,
        ))
    }

    async fn latest_analysis(
        &self,
        document_id: &str,
        analysis_type: AnalysisType,
        methodology: Option<&str>,
    ) -> Result<Option<LegalAnalysis>, PersistenceError> {
        let tables = self.tables.read().await;
        // later writes win ties on timestamp
        Ok(tables
            .analyses
            .iter()
            .filter(|a| {
                a.document_id == document_id
                    && a.analysis_type == analysis_type
                    && methodology.map_or(true, |m| a.methodology == m)
            })
            .fold(None, |latest: Option<&LegalAnalysis>, a| match latest {
                Some(l) if l.date_analyzed > a.date_analyzed => Some(l),
                _ => Some(a),
            })
            .cloned())
    }

    async fn insert_boundary(&self, boundary: &JurisdictionalBoundary) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.boundaries.iter().any(|b| b.id == boundary.id) {
            return Err(PersistenceError::Conflict(format!(
                "boundary {} already exists",
                boundary.id
            )));
        }
        tables.boundaries.push(boundary.clone());
        Ok(())
    }

    async fn get_boundary(&self, id: &str) -> Result<Option<JurisdictionalBoundary>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(tables.boundaries.iter().find(|b| b.id == id).cloned())
    }

    async fn list_boundaries(&self, page: Page) -> Result<Vec<JurisdictionalBoundary>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(paged(tables.boundaries.iter().cloned(), page))
    }

    async fn insert_recommendation(
        &self,
        recommendation: &JusCogensRecommendation,
    ) -> Result<(), PersistenceError> {
        let mut tables = self.tables.write().await;
        if tables.recommendations.iter().any(|r| r.id == recommendation.id) {
            return Err(PersistenceError::Conflict(format!(
                "recommendation {} already exists",
                recommendation.id
            )));
        }
        tables.recommendations.push(recommendation.clone());
        Ok(())
    }

    async fn get_recommendation(
        &self,
        id: &str,
    ) -> Result<Option<JusCogensRecommendation>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(tables.recommendations.iter().find(|r| r.id == id).cloned())
    }

    async fn list_recommendations(
        &self,
        page: Page,
    ) -> Result<Vec<JusCogensRecommendation>, PersistenceError> {
        let tables = self.tables.read().await;
        Ok(paged(tables.recommendations.iter().cloned(), page))
    }
}
