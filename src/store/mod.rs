//! Persistence for documents and analysis records.
//!
//! The engine only needs atomic single-record writes and cascade delete from
//! documents to their analyses. [`SqliteStore`] is the durable backend;
//! [`MemoryStore`] serves tests and dry runs.

pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    AnalysisType, Document, DocumentStatus, DocumentUpdate, Jurisdiction, JurisdictionalBoundary,
    JusCogensRecommendation, LawType, LegalAnalysis, SpaceEvent,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a store
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// A stored row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Duplicate id or dangling reference
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Offset paging for list operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Everything, for snapshot reads
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }
}

/// Optional filters for listing documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub jurisdiction: Option<Jurisdiction>,
    pub law_type: Option<LawType>,
    pub status: Option<DocumentStatus>,
}

impl DocumentFilter {
    pub fn matches(&self, document: &Document) -> bool {
        self.jurisdiction.map_or(true, |j| document.jurisdiction == j)
            && self.law_type.map_or(true, |l| document.law_type == l)
            && self.status.map_or(true, |s| document.status == s)
    }
}

/// Record store used by the engine
///
/// Every write is atomic for a single record: it lands complete or not at all.
#[async_trait]
pub trait Store: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    async fn insert_document(&self, document: &Document) -> Result<(), PersistenceError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, PersistenceError>;

    /// Apply an engine update; `false` if the document does not exist
    async fn update_document(&self, update: &DocumentUpdate) -> Result<bool, PersistenceError>;

    /// Documents ordered by id
    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> Result<Vec<Document>, PersistenceError>;

    /// Delete a document and, by cascade, its analyses
    async fn delete_document(&self, id: &str) -> Result<bool, PersistenceError>;

    async fn insert_event(&self, event: &SpaceEvent) -> Result<(), PersistenceError>;

    /// Events ordered by date occurred
    async fn list_events(&self, page: Page) -> Result<Vec<SpaceEvent>, PersistenceError>;

    async fn insert_analysis(&self, analysis: &LegalAnalysis) -> Result<(), PersistenceError>;

    async fn get_analysis(&self, id: &str) -> Result<Option<LegalAnalysis>, PersistenceError>;

    /// Analyses in write order, optionally for one document
    async fn list_analyses(
        &self,
        document_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<LegalAnalysis>, PersistenceError>;

    /// Most recent analysis of a type for a document
    async fn latest_analysis(
        &self,
        document_id: &str,
        analysis_type: AnalysisType,
        methodology: Option<&str>,
    ) -> Result<Option<LegalAnalysis>, PersistenceError>;

    async fn insert_boundary(&self, boundary: &JurisdictionalBoundary) -> Result<(), PersistenceError>;

    async fn get_boundary(&self, id: &str) -> Result<Option<JurisdictionalBoundary>, PersistenceError>;

    /// Boundaries in write order
    async fn list_boundaries(&self, page: Page) -> Result<Vec<JurisdictionalBoundary>, PersistenceError>;

    async fn insert_recommendation(
        &self,
        recommendation: &JusCogensRecommendation,
    ) -> Result<(), PersistenceError>;

    async fn get_recommendation(
        &self,
        id: &str,
    ) -> Result<Option<JusCogensRecommendation>, PersistenceError>;

    /// Recommendations in write order
    async fn list_recommendations(
        &self,
        page: Page,
    ) -> Result<Vec<JusCogensRecommendation>, PersistenceError>;
}
