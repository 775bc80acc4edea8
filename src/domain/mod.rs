//! Domain types for the space-law analysis engine.
//!
//! This module contains the persisted records and batch bookkeeping:
//! - Document, SpaceEvent: inputs supplied by ingestion
//! - LegalAnalysis, JurisdictionalBoundary, JusCogensRecommendation: engine output
//! - BatchEvent, BatchSummary: orchestrator log and report

pub mod analysis;
pub mod batch;
pub mod boundary;
pub mod document;
pub mod events;
pub mod recommendation;

// Re-export commonly used types
pub use analysis::{clamp_unit, AnalysisType, ClassificationLabel, LegalAnalysis};
pub use batch::{BatchState, BatchSummary, ItemOutcome, ItemResult, StageOutcome};
pub use boundary::{BoundaryConflict, BoundaryType, JurisdictionalBoundary};
pub use document::{
    Document, DocumentStatus, DocumentUpdate, Jurisdiction, LawType, Metadata, SpaceEvent,
    UnknownVariant,
};
pub use events::{BatchEvent, EventType, ItemStatus, Stage};
pub use recommendation::JusCogensRecommendation;
