//! spacelaw - Legal analysis engine for international space law
//!
//! Classifies collected space-law documents as customary or treaty law,
//! detects conflicting jurisdictional claims between them, and proposes
//! jus cogens principles with confidence scores.
//!
//! # Architecture
//!
//! - Every score is derived from a ruleset (YAML) compiled into a `Lexicon`
//! - Extraction and classification are pure and run per document
//! - Boundary and recommendation analysis run on a corpus snapshot after
//!   a batch's barrier
//! - Results are persisted through the `Store` trait (SQLite or memory)
//!
//! # Modules
//!
//! - `core`: the engine (lexicon, features, classifier, boundaries,
//!   recommendations, orchestrator, batch log)
//! - `domain`: persisted records and batch events
//! - `store`: persistence
//! - `config`: configuration and canonical paths
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! spacelaw init
//! spacelaw import documents.jsonl
//! spacelaw analyze <id>... --jurisdictional --jus-cogens
//! spacelaw status <batch-id>
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{BatchRequest, CancelHandle, Engine, EngineError, Orchestrator};
pub use domain::{
    AnalysisType, BatchSummary, Document, Jurisdiction, JurisdictionalBoundary,
    JusCogensRecommendation, LegalAnalysis,
};
pub use store::{MemoryStore, SqliteStore, Store};
