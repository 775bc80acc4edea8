//! The Legal Analysis Engine.
//!
//! This module contains:
//! - Lexicon: rulesets compiled into matchers
//! - Features, Classifier: per-document extraction and classification
//! - Boundary, Recommend: corpus-level conflict and principle analysis
//! - Engine: the contract operations bound to a store
//! - Orchestrator, BatchLog: batches over the engine and their logs

pub mod boundary;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod event_store;
pub mod features;
pub mod lexicon;
pub mod limits;
pub mod orchestrator;
pub mod recommend;

// Re-export commonly used types
pub use boundary::{BoundaryAnalyzer, BoundarySettings, ClassifiedDocument};
pub use classifier::{ClassificationReport, Classifier, ClassifierSettings};
pub use engine::Engine;
pub use error::{EngineError, ErrorKind};
pub use event_store::BatchLog;
pub use features::{ExtractionError, ExtractionSettings, FeatureExtractor, FeatureRecord};
pub use lexicon::{Lexicon, Ruleset};
pub use limits::{BatchTracker, EngineLimits, LimitViolation};
pub use orchestrator::{BatchError, BatchRequest, CancelHandle, Orchestrator};
pub use recommend::{CorpusSnapshot, RecommendationGenerator, RecommendationSettings};
