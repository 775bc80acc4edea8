//! Error kinds surfaced by the engine.
//!
//! Component errors live next to their components ([`ExtractionError`],
//! [`PersistenceError`], [`ConfigurationError`], [`LimitViolation`]);
//! [`EngineError`] is what the contract operations return, always naming the
//! record it concerns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::store::PersistenceError;

use super::features::ExtractionError;
use super::limits::LimitViolation;

/// Errors returned by the engine's operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document {document_id}: {source}")]
    Extraction {
        document_id: String,
        #[source]
        source: ExtractionError,
    },

    /// Too few documents or jurisdictions; callers turn this into an empty result
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("document {document_id}: {source}")]
    Limit {
        document_id: String,
        #[source]
        source: LimitViolation,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Serialisable kind, used in batch summaries and logs
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::InsufficientData(_) => ErrorKind::InsufficientData,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::DocumentNotFound(_) => ErrorKind::NotFound,
            Self::Limit { .. } => ErrorKind::LimitExceeded,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Kind of failure attached to a document, boundary, or recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    InsufficientData,
    Persistence,
    Configuration,
    NotFound,
    LimitExceeded,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::InsufficientData => "insufficient_data",
            Self::Persistence => "persistence",
            Self::Configuration => "configuration",
            Self::NotFound => "not_found",
            Self::LimitExceeded => "limit_exceeded",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
