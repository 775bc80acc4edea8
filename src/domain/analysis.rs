//! Legal analysis records.
//!
//! An analysis is immutable once written: re-analysing a document creates a
//! new record rather than updating an old one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::UnknownVariant;

/// Result of one analysis pass over one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalAnalysis {
    pub id: String,

    /// Document this analysis concerns (cascade-deleted with it)
    pub document_id: String,

    pub analysis_type: AnalysisType,

    /// Structured results: label, rationale, feature scores
    pub results: serde_json::Value,

    /// Always within [0.0, 1.0]
    pub confidence_score: f64,

    /// Tag identifying the heuristic and ruleset version
    pub methodology: String,

    pub analyst_notes: Option<String>,

    pub date_analyzed: DateTime<Utc>,
}

impl LegalAnalysis {
    /// Create a fresh analysis record; the confidence is clamped to [0, 1]
    pub fn new(
        document_id: impl Into<String>,
        analysis_type: AnalysisType,
        results: serde_json::Value,
        confidence_score: f64,
        methodology: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            analysis_type,
            results,
            confidence_score: clamp_unit(confidence_score),
            methodology: methodology.into(),
            analyst_notes: None,
            date_analyzed: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.analyst_notes = Some(notes.into());
        self
    }
}

/// Kind of analysis recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    CustomaryVsTreaty,
    Jurisdictional,
    Other,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomaryVsTreaty => "customary_vs_treaty",
            Self::Jurisdictional => "jurisdictional",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customary_vs_treaty" => Ok(Self::CustomaryVsTreaty),
            // older records used the longer name
            "jurisdictional" | "jurisdictional_analysis" => Ok(Self::Jurisdictional),
            "other" => Ok(Self::Other),
            other => Err(UnknownVariant::new("analysis_type", other)),
        }
    }
}

/// Outcome of customary-vs-treaty classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLabel {
    Customary,
    Treaty,
    Mixed,
    Indeterminate,
}

impl ClassificationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customary => "customary",
            Self::Treaty => "treaty",
            Self::Mixed => "mixed",
            Self::Indeterminate => "indeterminate",
        }
    }

    /// Customary or treaty, i.e. the document claims a definite source of law
    pub fn is_definite(&self) -> bool {
        matches!(self, Self::Customary | Self::Treaty)
    }
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
