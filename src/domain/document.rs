//! Source documents and space events supplied by the ingestion service.
//!
//! The engine only reads these records. The one exception is the small set
//! of fields refined after analysis (status, law type, summary), which the
//! engine writes back through [`DocumentUpdate`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open key-value metadata attached to documents and events
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A collected space-law document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (opaque)
    pub id: String,

    pub title: String,

    /// Raw text as collected
    pub content: String,

    pub source_url: String,

    pub law_type: LawType,

    pub jurisdiction: Jurisdiction,

    #[serde(default)]
    pub date_published: Option<DateTime<Utc>>,

    /// When the ingestion service collected the document
    #[serde(default = "Utc::now")]
    pub date_collected: DateTime<Utc>,

    #[serde(default)]
    pub keywords: BTreeSet<String>,

    /// Derived summary (filled by the engine when absent)
    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub status: DocumentStatus,

    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a pending document with a fresh id
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        source_url: impl Into<String>,
        law_type: LawType,
        jurisdiction: Jurisdiction,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            source_url: source_url.into(),
            law_type,
            jurisdiction,
            date_published: None,
            date_collected: Utc::now(),
            keywords: BTreeSet::new(),
            summary: None,
            status: DocumentStatus::Pending,
            metadata: Metadata::new(),
        }
    }

    /// Replace the keyword set
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Fields the engine may change on a document after analysis
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    pub document_id: String,
    pub status: DocumentStatus,
    /// New law type, if refined
    pub law_type: Option<LawType>,
    /// New summary, if derived
    pub summary: Option<String>,
}

impl DocumentUpdate {
    /// Status-only update
    pub fn status(document_id: impl Into<String>, status: DocumentStatus) -> Self {
        Self {
            document_id: document_id.into(),
            status,
            law_type: None,
            summary: None,
        }
    }
}

/// Kind of legal instrument a document represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LawType {
    Treaty,
    Customary,
    Domestic,
    Regulatory,
    CaseLaw,
    /// Not yet determined by ingestion
    Pending,
}

impl LawType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Treaty => "treaty",
            Self::Customary => "customary",
            Self::Domestic => "domestic",
            Self::Regulatory => "regulatory",
            Self::CaseLaw => "case_law",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for LawType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LawType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "treaty" => Ok(Self::Treaty),
            "customary" => Ok(Self::Customary),
            "domestic" => Ok(Self::Domestic),
            "regulatory" => Ok(Self::Regulatory),
            "case_law" => Ok(Self::CaseLaw),
            "pending" => Ok(Self::Pending),
            other => Err(UnknownVariant::new("law_type", other)),
        }
    }
}

/// Legal order a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jurisdiction {
    Un,
    Us,
    Eu,
    Russia,
    China,
    International,
    Other,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 7] = [
        Self::Un,
        Self::Us,
        Self::Eu,
        Self::Russia,
        Self::China,
        Self::International,
        Self::Other,
    ];

    /// Stable storage name; jurisdiction pairs are ordered by this value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Un => "un",
            Self::Us => "us",
            Self::Eu => "eu",
            Self::Russia => "russia",
            Self::China => "china",
            Self::International => "international",
            Self::Other => "other",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Un => "UN",
            Self::Us => "US",
            Self::Eu => "EU",
            Self::Russia => "Russia",
            Self::China => "China",
            Self::International => "International",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Jurisdiction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|j| j.as_str() == lowered)
            .ok_or_else(|| UnknownVariant::new("jurisdiction", s))
    }
}

/// Processing status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processed,
    Failed,
}

impl Default for DocumentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("status", other)),
        }
    }
}

/// A space event (launch, incident, treaty signature, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Free-form tag such as `launch` or `treaty_signature`
    pub event_type: String,
    pub date_occurred: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub legal_implications: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A stored string did not name any known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} value: {value:?}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jurisdiction_parsing_is_case_insensitive() {
        assert_eq!("US".parse::<Jurisdiction>().unwrap(), Jurisdiction::Us);
        assert_eq!(" russia ".parse::<Jurisdiction>().unwrap(), Jurisdiction::Russia);
        assert!("mars".parse::<Jurisdiction>().is_err());
    }

    #[test]
    fn test_document_deserializes_with_defaults() {
        let json = r#"{
            "id": "doc-1",
            "title": "Outer Space Treaty",
            "content": "States Parties to the Treaty...",
            "source_url": "https://example.org/ost",
            "law_type": "treaty",
            "jurisdiction": "international"
        }"#;

        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.keywords.is_empty());
        assert_eq!(doc.law_type, LawType::Treaty);
    }

    #[test]
    fn test_law_type_round_trips_through_str() {
        for law_type in [
            LawType::Treaty,
            LawType::Customary,
            LawType::Domestic,
            LawType::Regulatory,
            LawType::CaseLaw,
            LawType::Pending,
        ] {
            assert_eq!(law_type.as_str().parse::<LawType>().unwrap(), law_type);
        }
    }
}
