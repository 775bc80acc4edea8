//! Jurisdictional boundary records and boundary categories.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{Jurisdiction, UnknownVariant};

/// Overlapping or conflicting claims between jurisdictions over one subject
///
/// `conflicts` is never empty for records produced by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionalBoundary {
    pub id: String,
    pub jurisdiction: Jurisdiction,
    pub boundary_type: BoundaryType,
    pub description: String,
    /// Ordered document references
    pub legal_basis: Vec<String>,
    pub conflicts: Vec<BoundaryConflict>,
    pub confidence_score: f64,
    pub date_analyzed: DateTime<Utc>,
}

impl JurisdictionalBoundary {
    pub fn new(
        jurisdiction: Jurisdiction,
        boundary_type: BoundaryType,
        description: String,
        legal_basis: Vec<String>,
        conflicts: Vec<BoundaryConflict>,
        confidence_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            jurisdiction,
            boundary_type,
            description,
            legal_basis,
            conflicts,
            confidence_score: super::analysis::clamp_unit(confidence_score),
            date_analyzed: Utc::now(),
        }
    }

    /// Every jurisdiction named by this boundary's conflicts, in order
    pub fn jurisdictions(&self) -> Vec<Jurisdiction> {
        let mut out = vec![self.jurisdiction];
        for conflict in &self.conflicts {
            if !out.contains(&conflict.jurisdiction) {
                out.push(conflict.jurisdiction);
            }
        }
        out
    }
}

/// One side of a conflicting claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryConflict {
    pub jurisdiction: Jurisdiction,
    pub document_id: String,
    pub conflict_description: String,
}

/// Subject-matter category of a boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    Territorial,
    Resource,
    Activity,
    Liability,
    Other,
}

impl BoundaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Territorial => "territorial",
            Self::Resource => "resource",
            Self::Activity => "activity",
            Self::Liability => "liability",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for BoundaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "territorial" => Ok(Self::Territorial),
            "resource" => Ok(Self::Resource),
            "activity" => Ok(Self::Activity),
            "liability" => Ok(Self::Liability),
            "other" => Ok(Self::Other),
            other => Err(UnknownVariant::new("boundary_type", other)),
        }
    }
}
