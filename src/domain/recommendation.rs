//! Jus cogens recommendation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate peremptory norm with its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JusCogensRecommendation {
    pub id: String,

    /// Short statement of the principle
    pub principle: String,

    pub description: String,

    /// Document references (source URLs of the supporting documents)
    pub legal_basis: Vec<String>,

    /// Ids of the customary documents contributing the principle
    pub supporting_documents: Vec<String>,

    /// Dissent recorded against the principle
    pub opposition_arguments: Vec<String>,

    /// Weighted support against opposition, within [0.0, 1.0]
    pub recommendation_strength: f64,

    pub implementation_guidance: String,

    pub date_generated: DateTime<Utc>,
}

impl JusCogensRecommendation {
    pub fn new(principle: String, description: String, recommendation_strength: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            principle,
            description,
            legal_basis: Vec::new(),
            supporting_documents: Vec::new(),
            opposition_arguments: Vec::new(),
            recommendation_strength: super::analysis::clamp_unit(recommendation_strength),
            implementation_guidance: String::new(),
            date_generated: Utc::now(),
        }
    }
}
