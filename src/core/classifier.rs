//! Customary-vs-treaty classification.
//!
//! Scores are weighted marker sums divided by the document's normalised
//! length. Label rules, in order:
//!
//! 1. identical non-zero scores: `mixed`, confidence 1.0
//! 2. both scores below `min_signal`: `indeterminate`, confidence 0.0
//! 3. scores closer than `closeness`: `mixed`, confidence min/max
//! 4. otherwise the larger score wins, confidence (max-min)/(max+min)
//!
//! The classifier holds no state between calls.

use serde::{Deserialize, Serialize};

use super::features::FeatureRecord;
use crate::domain::{clamp_unit, ClassificationLabel};

/// Thresholds and weights for the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Scores below this carry no signal (default: 0.1)
    #[serde(default = "default_min_signal")]
    pub min_signal: f64,

    /// Score gap below which a document is mixed (default: 0.15)
    #[serde(default = "default_closeness")]
    pub closeness: f64,

    #[serde(default = "default_weight")]
    pub customary_weight: f64,

    #[serde(default = "default_weight")]
    pub treaty_weight: f64,

    /// Weight of ratification markers in the treaty score
    #[serde(default = "default_weight")]
    pub ratification_weight: f64,

    /// Confidence needed before a pending law_type is refined (default: 0.5)
    #[serde(default = "default_refine_confidence")]
    pub refine_confidence: f64,
}

fn default_min_signal() -> f64 {
    0.1
}
fn default_closeness() -> f64 {
    0.15
}
fn default_weight() -> f64 {
    1.0
}
fn default_refine_confidence() -> f64 {
    0.5
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_signal: default_min_signal(),
            closeness: default_closeness(),
            customary_weight: default_weight(),
            treaty_weight: default_weight(),
            ratification_weight: default_weight(),
            refine_confidence: default_refine_confidence(),
        }
    }
}

/// Stored as the `results` of a customary_vs_treaty analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub label: ClassificationLabel,
    pub confidence: f64,
    pub rationale: String,
    pub score_customary: f64,
    pub score_treaty: f64,
    pub jus_cogens_score: f64,
    pub features: FeatureRecord,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    settings: ClassifierSettings,
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Classify a feature record
    pub fn classify(&self, features: &FeatureRecord) -> ClassificationReport {
        let s = &self.settings;
        let length = f64::from(features.normalized_length.max(1));

        let score_customary = s.customary_weight * features.weighted.customary / length;
        let score_treaty = (s.treaty_weight * features.weighted.treaty
            + s.ratification_weight * features.weighted.ratification)
            / length;

        let (label, confidence) = self.label(score_customary, score_treaty);

        ClassificationReport {
            label,
            confidence,
            rationale: rationale(label, score_customary, score_treaty, features, s),
            score_customary,
            score_treaty,
            jus_cogens_score: jus_cogens_score(features.jus_cogens_markers),
            features: features.clone(),
        }
    }

    fn label(&self, customary: f64, treaty: f64) -> (ClassificationLabel, f64) {
        let s = &self.settings;
        let high = customary.max(treaty);
        let low = customary.min(treaty);

        if customary == treaty && high > 0.0 {
            return (ClassificationLabel::Mixed, 1.0);
        }

        // no signal at all, whatever the minimum
        if high <= 0.0 || (customary < s.min_signal && treaty < s.min_signal) {
            return (ClassificationLabel::Indeterminate, 0.0);
        }

        if high - low < s.closeness && low >= s.min_signal {
            return (ClassificationLabel::Mixed, clamp_unit(low / high));
        }

        let label = if customary > treaty {
            ClassificationLabel::Customary
        } else {
            ClassificationLabel::Treaty
        };
        (label, clamp_unit((high - low) / (high + low)))
    }
}

/// Stepped score for peremptory-norm language
pub fn jus_cogens_score(markers: u32) -> f64 {
    match markers {
        0 => 0.0,
        1 => 0.4,
        2 => 0.6,
        _ => 0.8,
    }
}

fn rationale(
    label: ClassificationLabel,
    customary: f64,
    treaty: f64,
    features: &FeatureRecord,
    settings: &ClassifierSettings,
) -> String {
    let counts = format!(
        "{} customary, {} treaty and {} ratification markers over {} length unit(s)",
        features.customary_markers,
        features.treaty_markers,
        features.ratification_markers,
        features.normalized_length
    );

    match label {
        ClassificationLabel::Indeterminate => format!(
            "No signal: {}; both scores ({:.3}, {:.3}) below minimum {:.3}",
            counts, customary, treaty, settings.min_signal
        ),
        ClassificationLabel::Mixed => format!(
            "Mixed: {}; customary score {:.3} and treaty score {:.3} are within {:.3}",
            counts, customary, treaty, settings.closeness
        ),
        ClassificationLabel::Customary => format!(
            "Customary: {}; customary score {:.3} exceeds treaty score {:.3}",
            counts, customary, treaty
        ),
        ClassificationLabel::Treaty => format!(
            "Treaty: {}; treaty score {:.3} exceeds customary score {:.3}",
            counts, treaty, customary
        ),
    }
}
