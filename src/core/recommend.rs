//! Jus cogens recommendation synthesis.
//!
//! Works on an explicit [`CorpusSnapshot`] taken after classification, never
//! on live store state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::boundary::{jaccard, BoundaryAnalyzer, ClassifiedDocument};
use super::lexicon::{keyword_matches, Lexicon};
use crate::domain::{
    clamp_unit, ClassificationLabel, Jurisdiction, JurisdictionalBoundary, JusCogensRecommendation,
    LawType,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSettings {
    /// Distinct jurisdictions a cluster needs (default: 2)
    #[serde(default = "default_min_jurisdictions")]
    pub min_jurisdictions: usize,

    /// Boundaries at or above this confidence rule a cluster out (default: 0.8)
    #[serde(default = "default_high_conflict_confidence")]
    pub high_conflict_confidence: f64,

    /// Lowest similarity recorded as dissent (default: 0.2)
    #[serde(default = "default_dissent_threshold")]
    pub dissent_threshold: f64,

    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

fn default_min_jurisdictions() -> usize {
    2
}
fn default_high_conflict_confidence() -> f64 {
    0.8
}
fn default_dissent_threshold() -> f64 {
    0.2
}
fn default_smoothing() -> f64 {
    1.0
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            min_jurisdictions: default_min_jurisdictions(),
            high_conflict_confidence: default_high_conflict_confidence(),
            dissent_threshold: default_dissent_threshold(),
            smoothing: default_smoothing(),
        }
    }
}

/// Read-only view of the analysed corpus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub documents: Vec<ClassifiedDocument>,
    pub boundaries: Vec<JurisdictionalBoundary>,
}

/// Strength from supporting and opposing evidence
///
/// `S / (S + O + smoothing)` where `S` sums each jurisdiction's strongest
/// supporting confidence and `O` sums opposition confidences.
pub fn recommendation_strength(
    support: &[(Jurisdiction, f64)],
    opposition: &[f64],
    smoothing: f64,
) -> f64 {
    let mut best: BTreeMap<Jurisdiction, f64> = BTreeMap::new();
    for (jurisdiction, confidence) in support {
        let entry = best.entry(*jurisdiction).or_insert(0.0);
        *entry = entry.max(clamp_unit(*confidence));
    }

    let s: f64 = best.values().sum();
    let o: f64 = opposition.iter().map(|c| clamp_unit(*c)).sum();
    let denominator = s + o + smoothing.max(0.0);

    if denominator <= 0.0 {
        return 0.0;
    }
    clamp_unit(s / denominator)
}

/// One item of opposing evidence
#[derive(Debug, Clone)]
struct Opposition {
    argument: String,
    confidence: f64,
}

#[derive(Debug, Clone)]
pub struct RecommendationGenerator {
    settings: RecommendationSettings,
    analyzer: BoundaryAnalyzer,
    lexicon: Arc<Lexicon>,
}

impl RecommendationGenerator {
    pub fn new(settings: RecommendationSettings, analyzer: BoundaryAnalyzer, lexicon: Arc<Lexicon>) -> Self {
        Self {
            settings,
            analyzer,
            lexicon,
        }
    }

    /// Propose candidate peremptory norms; empty when nothing qualifies
    pub fn generate(&self, snapshot: &CorpusSnapshot) -> Vec<JusCogensRecommendation> {
        let documents: BTreeMap<&str, &ClassifiedDocument> = snapshot
            .documents
            .iter()
            .map(|d| (d.id.as_str(), d))
            .rev()
            .collect();

        // keyword -> ids of customary documents carrying it
        let mut support: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for document in documents.values() {
            if document.label != ClassificationLabel::Customary {
                continue;
            }
            for keyword in &document.keywords {
                support.entry(keyword.as_str()).or_default().insert(document.id.as_str());
            }
        }

        // keywords sharing a support set form one cluster
        let mut clusters: BTreeMap<BTreeSet<&str>, BTreeSet<&str>> = BTreeMap::new();
        for (keyword, ids) in support {
            clusters.entry(ids).or_default().insert(keyword);
        }

        let mut recommendations = Vec::new();
        for (ids, keywords) in &clusters {
            let supporters: Vec<&ClassifiedDocument> =
                ids.iter().filter_map(|id| documents.get(id).copied()).collect();
            let jurisdictions: BTreeSet<Jurisdiction> =
                supporters.iter().map(|d| d.jurisdiction).collect();
            if jurisdictions.len() < self.settings.min_jurisdictions.max(1) {
                continue;
            }

            let touching: Vec<&JurisdictionalBoundary> = snapshot
                .boundaries
                .iter()
                .filter(|b| keywords.iter().any(|k| touches(b, k, &documents)))
                .collect();

            if let Some(blocking) = touching
                .iter()
                .find(|b| b.confidence_score >= self.settings.high_conflict_confidence)
            {
                debug!(
                    keywords = ?keywords,
                    boundary_id = %blocking.id,
                    "Cluster ruled out by high-confidence conflict"
                );
                continue;
            }

            let mut opposition: Vec<Opposition> = touching
                .iter()
                .map(|b| Opposition {
                    argument: b.description.clone(),
                    confidence: b.confidence_score,
                })
                .collect();
            opposition.extend(self.dissent(keywords, ids, &documents));

            recommendations.push(self.build(keywords, &supporters, &jurisdictions, &opposition));
        }

        recommendations.sort_by(|a, b| {
            b.recommendation_strength
                .total_cmp(&a.recommendation_strength)
                .then_with(|| a.principle.cmp(&b.principle))
        });

        recommendations
    }

    /// Documents outside the cluster that partly share its subject under a
    /// different claim
    ///
    /// Each dissenting document counts once, measured against the cluster's
    /// keywords, so more support never adds opposition.
    fn dissent(
        &self,
        keywords: &BTreeSet<&str>,
        supporters: &BTreeSet<&str>,
        documents: &BTreeMap<&str, &ClassifiedDocument>,
    ) -> Vec<Opposition> {
        let cluster: BTreeSet<String> = keywords.iter().map(|k| k.to_string()).collect();
        let conflict_threshold = self.analyzer.settings().conflict_threshold;

        documents
            .values()
            .filter(|d| !supporters.contains(d.id.as_str()) && claims_otherwise(d))
            .filter_map(|d| {
                let similarity = jaccard(&cluster, &d.keywords);
                if similarity < self.settings.dissent_threshold || similarity >= conflict_threshold {
                    return None;
                }
                let shared: Vec<&str> = cluster
                    .intersection(&d.keywords)
                    .map(String::as_str)
                    .collect();
                Some(Opposition {
                    argument: format!(
                        "{} ({}, {}) diverges on {} (similarity {:.2})",
                        d.id,
                        d.jurisdiction,
                        d.law_type,
                        shared.join(", "),
                        similarity
                    ),
                    confidence: similarity,
                })
            })
            .collect()
    }

    fn build(
        &self,
        keywords: &BTreeSet<&str>,
        supporters: &[&ClassifiedDocument],
        jurisdictions: &BTreeSet<Jurisdiction>,
        opposition: &[Opposition],
    ) -> JusCogensRecommendation {
        let support: Vec<(Jurisdiction, f64)> =
            supporters.iter().map(|d| (d.jurisdiction, d.confidence)).collect();
        let opposing: Vec<f64> = opposition.iter().map(|o| o.confidence).collect();
        let strength = recommendation_strength(&support, &opposing, self.settings.smoothing);

        let keyword_list = keywords.iter().copied().collect::<Vec<_>>().join(", ");
        let principle = keywords
            .iter()
            .find_map(|k| self.lexicon.principle_for(k))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Customary norm on {}", keyword_list));

        let description = format!(
            "Customary practice on {} is attested in {} jurisdictions ({}) by {} document(s), \
             with {} opposing argument(s)",
            keyword_list,
            jurisdictions.len(),
            jurisdictions
                .iter()
                .map(|j| j.label())
                .collect::<Vec<_>>()
                .join(", "),
            supporters.len(),
            opposition.len()
        );

        let legal_basis: BTreeSet<String> = supporters
            .iter()
            .map(|d| {
                if d.source_url.is_empty() {
                    d.id.clone()
                } else {
                    d.source_url.clone()
                }
            })
            .collect();

        let mut recommendation = JusCogensRecommendation::new(principle, description, strength);
        recommendation.legal_basis = legal_basis.into_iter().collect();
        recommendation.supporting_documents = supporters.iter().map(|d| d.id.clone()).collect();
        recommendation.opposition_arguments = opposition.iter().map(|o| o.argument.clone()).collect();
        recommendation.implementation_guidance = guidance(strength).to_string();
        recommendation
    }
}

/// Whether a boundary concerns `keyword`
///
/// At least two of its known legal-basis documents carry the keyword; with
/// no known legal basis the description is searched instead.
fn touches(
    boundary: &JurisdictionalBoundary,
    keyword: &str,
    documents: &BTreeMap<&str, &ClassifiedDocument>,
) -> bool {
    let known: Vec<&&ClassifiedDocument> = boundary
        .legal_basis
        .iter()
        .filter_map(|id| documents.get(id.as_str()))
        .collect();

    if known.is_empty() {
        return keyword_matches(&normalize_text(&boundary.description), keyword);
    }

    known
        .iter()
        .filter(|d| d.keywords.iter().any(|k| keyword_matches(k, keyword)))
        .count()
        >= 2
}

/// A document whose claim differs from customary law
fn claims_otherwise(document: &ClassifiedDocument) -> bool {
    document.law_type != LawType::Customary
        || (document.label.is_definite() && document.label != ClassificationLabel::Customary)
}

/// Free text as one normalised keyword, split on anything but letters and digits
fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn guidance(strength: f64) -> &'static str {
    if strength >= 0.75 {
        "Strong candidate: propose recognition as a peremptory norm and codify in a multilateral instrument"
    } else if strength >= 0.5 {
        "Moderate candidate: document further state practice and opinio juris before proposing recognition"
    } else if strength >= 0.25 {
        "Emerging candidate: monitor state practice and address the recorded opposition"
    } else {
        "Weak candidate: insufficient support for recognition at this time"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::boundary::BoundarySettings;
    use crate::domain::BoundaryType;

    fn generator() -> RecommendationGenerator {
        let lexicon = Arc::new(Lexicon::builtin().unwrap());
        RecommendationGenerator::new(
            RecommendationSettings::default(),
            BoundaryAnalyzer::new(BoundarySettings::default(), lexicon.clone()),
            lexicon,
        )
    }

    fn customary(id: &str, jurisdiction: Jurisdiction, confidence: f64, keywords: &[&str]) -> ClassifiedDocument {
        ClassifiedDocument {
            id: id.to_string(),
            title: id.to_string(),
            source_url: format!("https://example.org/{}", id),
            jurisdiction,
            law_type: LawType::Customary,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            label: ClassificationLabel::Customary,
            confidence,
        }
    }

    #[test]
    fn test_strength_formula() {
        assert_eq!(recommendation_strength(&[], &[], 1.0), 0.0);
        let s = recommendation_strength(&[(Jurisdiction::Us, 1.0), (Jurisdiction::Eu, 1.0)], &[], 1.0);
        assert!((s - 2.0 / 3.0).abs() < 1e-12);

        // only the strongest document per jurisdiction counts
        let s = recommendation_strength(
            &[(Jurisdiction::Us, 0.5), (Jurisdiction::Us, 1.0), (Jurisdiction::Eu, 1.0)],
            &[],
            1.0,
        );
        assert!((s - 2.0 / 3.0).abs() < 1e-12);

        let s = recommendation_strength(&[(Jurisdiction::Us, 1.0)], &[1.0], 0.0);
        assert!((s - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_across_jurisdictions() {
        let snapshot = CorpusSnapshot {
            documents: vec![
                customary("a", Jurisdiction::Us, 0.9, &["peaceful-use"]),
                customary("b", Jurisdiction::China, 0.7, &["peaceful-use"]),
            ],
            boundaries: vec![],
        };

        let recommendations = generator().generate(&snapshot);
        assert_eq!(recommendations.len(), 1);

        let rec = &recommendations[0];
        assert_eq!(rec.principle, "Peaceful use of outer space");
        assert_eq!(rec.supporting_documents, vec!["a".to_string(), "b".to_string()]);
        assert!(rec.opposition_arguments.is_empty());
        assert!((rec.recommendation_strength - 1.6 / 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_single_jurisdiction_is_not_a_candidate() {
        let snapshot = CorpusSnapshot {
            documents: vec![
                customary("a", Jurisdiction::Us, 0.9, &["peaceful-use"]),
                customary("b", Jurisdiction::Us, 0.9, &["peaceful-use"]),
            ],
            boundaries: vec![],
        };
        assert!(generator().generate(&snapshot).is_empty());
        assert!(generator().generate(&CorpusSnapshot::default()).is_empty());
    }

    #[test]
    fn test_high_confidence_conflict_excludes_cluster() {
        let documents = vec![
            customary("a", Jurisdiction::Us, 0.9, &["liability"]),
            customary("b", Jurisdiction::Eu, 0.9, &["liability"]),
        ];
        let boundary = JurisdictionalBoundary::new(
            Jurisdiction::Eu,
            BoundaryType::Liability,
            "conflicting claims on liability".to_string(),
            vec!["a".to_string(), "b".to_string()],
            vec![],
            0.9,
        );

        let snapshot = CorpusSnapshot {
            documents: documents.clone(),
            boundaries: vec![boundary.clone()],
        };
        assert!(generator().generate(&snapshot).is_empty());

        // a weaker boundary is recorded as opposition instead
        let mut weak = boundary;
        weak.confidence_score = 0.5;
        let snapshot = CorpusSnapshot {
            documents,
            boundaries: vec![weak],
        };
        let recommendations = generator().generate(&snapshot);
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].opposition_arguments.len(), 1);
    }

    #[test]
    fn test_dissent_below_conflict_threshold_is_opposition() {
        let mut treaty = customary("c", Jurisdiction::Russia, 0.8, &["rescue", "launch", "spectrum", "satellite"]);
        treaty.law_type = LawType::Treaty;
        treaty.label = ClassificationLabel::Treaty;

        let snapshot = CorpusSnapshot {
            documents: vec![
                customary("a", Jurisdiction::Us, 0.9, &["rescue"]),
                customary("b", Jurisdiction::Eu, 0.9, &["rescue"]),
                treaty,
            ],
            boundaries: vec![],
        };

        let recommendations = generator().generate(&snapshot);
        assert_eq!(recommendations.len(), 1);
        // c shares one of four keywords with the cluster
        assert_eq!(recommendations[0].opposition_arguments.len(), 1);
        assert!(recommendations[0].opposition_arguments[0].starts_with("c (Russia, treaty)"));
        assert!((recommendations[0].recommendation_strength - 1.8 / 3.05).abs() < 1e-12);
    }

    #[test]
    fn test_added_support_never_weakens_recommendation() {
        let mut treaty = customary("c", Jurisdiction::Russia, 0.8, &["rescue", "launch", "spectrum"]);
        treaty.law_type = LawType::Treaty;
        treaty.label = ClassificationLabel::Treaty;

        let mut documents = vec![
            customary("a", Jurisdiction::Us, 0.9, &["rescue"]),
            customary("b", Jurisdiction::Eu, 0.9, &["rescue"]),
            treaty,
        ];
        let strength = |documents: &[ClassifiedDocument]| {
            let snapshot = CorpusSnapshot {
                documents: documents.to_vec(),
                boundaries: vec![],
            };
            generator()
                .generate(&snapshot)
                .into_iter()
                .find(|r| r.supporting_documents.contains(&"a".to_string()))
                .map(|r| r.recommendation_strength)
                .unwrap()
        };

        let mut previous = strength(&documents);
        for (id, jurisdiction, keywords) in [
            ("d", Jurisdiction::Us, vec!["rescue", "other-topic"]),
            ("e", Jurisdiction::China, vec!["rescue", "launch"]),
            ("f", Jurisdiction::Un, vec!["rescue", "spectrum", "launch"]),
        ] {
            documents.push(customary(id, jurisdiction, 0.9, &keywords));
            let current = strength(&documents);
            assert!(
                current >= previous,
                "adding {} lowered strength from {} to {}",
                id,
                previous,
                current
            );
            previous = current;
        }
    }

    #[test]
    fn test_boundary_description_matches_whole_words() {
        let boundary = JurisdictionalBoundary::new(
            Jurisdiction::Eu,
            BoundaryType::Activity,
            "Conflicting claims over relaunch of orbital debris".to_string(),
            vec!["unknown".to_string()],
            vec![],
            0.5,
        );
        let documents = BTreeMap::new();

        assert!(!touches(&boundary, "launch", &documents));
        assert!(touches(&boundary, "relaunch", &documents));
        assert!(touches(&boundary, "orbital-debris", &documents));
    }

    #[test]
    fn test_output_sorted_by_strength() {
        let snapshot = CorpusSnapshot {
            documents: vec![
                customary("a", Jurisdiction::Us, 0.2, &["rescue"]),
                customary("b", Jurisdiction::Eu, 0.2, &["rescue"]),
                customary("c", Jurisdiction::Us, 0.9, &["cooperation"]),
                customary("d", Jurisdiction::China, 0.9, &["cooperation"]),
            ],
            boundaries: vec![],
        };
        let recommendations = generator().generate(&snapshot);
        assert_eq!(recommendations.len(), 2);
        assert!(recommendations[0].recommendation_strength >= recommendations[1].recommendation_strength);
        assert_eq!(recommendations[0].principle, "International cooperation and mutual assistance");
    }
}
