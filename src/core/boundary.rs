//! Jurisdictional boundary analysis.
//!
//! Documents are grouped by declared jurisdiction. Every pair of
//! jurisdictions is compared document-by-document using Jaccard similarity
//! over keyword sets; a pair of documents conflicts when the similarity
//! reaches the conflict threshold and their law type or classified scope
//! differs. All conflicts for one jurisdiction pair collapse into a single
//! [`JurisdictionalBoundary`].
//!
//! Jurisdictions and documents are sorted before pairing, so the output does
//! not depend on input order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::EngineError;
use super::lexicon::{normalize_keyword, Lexicon};
use crate::domain::{
    clamp_unit, BoundaryConflict, BoundaryType, ClassificationLabel, Document, Jurisdiction,
    JurisdictionalBoundary, LawType,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySettings {
    /// Minimum keyword similarity for a conflict (default: 0.5)
    #[serde(default = "default_conflict_threshold")]
    pub conflict_threshold: f64,
}

fn default_conflict_threshold() -> f64 {
    0.5
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            conflict_threshold: default_conflict_threshold(),
        }
    }
}

/// A document together with its latest classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    pub id: String,
    pub title: String,
    pub source_url: String,
    pub jurisdiction: Jurisdiction,
    pub law_type: LawType,
    /// Normalised keywords used for overlap
    pub keywords: BTreeSet<String>,
    pub label: ClassificationLabel,
    pub confidence: f64,
}

impl ClassifiedDocument {
    /// Build from a document and its classification
    ///
    /// Declared keywords win; documents declaring none fall back to the topic
    /// keywords found in their text.
    pub fn new(
        document: &Document,
        label: ClassificationLabel,
        confidence: f64,
        topic_keywords: &BTreeSet<String>,
    ) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            source_url: document.source_url.clone(),
            jurisdiction: document.jurisdiction,
            law_type: document.law_type,
            keywords: effective_keywords(&document.keywords, topic_keywords),
            label,
            confidence: clamp_unit(confidence),
        }
    }
}

/// Normalised declared keywords, or the topic keywords when none are declared
pub fn effective_keywords(
    declared: &BTreeSet<String>,
    topic_keywords: &BTreeSet<String>,
) -> BTreeSet<String> {
    let declared: BTreeSet<String> = declared
        .iter()
        .map(|k| normalize_keyword(k))
        .filter(|k| !k.is_empty())
        .collect();

    if declared.is_empty() {
        topic_keywords.clone()
    } else {
        declared
    }
}

/// Jaccard similarity of two keyword sets (0.0 when both are empty)
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Whether two documents make different claims over the same subject
///
/// Law types differ, or both classifications are definite and disagree.
pub fn claims_differ(a: &ClassifiedDocument, b: &ClassifiedDocument) -> bool {
    a.law_type != b.law_type || (a.label.is_definite() && b.label.is_definite() && a.label != b.label)
}

/// Two documents from different jurisdictions with overlapping keywords
#[derive(Debug, Clone)]
pub struct DocumentPair<'a> {
    /// Document from the jurisdiction that sorts first
    pub left: &'a ClassifiedDocument,
    pub right: &'a ClassifiedDocument,
    pub similarity: f64,
    pub shared: BTreeSet<String>,
}

impl DocumentPair<'_> {
    /// Conflict entries for both sides, each naming its counterpart
    fn conflicts(&self) -> [BoundaryConflict; 2] {
        [
            BoundaryConflict {
                jurisdiction: self.right.jurisdiction,
                document_id: self.right.id.clone(),
                conflict_description: self.describe(self.right, self.left),
            },
            BoundaryConflict {
                jurisdiction: self.left.jurisdiction,
                document_id: self.left.id.clone(),
                conflict_description: self.describe(self.left, self.right),
            },
        ]
    }

    fn describe(&self, this: &ClassifiedDocument, other: &ClassifiedDocument) -> String {
        format!(
            "{} ({}, {} {}) conflicts with {} ({}, {} {}): similarity {:.2} on {}",
            this.id,
            this.jurisdiction,
            this.law_type,
            this.label,
            other.id,
            other.jurisdiction,
            other.law_type,
            other.label,
            self.similarity,
            join(&self.shared)
        )
    }
}

/// Detects conflicting claims between jurisdictions
#[derive(Debug, Clone)]
pub struct BoundaryAnalyzer {
    settings: BoundarySettings,
    lexicon: Arc<Lexicon>,
}

impl BoundaryAnalyzer {
    pub fn new(settings: BoundarySettings, lexicon: Arc<Lexicon>) -> Self {
        Self { settings, lexicon }
    }

    pub fn settings(&self) -> &BoundarySettings {
        &self.settings
    }

    /// Every cross-jurisdiction pair with shared keywords and differing claims
    ///
    /// Pairs come out sorted by jurisdiction pair, then document ids.
    /// Duplicate ids are considered once.
    pub fn differing_pairs<'a>(&self, documents: &'a [ClassifiedDocument]) -> Vec<DocumentPair<'a>> {
        let groups: Vec<Vec<&'a ClassifiedDocument>> =
            group_by_jurisdiction(documents).into_values().collect();

        let mut pairs = Vec::new();
        for (i, left_group) in groups.iter().enumerate() {
            for right_group in &groups[i + 1..] {
                for &left in left_group {
                    for &right in right_group {
                        let shared: BTreeSet<String> =
                            left.keywords.intersection(&right.keywords).cloned().collect();
                        if shared.is_empty() || !claims_differ(left, right) {
                            continue;
                        }
                        pairs.push(DocumentPair {
                            left,
                            right,
                            similarity: jaccard(&left.keywords, &right.keywords),
                            shared,
                        });
                    }
                }
            }
        }
        pairs
    }

    /// Produce one boundary per jurisdiction pair that has conflicts
    ///
    /// Fails with `InsufficientData` when fewer than two jurisdictions are
    /// represented.
    pub fn analyze(
        &self,
        documents: &[ClassifiedDocument],
    ) -> Result<Vec<JurisdictionalBoundary>, EngineError> {
        let jurisdictions: BTreeSet<&str> = documents.iter().map(|d| d.jurisdiction.as_str()).collect();
        if jurisdictions.len() < 2 {
            return Err(EngineError::InsufficientData(format!(
                "boundary analysis needs documents from two jurisdictions, got {}",
                jurisdictions.len()
            )));
        }

        let mut by_pair: BTreeMap<(&str, &str), Vec<DocumentPair<'_>>> = BTreeMap::new();
        for pair in self.differing_pairs(documents) {
            if pair.similarity >= self.settings.conflict_threshold {
                by_pair
                    .entry((pair.left.jurisdiction.as_str(), pair.right.jurisdiction.as_str()))
                    .or_default()
                    .push(pair);
            }
        }

        let boundaries: Vec<JurisdictionalBoundary> =
            by_pair.values().map(|pairs| self.build_boundary(pairs)).collect();

        debug!(
            documents = documents.len(),
            jurisdictions = jurisdictions.len(),
            boundaries = boundaries.len(),
            "Boundary analysis complete"
        );

        Ok(boundaries)
    }

    fn build_boundary(&self, pairs: &[DocumentPair<'_>]) -> JurisdictionalBoundary {
        let left = pairs[0].left.jurisdiction;
        let right = pairs[0].right.jurisdiction;

        let mut conflicts = Vec::with_capacity(pairs.len() * 2);
        let mut legal_basis = BTreeSet::new();
        let mut topics = BTreeSet::new();
        let mut votes: BTreeMap<BoundaryType, usize> = BTreeMap::new();
        let mut confidence: f64 = 0.0;

        for pair in pairs {
            conflicts.extend(pair.conflicts());
            legal_basis.insert(pair.left.id.clone());
            legal_basis.insert(pair.right.id.clone());
            confidence = confidence.max(pair.similarity);
            for keyword in &pair.shared {
                topics.insert(keyword.clone());
                if let Some(category) = self.lexicon.topic_category(keyword) {
                    *votes.entry(category).or_default() += 1;
                }
            }
        }

        let boundary_type = dominant(&votes);
        let description = format!(
            "{} and {} hold {} conflicting claim(s) on {} ({})",
            left,
            right,
            pairs.len(),
            join(&topics),
            boundary_type
        );

        JurisdictionalBoundary::new(
            left,
            boundary_type,
            description,
            legal_basis.into_iter().collect(),
            conflicts,
            confidence,
        )
    }
}

fn group_by_jurisdiction(
    documents: &[ClassifiedDocument],
) -> BTreeMap<&'static str, Vec<&ClassifiedDocument>> {
    let mut unique: BTreeMap<&str, &ClassifiedDocument> = BTreeMap::new();
    for document in documents {
        unique.entry(document.id.as_str()).or_insert(document);
    }

    let mut groups: BTreeMap<&'static str, Vec<&ClassifiedDocument>> = BTreeMap::new();
    for document in unique.into_values() {
        groups
            .entry(document.jurisdiction.as_str())
            .or_default()
            .push(document);
    }
    groups
}

/// Category with a unique maximum vote, otherwise `Other`
fn dominant(votes: &BTreeMap<BoundaryType, usize>) -> BoundaryType {
    let Some(max) = votes.values().copied().max() else {
        return BoundaryType::Other;
    };
    let mut leaders = votes.iter().filter(|(_, count)| **count == max);
    match (leaders.next(), leaders.next()) {
        (Some((category, _)), None) => *category,
        _ => BoundaryType::Other,
    }
}

fn join(keywords: &BTreeSet<String>) -> String {
    keywords.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> BoundaryAnalyzer {
        BoundaryAnalyzer::new(
            BoundarySettings::default(),
            Arc::new(Lexicon::builtin().unwrap()),
        )
    }

    fn doc(id: &str, jurisdiction: Jurisdiction, law_type: LawType, keywords: &[&str]) -> ClassifiedDocument {
        ClassifiedDocument {
            id: id.to_string(),
            title: id.to_string(),
            source_url: format!("https://example.org/{}", id),
            jurisdiction,
            law_type,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            label: ClassificationLabel::Indeterminate,
            confidence: 0.0,
        }
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["y", "z"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_effective_keywords() {
        let declared: BTreeSet<String> = ["Orbital Debris".to_string()].into();
        let topics: BTreeSet<String> = ["launch".to_string()].into();
        assert_eq!(
            effective_keywords(&declared, &topics),
            ["orbital-debris".to_string()].into()
        );
        assert_eq!(effective_keywords(&BTreeSet::new(), &topics), topics);
    }

    #[test]
    fn test_treaty_vs_customary_liability_conflict() {
        let docs = vec![
            doc("a", Jurisdiction::Us, LawType::Treaty, &["orbital-debris", "liability"]),
            doc("b", Jurisdiction::Russia, LawType::Customary, &["orbital-debris", "liability"]),
        ];

        let boundaries = analyzer().analyze(&docs).unwrap();
        assert_eq!(boundaries.len(), 1);

        let boundary = &boundaries[0];
        assert_eq!(boundary.boundary_type, BoundaryType::Liability);
        assert_eq!(boundary.confidence_score, 1.0);
        assert_eq!(boundary.legal_basis, vec!["a".to_string(), "b".to_string()]);
        let referenced: BTreeSet<&str> =
            boundary.conflicts.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(referenced, ["a", "b"].into());
    }

    #[test]
    fn test_same_claims_do_not_conflict() {
        let docs = vec![
            doc("a", Jurisdiction::Us, LawType::Treaty, &["liability"]),
            doc("b", Jurisdiction::Eu, LawType::Treaty, &["liability"]),
        ];
        assert!(analyzer().analyze(&docs).unwrap().is_empty());
    }

    #[test]
    fn test_classified_scope_difference_conflicts() {
        let mut a = doc("a", Jurisdiction::Us, LawType::Domestic, &["launch"]);
        let mut b = doc("b", Jurisdiction::China, LawType::Domestic, &["launch"]);
        a.label = ClassificationLabel::Treaty;
        b.label = ClassificationLabel::Customary;
        let boundaries = analyzer().analyze(&[a, b]).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].boundary_type, BoundaryType::Activity);
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let docs = vec![
            doc("a", Jurisdiction::Us, LawType::Treaty, &["liability", "launch", "satellite"]),
            doc("b", Jurisdiction::Russia, LawType::Customary, &["liability", "spectrum", "rescue"]),
        ];
        assert!(analyzer().analyze(&docs).unwrap().is_empty());
        assert_eq!(analyzer().differing_pairs(&docs).len(), 1);
    }

    #[test]
    fn test_tied_categories_are_other() {
        let docs = vec![
            doc("a", Jurisdiction::Us, LawType::Treaty, &["liability", "spectrum"]),
            doc("b", Jurisdiction::Russia, LawType::Customary, &["liability", "spectrum"]),
        ];
        let boundaries = analyzer().analyze(&docs).unwrap();
        assert_eq!(boundaries[0].boundary_type, BoundaryType::Other);
    }

    #[test]
    fn test_single_jurisdiction_is_insufficient() {
        let docs = vec![
            doc("a", Jurisdiction::Us, LawType::Treaty, &["liability"]),
            doc("b", Jurisdiction::Us, LawType::Customary, &["liability"]),
        ];
        assert!(matches!(
            analyzer().analyze(&docs),
            Err(EngineError::InsufficientData(_))
        ));
        assert!(matches!(analyzer().analyze(&[]), Err(EngineError::InsufficientData(_))));
    }

    #[test]
    fn test_dominant_requires_unique_max() {
        let votes = BTreeMap::from([(BoundaryType::Resource, 2), (BoundaryType::Activity, 1)]);
        assert_eq!(dominant(&votes), BoundaryType::Resource);
        let votes = BTreeMap::from([(BoundaryType::Resource, 2), (BoundaryType::Activity, 2)]);
        assert_eq!(dominant(&votes), BoundaryType::Other);
        assert_eq!(dominant(&BTreeMap::new()), BoundaryType::Other);
    }
}
