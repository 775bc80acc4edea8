//! The engine's three contract operations bound to a store.
//!
//! - [`Engine::classify`]: one document -> one `customary_vs_treaty` analysis
//! - [`Engine::analyze_boundaries`]: classified documents -> boundaries
//! - [`Engine::generate_recommendations`]: analysed corpus -> recommendations
//!
//! Every call produces fresh records; nothing is deduplicated. Every store
//! call is bounded by the configured write timeout.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::boundary::{BoundaryAnalyzer, ClassifiedDocument};
use super::classifier::{ClassificationReport, Classifier};
use super::error::EngineError;
use super::features::FeatureExtractor;
use super::lexicon::{Lexicon, Ruleset};
use super::recommend::{CorpusSnapshot, RecommendationGenerator};
use crate::config::{EngineSettings, ResolvedConfig};
use crate::domain::{
    AnalysisType, ClassificationLabel, Document, DocumentStatus, DocumentUpdate, Jurisdiction,
    JurisdictionalBoundary, JusCogensRecommendation, LawType, LegalAnalysis,
};
use crate::store::{DocumentFilter, Page, PersistenceError, Store};

/// Sentences kept when deriving a summary
const SUMMARY_SENTENCES: usize = 3;

/// Legal analysis engine
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    settings: Arc<EngineSettings>,
    lexicon: Arc<Lexicon>,
    methodology: String,
    extractor: FeatureExtractor,
    classifier: Classifier,
    analyzer: BoundaryAnalyzer,
    generator: RecommendationGenerator,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store.name())
            .field("methodology", &self.methodology)
            .finish()
    }
}

impl Engine {
    /// Build an engine; fails on invalid settings
    pub fn new(
        store: Arc<dyn Store>,
        lexicon: Lexicon,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        settings.validate()?;

        let lexicon = Arc::new(lexicon);
        let analyzer = BoundaryAnalyzer::new(settings.boundaries.clone(), lexicon.clone());

        Ok(Self {
            extractor: FeatureExtractor::new(lexicon.clone(), &settings.extraction),
            classifier: Classifier::new(settings.classifier.clone()),
            generator: RecommendationGenerator::new(
                settings.recommendations.clone(),
                analyzer.clone(),
                lexicon.clone(),
            ),
            analyzer,
            methodology: lexicon.methodology(),
            lexicon,
            settings: Arc::new(settings),
            store,
        })
    }

    /// Build an engine loading the configured ruleset by name
    pub fn with_ruleset(
        store: Arc<dyn Store>,
        settings: EngineSettings,
        rulesets_dir: Option<&Path>,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let ruleset = Ruleset::load(&settings.ruleset, rulesets_dir)?;
        let lexicon = Lexicon::compile(&ruleset)?;
        Self::new(store, lexicon, settings)
    }

    /// Build an engine from resolved configuration
    pub fn from_config(store: Arc<dyn Store>, config: &ResolvedConfig) -> Result<Self, EngineError> {
        Self::with_ruleset(store, config.engine.clone(), Some(&config.rulesets_dir))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Tag recorded on every analysis this engine writes
    pub fn methodology(&self) -> &str {
        &self.methodology
    }

    /// Run a store call under the write timeout
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, PersistenceError>
    where
        F: Future<Output = Result<T, PersistenceError>>,
    {
        let limits = &self.settings.limits;
        match tokio::time::timeout(limits.write_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout {
                operation,
                after_ms: limits.write_timeout_ms,
            }),
        }
    }

    async fn fetch_document(&self, document_id: &str) -> Result<Document, EngineError> {
        self.bounded("get_document", self.store.get_document(document_id))
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound(document_id.to_string()))
    }

    async fn mark_failed(&self, document_id: &str) {
        let update = DocumentUpdate::status(document_id, DocumentStatus::Failed);
        if let Err(e) = self.bounded("update_document", self.store.update_document(&update)).await {
            warn!(document_id, error = %e, "Failed to mark document as failed");
        }
    }

    /// Extract and classify without touching the store
    pub fn assess(&self, document: &Document) -> Result<ClassificationReport, EngineError> {
        self.settings
            .limits
            .validate_content(&document.content)
            .map_err(|source| EngineError::Limit {
                document_id: document.id.clone(),
                source,
            })?;

        let features = self
            .extractor
            .extract_document(document)
            .map_err(|source| EngineError::Extraction {
                document_id: document.id.clone(),
                source,
            })?;

        Ok(self.classifier.classify(&features))
    }

    /// Classify one document and persist a `customary_vs_treaty` analysis
    ///
    /// On success the document is marked processed; extraction and limit
    /// failures mark it failed.
    pub async fn classify(&self, document_id: &str) -> Result<LegalAnalysis, EngineError> {
        self.classify_with_report(document_id)
            .await
            .map(|(analysis, _)| analysis)
    }

    /// [`Engine::classify`], also returning the report that was stored
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn classify_with_report(
        &self,
        document_id: &str,
    ) -> Result<(LegalAnalysis, ClassificationReport), EngineError> {
        let document = self.fetch_document(document_id).await?;

        let report = match self.assess(&document) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Classification failed");
                self.mark_failed(document_id).await;
                return Err(e);
            }
        };

        let results = serde_json::to_value(&report).map_err(PersistenceError::from)?;
        let analysis = LegalAnalysis::new(
            document.id.clone(),
            AnalysisType::CustomaryVsTreaty,
            results,
            report.confidence,
            self.methodology.clone(),
        );
        self.bounded("insert_analysis", self.store.insert_analysis(&analysis))
            .await?;

        let update = DocumentUpdate {
            document_id: document.id.clone(),
            status: DocumentStatus::Processed,
            law_type: self.refined_law_type(&document, &report),
            summary: match document.summary {
                Some(_) => None,
                None => summarize(&document.content, SUMMARY_SENTENCES),
            },
        };
        if !self
            .bounded("update_document", self.store.update_document(&update))
            .await?
        {
            return Err(EngineError::DocumentNotFound(document.id));
        }

        info!(
            analysis_id = %analysis.id,
            label = %report.label,
            confidence = report.confidence,
            "Document classified"
        );

        Ok((analysis, report))
    }

    fn refined_law_type(&self, document: &Document, report: &ClassificationReport) -> Option<LawType> {
        if document.law_type != LawType::Pending
            || report.confidence < self.settings.classifier.refine_confidence
        {
            return None;
        }
        match report.label {
            ClassificationLabel::Customary => Some(LawType::Customary),
            ClassificationLabel::Treaty => Some(LawType::Treaty),
            _ => None,
        }
    }

    /// Latest classification stored for a document under this methodology
    async fn stored_classification(
        &self,
        document: &Document,
    ) -> Result<Option<ClassificationReport>, EngineError> {
        let latest = self
            .bounded(
                "latest_analysis",
                self.store.latest_analysis(
                    &document.id,
                    AnalysisType::CustomaryVsTreaty,
                    Some(&self.methodology),
                ),
            )
            .await?;

        Ok(latest.and_then(|analysis| {
            match serde_json::from_value::<ClassificationReport>(analysis.results) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(
                        document_id = %document.id,
                        analysis_id = %analysis.id,
                        error = %e,
                        "Stored classification unreadable"
                    );
                    None
                }
            }
        }))
    }

    /// Pair a document with its classification
    ///
    /// Uses the stored analysis when present, otherwise classifies in memory
    /// when `allow_fresh` is set.
    async fn classified(
        &self,
        document: &Document,
        allow_fresh: bool,
    ) -> Result<Option<ClassifiedDocument>, EngineError> {
        let report = match self.stored_classification(document).await? {
            Some(report) => report,
            None if allow_fresh => match self.assess(document) {
                Ok(report) => report,
                Err(e) => {
                    warn!(document_id = %document.id, error = %e, "Document left out of analysis");
                    return Ok(None);
                }
            },
            None => return Ok(None),
        };

        Ok(Some(ClassifiedDocument::new(
            document,
            report.label,
            report.confidence,
            &report.features.topic_keywords,
        )))
    }

    /// Detect conflicting claims among the given documents
    ///
    /// An empty `jurisdictions` set means every jurisdiction. Fewer than two
    /// represented jurisdictions yields an empty result.
    pub async fn analyze_boundaries(
        &self,
        jurisdictions: &[Jurisdiction],
        document_ids: &[String],
    ) -> Result<Vec<JurisdictionalBoundary>, EngineError> {
        match self.detect_boundaries(jurisdictions, document_ids).await {
            Err(EngineError::InsufficientData(reason)) => {
                info!(%reason, "Boundary analysis skipped");
                Ok(Vec::new())
            }
            result => result,
        }
    }

    /// [`Engine::analyze_boundaries`], reporting too little data as
    /// [`EngineError::InsufficientData`]
    #[instrument(skip(self, document_ids), fields(documents = document_ids.len()))]
    pub async fn detect_boundaries(
        &self,
        jurisdictions: &[Jurisdiction],
        document_ids: &[String],
    ) -> Result<Vec<JurisdictionalBoundary>, EngineError> {
        let wanted: BTreeSet<Jurisdiction> = jurisdictions.iter().copied().collect();
        let unique: BTreeSet<&str> = document_ids.iter().map(String::as_str).collect();

        let mut documents = Vec::with_capacity(unique.len());
        for id in unique {
            let document = match self.fetch_document(id).await {
                Ok(document) => document,
                Err(EngineError::DocumentNotFound(_)) => {
                    warn!(document_id = id, "Document not found, left out of boundary analysis");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !wanted.is_empty() && !wanted.contains(&document.jurisdiction) {
                continue;
            }
            if let Some(classified) = self.classified(&document, true).await? {
                documents.push(classified);
            }
        }

        let boundaries = self.analyzer.analyze(&documents)?;

        for boundary in &boundaries {
            self.bounded("insert_boundary", self.store.insert_boundary(boundary))
                .await?;
        }
        self.record_conflicts(&boundaries).await?;

        info!(boundaries = boundaries.len(), "Boundary analysis complete");
        Ok(boundaries)
    }

    /// One `jurisdictional` analysis per document named in a conflict
    async fn record_conflicts(&self, boundaries: &[JurisdictionalBoundary]) -> Result<(), EngineError> {
        let mut per_document: BTreeMap<&str, Vec<&JurisdictionalBoundary>> = BTreeMap::new();
        for boundary in boundaries {
            for conflict in &boundary.conflicts {
                let entry = per_document.entry(conflict.document_id.as_str()).or_default();
                if !entry.iter().any(|b| b.id == boundary.id) {
                    entry.push(boundary);
                }
            }
        }

        for (document_id, involved) in per_document {
            let conflicts: Vec<_> = involved
                .iter()
                .flat_map(|b| b.conflicts.iter().filter(|c| c.document_id != document_id))
                .collect();
            let confidence = involved
                .iter()
                .map(|b| b.confidence_score)
                .fold(0.0, f64::max);

            let results = json!({
                "boundary_ids": involved.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
                "boundary_types": involved.iter().map(|b| b.boundary_type).collect::<Vec<_>>(),
                "jurisdictions": involved
                    .iter()
                    .flat_map(|b| b.jurisdictions())
                    .collect::<BTreeSet<_>>(),
                "conflicts": conflicts,
            });

            let analysis = LegalAnalysis::new(
                document_id,
                AnalysisType::Jurisdictional,
                results,
                confidence,
                self.methodology.clone(),
            );
            self.bounded("insert_analysis", self.store.insert_analysis(&analysis))
                .await?;
            debug!(document_id, analysis_id = %analysis.id, "Recorded jurisdictional analysis");
        }

        Ok(())
    }

    /// Read-only view of everything classified so far
    pub async fn snapshot(&self) -> Result<CorpusSnapshot, EngineError> {
        let documents = self
            .bounded(
                "list_documents",
                self.store.list_documents(&DocumentFilter::default(), Page::all()),
            )
            .await?;

        let mut classified = Vec::with_capacity(documents.len());
        for document in &documents {
            if let Some(entry) = self.classified(document, false).await? {
                classified.push(entry);
            }
        }

        let boundaries = self
            .bounded("list_boundaries", self.store.list_boundaries(Page::all()))
            .await?;

        Ok(CorpusSnapshot {
            documents: classified,
            boundaries,
        })
    }

    /// Propose and persist jus cogens recommendations from the corpus
    #[instrument(skip(self))]
    pub async fn generate_recommendations(&self) -> Result<Vec<JusCogensRecommendation>, EngineError> {
        let snapshot = self.snapshot().await?;
        debug!(
            documents = snapshot.documents.len(),
            boundaries = snapshot.boundaries.len(),
            "Corpus snapshot taken"
        );

        let recommendations = self.generator.generate(&snapshot);
        for recommendation in &recommendations {
            self.bounded(
                "insert_recommendation",
                self.store.insert_recommendation(recommendation),
            )
            .await?;
        }

        info!(recommendations = recommendations.len(), "Recommendations generated");
        Ok(recommendations)
    }
}

/// First `count` sentences of `content`, whitespace collapsed
pub fn summarize(content: &str, count: usize) -> Option<String> {
    let text = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() || count == 0 {
        return None;
    }

    let mut seen = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |(_, next)| *next == ' ') {
            seen += 1;
            if seen == count {
                return Some(text[..=i].to_string());
            }
        }
    }
    Some(text)
}
