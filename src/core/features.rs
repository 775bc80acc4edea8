//! Feature extraction over raw document text.
//!
//! Runs the compiled lexicon over a document's title and content and produces
//! a fixed-shape [`FeatureRecord`]. Extraction is pure: the same text and the
//! same lexicon always yield the same record.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::lexicon::{Lexicon, MarkerCategory};
use crate::domain::Document;

/// Extraction fails only on content that carries no text to scan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("document content is empty")]
    EmptyContent,

    #[error("document content is unreadable: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Words per unit of `normalized_length` (default: 100)
    #[serde(default = "default_length_unit_words")]
    pub length_unit_words: u32,
}

fn default_length_unit_words() -> u32 {
    100
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            length_unit_words: default_length_unit_words(),
        }
    }
}

/// Per-category weighted marker sums
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedSignals {
    pub customary: f64,
    pub treaty: f64,
    pub ratification: f64,
    pub jus_cogens: f64,
}

/// Structured signals derived from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub treaty_markers: u32,
    pub customary_markers: u32,
    pub ratification_markers: u32,
    pub jus_cogens_markers: u32,
    pub jurisdiction_tokens: BTreeSet<String>,
    pub citation_count: u32,
    /// Document length in units of `length_unit_words`, never below 1
    pub normalized_length: u32,
    pub weighted: WeightedSignals,
    /// Topic keywords found in the text (normalised)
    pub topic_keywords: BTreeSet<String>,
    pub cited_instruments: BTreeSet<String>,
    /// Hits per legal-language class
    pub language_profile: BTreeMap<String, u32>,
}

/// Derives [`FeatureRecord`]s using a compiled lexicon
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    lexicon: Arc<Lexicon>,
    length_unit_words: u32,
}

impl FeatureExtractor {
    pub fn new(lexicon: Arc<Lexicon>, settings: &ExtractionSettings) -> Self {
        Self {
            lexicon,
            length_unit_words: settings.length_unit_words.max(1),
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Extract features from a stored document
    pub fn extract_document(&self, document: &Document) -> Result<FeatureRecord, ExtractionError> {
        self.extract(&document.title, &document.content)
    }

    /// Extract features from a title and body
    ///
    /// Only the body is checked for emptiness; the title is scanned with it.
    pub fn extract(&self, title: &str, content: &str) -> Result<FeatureRecord, ExtractionError> {
        check_readable(content)?;

        let text = if title.trim().is_empty() {
            content.to_string()
        } else {
            format!("{}\n{}", title, content)
        };

        let mut record = FeatureRecord::default();

        for marker in &self.lexicon.markers {
            let hits = marker.regex.find_iter(&text).count() as u32;
            if hits == 0 {
                continue;
            }
            let weighted = f64::from(hits) * marker.weight;
            match marker.category {
                MarkerCategory::Customary => {
                    record.customary_markers += hits;
                    record.weighted.customary += weighted;
                }
                MarkerCategory::Treaty => {
                    record.treaty_markers += hits;
                    record.weighted.treaty += weighted;
                }
                MarkerCategory::Ratification => {
                    record.ratification_markers += hits;
                    record.weighted.ratification += weighted;
                }
                MarkerCategory::JusCogens => {
                    record.jus_cogens_markers += hits;
                    record.weighted.jus_cogens += weighted;
                }
            }
        }

        for citation in &self.lexicon.citations {
            for found in citation.find_iter(&text) {
                record.citation_count += 1;
                record
                    .cited_instruments
                    .insert(collapse_whitespace(found.as_str()));
            }
        }

        for token in &self.lexicon.jurisdictions {
            if token.patterns.iter().any(|p| p.is_match(&text)) {
                record.jurisdiction_tokens.insert(token.token.clone());
            }
        }

        for topic in &self.lexicon.topics {
            if topic.patterns.iter().any(|p| p.is_match(&text)) {
                record.topic_keywords.insert(topic.keyword.clone());
            }
        }

        for class in &self.lexicon.language {
            let hits: usize = class.patterns.iter().map(|p| p.find_iter(&text).count()).sum();
            if hits > 0 {
                record.language_profile.insert(class.token.clone(), hits as u32);
            }
        }

        let words = content.split_whitespace().count() as u32;
        record.normalized_length = words.div_ceil(self.length_unit_words).max(1);

        Ok(record)
    }
}

fn check_readable(content: &str) -> Result<(), ExtractionError> {
    if content.trim().is_empty() {
        return Err(ExtractionError::EmptyContent);
    }

    if !content.chars().any(char::is_alphabetic) {
        return Err(ExtractionError::Unreadable(
            "no alphabetic characters".to_string(),
        ));
    }

    let total = content.chars().count();
    let garbage = content
        .chars()
        .filter(|c| (c.is_control() && !c.is_whitespace()) || *c == char::REPLACEMENT_CHARACTER)
        .count();
    if garbage * 2 > total {
        return Err(ExtractionError::Unreadable(format!(
            "{} of {} characters are control or replacement characters",
            garbage, total
        )));
    }

    Ok(())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(Arc::new(Lexicon::builtin().unwrap()), &ExtractionSettings::default())
    }

    #[test]
    fn test_marker_counts() {
        let record = extractor()
            .extract(
                "Outer Space Treaty",
                "The States Parties agree that the treaty, once ratified, binds each signatory. \
                 State practice and opinio juris confirm this.",
            )
            .unwrap();

        // "treaty" twice, "states parties", "parties agree", "signatory"
        assert_eq!(record.treaty_markers, 5);
        assert_eq!(record.ratification_markers, 1);
        assert_eq!(record.customary_markers, 2);
        assert_eq!(record.normalized_length, 1);
        assert_eq!(record.weighted.treaty, 5.0);
    }

    #[test]
    fn test_tokens_topics_and_citations() {
        let record = extractor()
            .extract(
                "",
                "Under Article VI of the Outer Space Treaty, the United States and the Russian \
                 Federation shall bear liability for orbital debris. See 610 U.N.T.S. 205.",
            )
            .unwrap();

        assert!(record.jurisdiction_tokens.contains("us"));
        assert!(record.jurisdiction_tokens.contains("russia"));
        assert!(record.topic_keywords.contains("orbital-debris"));
        assert!(record.topic_keywords.contains("liability"));
        assert!(record.citation_count >= 3);
        assert!(record.cited_instruments.contains("Article VI"));
        assert_eq!(record.language_profile.get("binding"), Some(&1));
    }

    #[test]
    fn test_plain_text_degrades_to_zero() {
        let record = extractor()
            .extract("Weather", "It rained all afternoon in the valley.")
            .unwrap();
        assert_eq!(record.treaty_markers, 0);
        assert_eq!(record.customary_markers, 0);
        assert_eq!(record.citation_count, 0);
        assert!(record.jurisdiction_tokens.is_empty());
    }

    #[test]
    fn test_normalized_length() {
        let content = "word ".repeat(250);
        let record = extractor().extract("", &content).unwrap();
        assert_eq!(record.normalized_length, 3);

        let settings = ExtractionSettings { length_unit_words: 50 };
        let extractor = FeatureExtractor::new(Arc::new(Lexicon::builtin().unwrap()), &settings);
        let record = extractor.extract("", &content).unwrap();
        assert_eq!(record.normalized_length, 5);
    }

    #[test]
    fn test_empty_and_unreadable_content() {
        let extractor = extractor();
        assert_eq!(
            extractor.extract("A title", "   \n\t"),
            Err(ExtractionError::EmptyContent)
        );
        assert!(matches!(
            extractor.extract("", "12345 !!! 678"),
            Err(ExtractionError::Unreadable(_))
        ));
        let garbled = format!("a{}", "\u{FFFD}".repeat(10));
        assert!(matches!(
            extractor.extract("", &garbled),
            Err(ExtractionError::Unreadable(_))
        ));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = extractor();
        let text = "Customary international law and the Liability Convention.";
        assert_eq!(extractor.extract("t", text), extractor.extract("t", text));
    }
}
