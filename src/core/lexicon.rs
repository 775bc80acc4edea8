//! Marker rulesets and their compiled form.
//!
//! A ruleset is a named YAML table of pattern -> category -> weight entries
//! plus the auxiliary tables the extractor and analyzers consult (citations,
//! jurisdiction tokens, topic keywords, legal-language profile, canonical
//! principle statements). Extending the lexicon never touches classifier
//! logic: add rows to a ruleset and load it by name.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ConfigurationError;
use crate::domain::BoundaryType;

/// Ruleset shipped with the engine
pub const DEFAULT_RULESET_YAML: &str = include_str!("../../rulesets/default.yaml");

/// Name of the embedded ruleset
pub const DEFAULT_RULESET_NAME: &str = "default";

/// A complete ruleset definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    /// Ruleset name (used in config and methodology tags)
    pub name: String,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub description: String,

    /// Classification markers
    pub markers: Vec<MarkerRule>,

    /// Citation regexes (case-sensitive)
    #[serde(default)]
    pub citations: Vec<String>,

    #[serde(default)]
    pub jurisdictions: Vec<TokenRule>,

    #[serde(default)]
    pub topics: Vec<TopicRule>,

    /// Legal-language profile (binding, recommendatory, ...)
    #[serde(default)]
    pub language: Vec<TokenRule>,

    #[serde(default)]
    pub principles: Vec<PrincipleRule>,
}

fn default_version() -> u32 {
    1
}

impl Ruleset {
    /// Load a ruleset from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a ruleset from YAML content
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(content).map_err(|source| ConfigurationError::Parse {
            what: "ruleset".to_string(),
            source,
        })
    }

    /// The embedded default ruleset
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_yaml(DEFAULT_RULESET_YAML)
    }

    /// Load a ruleset by name from `dir`, falling back to the embedded default
    pub fn load(name: &str, dir: Option<&Path>) -> Result<Self, ConfigurationError> {
        if let Some(dir) = dir {
            let path = dir.join(format!("{}.yaml", name));
            if path.exists() {
                let ruleset = Self::from_file(&path)?;
                ruleset.validate()?;
                return Ok(ruleset);
            }
        }

        if name == DEFAULT_RULESET_NAME {
            return Self::builtin();
        }

        Err(ConfigurationError::RulesetNotFound(name.to_string()))
    }

    /// List ruleset files (`*.yaml`) in a directory, sorted
    pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, ConfigurationError> {
        let pattern = dir.join("*.yaml");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| ConfigurationError::InvalidValue {
            field: "paths.rulesets".to_string(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        paths.sort();
        Ok(paths)
    }

    /// Validate the ruleset definition
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidRuleset {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("ruleset name cannot be empty".to_string()));
        }

        if self.markers.is_empty() {
            return Err(invalid("ruleset must define at least one marker".to_string()));
        }

        for (i, marker) in self.markers.iter().enumerate() {
            if marker.pattern.trim().is_empty() {
                return Err(invalid(format!("marker {} has an empty pattern", i)));
            }
            if !marker.weight.is_finite() || marker.weight < 0.0 {
                return Err(invalid(format!(
                    "marker '{}' has invalid weight {}",
                    marker.pattern, marker.weight
                )));
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for topic in &self.topics {
            let keyword = normalize_keyword(&topic.keyword);
            if keyword.is_empty() {
                return Err(invalid("topic with an empty keyword".to_string()));
            }
            if !seen.insert(keyword.clone()) {
                return Err(invalid(format!("duplicate topic keyword '{}'", keyword)));
            }
        }

        // compiling surfaces bad regexes
        Lexicon::compile_unchecked(self).map(|_| ())
    }
}

/// One classification marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerRule {
    pub pattern: String,

    pub category: MarkerCategory,

    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Use `pattern` verbatim as a regex
    #[serde(default)]
    pub regex: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// Signal a marker contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerCategory {
    Customary,
    Treaty,
    Ratification,
    JusCogens,
}

/// A named token detected by any of its patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRule {
    #[serde(alias = "name")]
    pub token: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub regex: bool,
}

/// A subject-matter keyword and the boundary category it votes for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRule {
    pub keyword: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub category: Option<BoundaryType>,
    #[serde(default)]
    pub regex: bool,
}

/// Canonical statement for a candidate principle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipleRule {
    pub keyword: String,
    pub statement: String,
}

/// A compiled marker
#[derive(Debug, Clone)]
pub struct CompiledMarker {
    pub pattern: String,
    pub category: MarkerCategory,
    pub weight: f64,
    pub regex: Regex,
}

/// A compiled token (jurisdiction or language class)
#[derive(Debug, Clone)]
pub struct CompiledToken {
    pub token: String,
    pub patterns: Vec<Regex>,
}

/// A compiled topic
#[derive(Debug, Clone)]
pub struct CompiledTopic {
    /// Normalised keyword
    pub keyword: String,
    pub category: Option<BoundaryType>,
    pub patterns: Vec<Regex>,
}

/// A ruleset compiled for matching
#[derive(Debug, Clone)]
pub struct Lexicon {
    pub name: String,
    pub version: u32,
    /// First 16 hex chars of the ruleset's SHA-256
    pub fingerprint: String,
    pub markers: Vec<CompiledMarker>,
    pub citations: Vec<Regex>,
    pub jurisdictions: Vec<CompiledToken>,
    pub topics: Vec<CompiledTopic>,
    pub language: Vec<CompiledToken>,
    /// (normalised keyword, statement)
    pub principles: Vec<(String, String)>,
}

impl Lexicon {
    /// Validate and compile a ruleset
    pub fn compile(ruleset: &Ruleset) -> Result<Self, ConfigurationError> {
        ruleset.validate()?;
        Self::compile_unchecked(ruleset)
    }

    /// Compile the embedded default ruleset
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::compile(&Ruleset::builtin()?)
    }

    fn compile_unchecked(ruleset: &Ruleset) -> Result<Self, ConfigurationError> {
        let compile = |pattern: &str, regex: bool| -> Result<Regex, ConfigurationError> {
            let source = if regex {
                format!("(?i){}", pattern)
            } else {
                literal_pattern(pattern)
            };
            Regex::new(&source).map_err(|e| ConfigurationError::InvalidRuleset {
                name: ruleset.name.clone(),
                reason: format!("pattern '{}': {}", pattern, e),
            })
        };

        let markers = ruleset
            .markers
            .iter()
            .map(|m| {
                Ok(CompiledMarker {
                    pattern: m.pattern.clone(),
                    category: m.category,
                    weight: m.weight,
                    regex: compile(&m.pattern, m.regex)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let citations = ruleset
            .citations
            .iter()
            .map(|c| {
                Regex::new(c).map_err(|e| ConfigurationError::InvalidRuleset {
                    name: ruleset.name.clone(),
                    reason: format!("citation '{}': {}", c, e),
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let compile_tokens = |rules: &[TokenRule]| {
            rules
                .iter()
                .map(|rule| {
                    Ok(CompiledToken {
                        token: rule.token.clone(),
                        patterns: rule
                            .patterns
                            .iter()
                            .map(|p| compile(p, rule.regex))
                            .collect::<Result<Vec<_>, ConfigurationError>>()?,
                    })
                })
                .collect::<Result<Vec<_>, ConfigurationError>>()
        };

        let topics = ruleset
            .topics
            .iter()
            .map(|topic| {
                Ok(CompiledTopic {
                    keyword: normalize_keyword(&topic.keyword),
                    category: topic.category,
                    patterns: topic
                        .patterns
                        .iter()
                        .map(|p| compile(p, topic.regex))
                        .collect::<Result<Vec<_>, ConfigurationError>>()?,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let canonical = serde_json::to_string(ruleset).map_err(|e| ConfigurationError::InvalidRuleset {
            name: ruleset.name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: ruleset.name.clone(),
            version: ruleset.version,
            fingerprint: fingerprint(&canonical),
            markers,
            citations,
            jurisdictions: compile_tokens(&ruleset.jurisdictions)?,
            topics,
            language: compile_tokens(&ruleset.language)?,
            principles: ruleset
                .principles
                .iter()
                .map(|p| (normalize_keyword(&p.keyword), p.statement.clone()))
                .collect(),
        })
    }

    /// Methodology tag recorded on every analysis produced with this lexicon
    pub fn methodology(&self) -> String {
        format!("{}@v{}#{}", self.name, self.version, self.fingerprint)
    }

    /// Boundary category a (normalised) keyword votes for, if any
    pub fn topic_category(&self, keyword: &str) -> Option<BoundaryType> {
        self.topics
            .iter()
            .filter(|t| keyword_matches(keyword, &t.keyword))
            .find_map(|t| t.category)
    }

    /// Canonical statement for a (normalised) keyword, if any
    pub fn principle_for(&self, keyword: &str) -> Option<&str> {
        self.principles
            .iter()
            .find(|(k, _)| keyword_matches(keyword, k))
            .map(|(_, statement)| statement.as_str())
    }
}

/// Build a case-insensitive regex from a literal phrase
///
/// Word boundaries are only anchored on alphanumeric ends, and whitespace
/// inside the phrase matches any whitespace run.
fn literal_pattern(phrase: &str) -> String {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    let body = words.join(r"\s+");
    let trimmed = phrase.trim();

    let starts_word = trimmed.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = trimmed.chars().last().is_some_and(char::is_alphanumeric);

    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        body,
        if ends_word { r"\b" } else { "" }
    )
}

/// Normalise a keyword: lower-case, separators collapsed to single `-`
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Whether a normalised keyword contains `term` as a run of whole segments
///
/// `launch-liability` matches `liability`; `reliability` does not.
pub fn keyword_matches(keyword: &str, term: &str) -> bool {
    if keyword == term {
        return true;
    }
    let segments: Vec<&str> = keyword.split('-').collect();
    let needle: Vec<&str> = term.split('-').collect();
    !needle.is_empty()
        && needle.len() <= segments.len()
        && segments.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Hash content (first 16 hex chars of SHA256)
pub fn fingerprint(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_RULESET_YAML: &str = r#"
name: test
version: 2
markers:
  - pattern: state practice
    category: customary
  - pattern: "ratif(?:ied|ication)"
    category: ratification
    regex: true
    weight: 0.5
topics:
  - keyword: Orbital Debris
    category: liability
    patterns: ["orbital debris"]
"#;

    #[test]
    fn test_builtin_ruleset_compiles() {
        let lexicon = Lexicon::builtin().unwrap();
        assert_eq!(lexicon.name, DEFAULT_RULESET_NAME);
        assert!(lexicon.markers.iter().any(|m| m.category == MarkerCategory::Customary));
        assert!(lexicon.markers.iter().any(|m| m.category == MarkerCategory::Treaty));
        assert_eq!(lexicon.topic_category("liability"), Some(BoundaryType::Liability));
        assert_eq!(lexicon.topic_category("orbital-debris"), Some(BoundaryType::Liability));
    }

    #[test]
    fn test_ruleset_parsing() {
        let ruleset = Ruleset::from_yaml(TEST_RULESET_YAML).unwrap();
        assert_eq!(ruleset.name, "test");
        assert_eq!(ruleset.version, 2);
        assert_eq!(ruleset.markers[0].weight, 1.0);
        assert_eq!(ruleset.markers[1].weight, 0.5);
        assert!(ruleset.validate().is_ok());

        let lexicon = Lexicon::compile(&ruleset).unwrap();
        assert_eq!(lexicon.topics[0].keyword, "orbital-debris");
        assert!(lexicon.methodology().starts_with("test@v2#"));
    }

    #[test]
    fn test_invalid_rulesets_are_rejected() {
        let mut ruleset = Ruleset::from_yaml(TEST_RULESET_YAML).unwrap();
        ruleset.markers[0].weight = -1.0;
        assert!(matches!(
            ruleset.validate(),
            Err(ConfigurationError::InvalidRuleset { .. })
        ));

        let mut ruleset = Ruleset::from_yaml(TEST_RULESET_YAML).unwrap();
        ruleset.markers[1].pattern = "ratif(".to_string();
        assert!(ruleset.validate().is_err());

        let mut ruleset = Ruleset::from_yaml(TEST_RULESET_YAML).unwrap();
        ruleset.topics.push(ruleset.topics[0].clone());
        assert!(ruleset.validate().is_err());
    }

    #[test]
    fn test_literal_patterns_respect_word_boundaries() {
        let re = Regex::new(&literal_pattern("state practice")).unwrap();
        assert!(re.is_match("consistent State\n  Practice of nations"));
        assert!(!re.is_match("interstate practices"));

        let re = Regex::new(&literal_pattern("u.s.")).unwrap();
        assert!(re.is_match("under U.S. law"));
    }

    #[test]
    fn test_keyword_normalization_and_matching() {
        assert_eq!(normalize_keyword("  Orbital  Debris "), "orbital-debris");
        assert_eq!(normalize_keyword("orbital_debris"), "orbital-debris");
        assert!(keyword_matches("launch-liability", "liability"));
        assert!(keyword_matches("orbital-debris-removal", "orbital-debris"));
        assert!(!keyword_matches("reliability", "liability"));
    }

    #[test]
    fn test_fingerprint_consistency() {
        assert_eq!(fingerprint("a"), fingerprint("a"));
        assert_ne!(fingerprint("a"), fingerprint("b"));
        assert_eq!(fingerprint("a").len(), 16);
    }

    #[test]
    fn test_load_unknown_ruleset_fails() {
        assert!(matches!(
            Ruleset::load("missing", None),
            Err(ConfigurationError::RulesetNotFound(_))
        ));
        assert_eq!(Ruleset::load("default", None).unwrap().name, "default");
    }
}
