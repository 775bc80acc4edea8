//! Configuration for the analysis engine.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SPACELAW_HOME, SPACELAW_DB, SPACELAW_RULESET)
//! 2. Config file (.spacelaw/config.yaml)
//! 3. Defaults (~/.spacelaw)
//!
//! Config file discovery:
//! - Searches current directory and parents for .spacelaw/config.yaml
//! - `paths.home` is relative to the .spacelaw/ directory, other paths to
//!   the project root (the parent of .spacelaw/)

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::boundary::BoundarySettings;
use crate::core::classifier::ClassifierSettings;
use crate::core::features::ExtractionSettings;
use crate::core::lexicon::DEFAULT_RULESET_NAME;
use crate::core::limits::EngineLimits;
use crate::core::recommend::RecommendationSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Invalid settings or rulesets; fatal at engine construction
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("invalid ruleset '{name}': {reason}")]
    InvalidRuleset { name: String, reason: String },

    #[error("ruleset not found: {0}")]
    RulesetNotFound(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .spacelaw/)
    pub home: Option<String>,
    /// SQLite database file (relative to project root)
    pub database: Option<String>,
    /// Directory of named rulesets (relative to project root)
    pub rulesets: Option<String>,
}

/// Every tunable of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Name of the marker ruleset to load
    #[serde(default = "default_ruleset")]
    pub ruleset: String,

    #[serde(default)]
    pub extraction: ExtractionSettings,

    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub boundaries: BoundarySettings,

    #[serde(default)]
    pub recommendations: RecommendationSettings,

    #[serde(default)]
    pub limits: EngineLimits,
}

fn default_ruleset() -> String {
    DEFAULT_RULESET_NAME.to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ruleset: default_ruleset(),
            extraction: ExtractionSettings::default(),
            classifier: ClassifierSettings::default(),
            boundaries: BoundarySettings::default(),
            recommendations: RecommendationSettings::default(),
            limits: EngineLimits::default(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, format!("must be a finite value >= 0, got {}", value)));
    }
    Ok(())
}

fn check_unit(field: &str, value: f64) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("must be within [0, 1], got {}", value)));
    }
    Ok(())
}

fn check_positive(field: &str, value: u64) -> Result<(), ConfigurationError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than 0"));
    }
    Ok(())
}

impl EngineSettings {
    /// Reject thresholds and weights the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.ruleset.trim().is_empty() {
            return Err(invalid("engine.ruleset", "cannot be empty"));
        }

        check_positive(
            "extraction.length_unit_words",
            u64::from(self.extraction.length_unit_words),
        )?;

        let c = &self.classifier;
        check_non_negative("classifier.min_signal", c.min_signal)?;
        check_non_negative("classifier.closeness", c.closeness)?;
        check_non_negative("classifier.customary_weight", c.customary_weight)?;
        check_non_negative("classifier.treaty_weight", c.treaty_weight)?;
        check_non_negative("classifier.ratification_weight", c.ratification_weight)?;
        check_unit("classifier.refine_confidence", c.refine_confidence)?;

        check_unit("boundaries.conflict_threshold", self.boundaries.conflict_threshold)?;

        let r = &self.recommendations;
        check_positive("recommendations.min_jurisdictions", r.min_jurisdictions as u64)?;
        check_unit("recommendations.high_conflict_confidence", r.high_conflict_confidence)?;
        check_unit("recommendations.dissent_threshold", r.dissent_threshold)?;
        check_non_negative("recommendations.smoothing", r.smoothing)?;
        if r.dissent_threshold > self.boundaries.conflict_threshold {
            return Err(invalid(
                "recommendations.dissent_threshold",
                format!(
                    "must not exceed boundaries.conflict_threshold ({} > {})",
                    r.dissent_threshold, self.boundaries.conflict_threshold
                ),
            ));
        }

        let l = &self.limits;
        check_positive("limits.max_concurrency", l.max_concurrency as u64)?;
        check_positive("limits.write_timeout_ms", l.write_timeout_ms)?;
        check_positive("limits.max_content_bytes", l.max_content_bytes)?;
        check_positive("limits.max_batch_size", l.max_batch_size as u64)?;

        Ok(())
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory (batch logs, default database)
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Directory searched for named rulesets
    pub rulesets_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub engine: EngineSettings,
}

/// Values taken from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub ruleset: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var("SPACELAW_HOME").ok().map(PathBuf::from),
            database: std::env::var("SPACELAW_DB").ok().map(PathBuf::from),
            ruleset: std::env::var("SPACELAW_RULESET").ok(),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(paths::CONFIG_DIR).join(paths::CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine defaults, an optional config file, and environment overrides
fn resolve(
    default_home: PathBuf,
    file: Option<(PathBuf, ConfigFile)>,
    env: &EnvOverrides,
) -> Result<ResolvedConfig> {
    let (config_file, paths_config, mut engine, config_dir, base_dir) = match file {
        Some((path, config)) => {
            // .spacelaw/ and the project root above it
            let config_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            let base_dir = config_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            (Some(path), config.paths, config.engine, config_dir, base_dir)
        }
        None => (
            None,
            PathsConfig::default(),
            EngineSettings::default(),
            PathBuf::from("."),
            PathBuf::from("."),
        ),
    };

    let home = match (&env.home, &paths_config.home) {
        (Some(env_home), _) => env_home.clone(),
        (None, Some(home)) => resolve_path(&config_dir, home),
        (None, None) => default_home,
    };

    let database = match (&env.database, &paths_config.database) {
        (Some(env_db), _) => env_db.clone(),
        (None, Some(db)) => resolve_path(&base_dir, db),
        (None, None) => paths::database_path(&home),
    };

    let rulesets_dir = match &paths_config.rulesets {
        Some(dir) => resolve_path(&base_dir, dir),
        None => paths::rulesets_dir(&home),
    };

    if let Some(ruleset) = &env.ruleset {
        engine.ruleset = ruleset.clone();
    }

    engine
        .validate()
        .context("Invalid engine settings in configuration")?;

    Ok(ResolvedConfig {
        home,
        database,
        rulesets_dir,
        config_file,
        engine,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(paths::CONFIG_DIR);

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let file = match find_config_file(&cwd) {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    resolve(default_home, file, &EnvOverrides::from_env())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the state directory
pub fn spacelaw_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the database path
pub fn database_path() -> Result<PathBuf> {
    Ok(config()?.database.clone())
}

/// Get the batch log directory ($SPACELAW_HOME/batches)
pub fn batches_dir() -> Result<PathBuf> {
    Ok(paths::batches_dir(&config()?.home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let home = PathBuf::from("/home/user/.spacelaw");
        let config = resolve(home.clone(), None, &EnvOverrides::default()).unwrap();

        assert_eq!(config.home, home);
        assert_eq!(config.database, home.join("space_law.db"));
        assert_eq!(config.rulesets_dir, home.join("rulesets"));
        assert_eq!(config.engine, EngineSettings::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".spacelaw");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  database: data/space_law.db
engine:
  ruleset: strict
  classifier:
    min_signal: 0.2
  boundaries:
    conflict_threshold: 0.6
  limits:
    max_concurrency: 8
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.engine.ruleset, "strict");
        assert_eq!(parsed.engine.classifier.min_signal, 0.2);
        // unset fields keep their defaults
        assert_eq!(parsed.engine.classifier.closeness, 0.15);
        assert_eq!(parsed.engine.limits.max_concurrency, 8);
        assert_eq!(parsed.engine.limits.write_timeout_ms, 5000);

        let config = resolve(
            PathBuf::from("/unused"),
            Some((config_path.clone(), parsed)),
            &EnvOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(config.database, temp.path().join("data/space_law.db"));
        assert_eq!(config.engine.boundaries.conflict_threshold, 0.6);
    }

    #[test]
    fn test_env_overrides_win() {
        let env = EnvOverrides {
            home: Some(PathBuf::from("/srv/spacelaw")),
            database: Some(PathBuf::from("/srv/db.sqlite")),
            ruleset: Some("custom".to_string()),
        };
        let config = resolve(PathBuf::from("/home/user/.spacelaw"), None, &env).unwrap();
        assert_eq!(config.home, PathBuf::from("/srv/spacelaw"));
        assert_eq!(config.database, PathBuf::from("/srv/db.sqlite"));
        assert_eq!(config.rulesets_dir, PathBuf::from("/srv/spacelaw/rulesets"));
        assert_eq!(config.engine.ruleset, "custom");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EngineSettings::default().validate().is_ok());

        let mut settings = EngineSettings::default();
        settings.boundaries.conflict_threshold = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(ConfigurationError::InvalidValue { field, .. }) if field == "boundaries.conflict_threshold"
        ));

        let mut settings = EngineSettings::default();
        settings.classifier.treaty_weight = -1.0;
        assert!(settings.validate().is_err());

        let mut settings = EngineSettings::default();
        settings.classifier.min_signal = f64::NAN;
        assert!(settings.validate().is_err());

        let mut settings = EngineSettings::default();
        settings.limits.max_concurrency = 0;
        assert!(settings.validate().is_err());

        let mut settings = EngineSettings::default();
        settings.recommendations.dissent_threshold = 0.7;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
