//! Configuration management.
//!
//! Values are layered in increasing precedence: defaults, an optional TOML
//! file, then `ENTITYIDENTITY_*` environment variables.

mod sections;

pub use sections::{
    BlockingConfig, DEFAULT_CONTEXT_BOOST, DEFAULT_EXTERNAL_ID_BOOST, DEFAULT_HIGH_CONFIDENCE,
    DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_TOTAL_BOOST, DEFAULT_MIN_GAP, DEFAULT_MIN_VIABLE,
    DEFAULT_PREFIX_LEN, DEFAULT_TIE_BREAK_TIMEOUT_MS, DecisionConfig, ScoringConfig,
    TieBreakConfig,
};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming the canonical table directory.
pub const DATA_DIR_ENV: &str = "ENTITYIDENTITY_DATA_DIR";

/// Default number of ranked candidates returned with a resolution.
pub const DEFAULT_TOP_K: usize = 5;

/// Main configuration for the resolution engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Blocking parameters.
    pub blocking: BlockingConfig,
    /// Scoring boosts.
    pub scoring: ScoringConfig,
    /// Decision thresholds.
    pub decision: DecisionConfig,
    /// External tie-break settings.
    pub tie_break: TieBreakConfig,
    /// Number of ranked candidates returned with a resolution.
    pub top_k: usize,
    /// Directory holding canonical tables, if pinned.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blocking: BlockingConfig::default(),
            scoring: ScoringConfig::default(),
            decision: DecisionConfig::default(),
            tie_break: TieBreakConfig::default(),
            top_k: DEFAULT_TOP_K,
            data_dir: None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Number of ranked candidates.
    pub top_k: Option<usize>,
    /// Blocking section.
    pub blocking: Option<ConfigFileBlocking>,
    /// Scoring section.
    pub scoring: Option<ConfigFileScoring>,
    /// Decision section.
    pub decision: Option<ConfigFileDecision>,
    /// Tie-break section.
    pub tie_break: Option<ConfigFileTieBreak>,
}

/// Blocking section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileBlocking {
    /// Prefix length.
    pub prefix_len: Option<usize>,
    /// Candidate cap.
    pub max_candidates: Option<usize>,
}

/// Scoring section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScoring {
    /// Context boost.
    pub context_boost: Option<f64>,
    /// External identifier boost.
    pub external_id_boost: Option<f64>,
    /// Combined boost cap.
    pub max_total_boost: Option<f64>,
}

/// Decision section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDecision {
    /// High-confidence threshold.
    pub high_confidence: Option<f64>,
    /// Minimum gap.
    pub min_gap: Option<f64>,
    /// Minimum viable score.
    pub min_viable: Option<f64>,
}

/// Tie-break section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTieBreak {
    /// Whether tie-breaking is enabled.
    pub enabled: Option<bool>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or the resulting
    /// configuration is invalid.
    pub fn from_toml_str(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        let config = Self::from_config_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the
    /// configuration is invalid.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from the default location, then applies
    /// environment overrides.
    ///
    /// Checks the platform config dir (`<config>/entityidentity/config.toml`).
    /// Falls back to defaults if the file is absent or unreadable, or if the
    /// overrides leave the configuration invalid.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = directories::ProjectDirs::from("", "", "entityidentity")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            });
        from_file
            .unwrap_or_default()
            .with_env_overrides()
            .or_default_if_invalid()
    }

    /// Returns `self` if it validates, otherwise the defaults.
    #[must_use]
    pub fn or_default_if_invalid(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid configuration, using defaults");
                Self::default()
            },
        }
    }

    /// Converts a `ConfigFile` to `EngineConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = Some(PathBuf::from(data_dir));
        }
        if let Some(top_k) = file.top_k {
            config.top_k = top_k.max(1);
        }
        if let Some(blocking) = file.blocking {
            if let Some(v) = blocking.prefix_len {
                config.blocking.prefix_len = v;
            }
            if let Some(v) = blocking.max_candidates {
                config.blocking.max_candidates = v;
            }
        }
        if let Some(scoring) = file.scoring {
            if let Some(v) = scoring.context_boost {
                config.scoring.context_boost = v;
            }
            if let Some(v) = scoring.external_id_boost {
                config.scoring.external_id_boost = v;
            }
            if let Some(v) = scoring.max_total_boost {
                config.scoring.max_total_boost = v;
            }
        }
        if let Some(decision) = file.decision {
            if let Some(v) = decision.high_confidence {
                config.decision.high_confidence = v;
            }
            if let Some(v) = decision.min_gap {
                config.decision.min_gap = v;
            }
            if let Some(v) = decision.min_viable {
                config.decision.min_viable = v;
            }
        }
        if let Some(tie_break) = file.tie_break {
            if let Some(v) = tie_break.enabled {
                config.tie_break.enabled = v;
            }
            if let Some(v) = tie_break.timeout_ms {
                config.tie_break.timeout_ms = v;
            }
        }

        config
    }

    /// Applies environment variable overrides.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `ENTITYIDENTITY_DATA_DIR` | `data_dir` |
    /// | `ENTITYIDENTITY_TOP_K` | `top_k` |
    /// | `ENTITYIDENTITY_PREFIX_LEN` | `blocking.prefix_len` |
    /// | `ENTITYIDENTITY_MAX_CANDIDATES` | `blocking.max_candidates` |
    /// | `ENTITYIDENTITY_HIGH_CONFIDENCE` | `decision.high_confidence` |
    /// | `ENTITYIDENTITY_MIN_GAP` | `decision.min_gap` |
    /// | `ENTITYIDENTITY_MIN_VIABLE` | `decision.min_viable` |
    /// | `ENTITYIDENTITY_TIE_BREAK_ENABLED` | `tie_break.enabled` |
    /// | `ENTITYIDENTITY_TIE_BREAK_TIMEOUT_MS` | `tie_break.timeout_ms` |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var(DATA_DIR_ENV) {
            if !v.trim().is_empty() {
                self.data_dir = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = env_parse::<usize>("ENTITYIDENTITY_TOP_K") {
            self.top_k = v.max(1);
        }
        if let Some(v) = env_parse("ENTITYIDENTITY_PREFIX_LEN") {
            self.blocking.prefix_len = v;
        }
        if let Some(v) = env_parse("ENTITYIDENTITY_MAX_CANDIDATES") {
            self.blocking.max_candidates = v;
        }
        if let Some(v) = env_parse("ENTITYIDENTITY_HIGH_CONFIDENCE") {
            self.decision.high_confidence = v;
        }
        if let Some(v) = env_parse("ENTITYIDENTITY_MIN_GAP") {
            self.decision.min_gap = v;
        }
        if let Some(v) = env_parse("ENTITYIDENTITY_MIN_VIABLE") {
            self.decision.min_viable = v;
        }
        if let Ok(v) = std::env::var("ENTITYIDENTITY_TIE_BREAK_ENABLED") {
            self.tie_break.enabled = v.to_lowercase() != "false" && v != "0";
        }
        if let Some(v) = env_parse("ENTITYIDENTITY_TIE_BREAK_TIMEOUT_MS") {
            self.tie_break.timeout_ms = v;
        }
        self
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] describing the first invalid value.
    pub fn validate(&self) -> crate::Result<()> {
        self.blocking.validate()?;
        self.scoring.validate()?;
        self.decision.validate()?;
        if self.top_k == 0 {
            return Err(crate::Error::InvalidInput(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the decision thresholds.
    #[must_use]
    pub const fn with_decision(mut self, decision: DecisionConfig) -> Self {
        self.decision = decision;
        self
    }

    /// Sets the blocking parameters.
    #[must_use]
    pub const fn with_blocking(mut self, blocking: BlockingConfig) -> Self {
        self.blocking = blocking;
        self
    }

    /// Sets the scoring boosts.
    #[must_use]
    pub const fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Sets the tie-break settings.
    #[must_use]
    pub const fn with_tie_break(mut self, tie_break: TieBreakConfig) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Sets the number of ranked candidates returned.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 5);
        assert_eq!(config.blocking.prefix_len, 3);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/entities"
            top_k = 10

            [decision]
            high_confidence = 92.0

            [blocking]
            max_candidates = 100

            [tie_break]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/entities")));
        assert_eq!(config.top_k, 10);
        assert!((config.decision.high_confidence - 92.0).abs() < f64::EPSILON);
        assert!((config.decision.min_viable - DEFAULT_MIN_VIABLE).abs() < f64::EPSILON);
        assert_eq!(config.blocking.max_candidates, 100);
        assert_eq!(config.blocking.prefix_len, DEFAULT_PREFIX_LEN);
        assert!(!config.tie_break.enabled);
    }

    #[test]
    fn test_from_toml_rejects_invalid_thresholds() {
        let result = EngineConfig::from_toml_str(
            r"
            [decision]
            high_confidence = 70.0
            min_viable = 80.0
            ",
        );
        assert!(matches!(result, Err(crate::Error::InvalidInput(_))));
    }

    #[test]
    fn test_inverted_bands_fall_back_to_defaults() {
        let inverted = EngineConfig::default()
            .with_top_k(3)
            .with_decision(DecisionConfig::default().with_min_viable(95.0));
        assert!(inverted.validate().is_err());
        assert_eq!(inverted.or_default_if_invalid(), EngineConfig::default());

        let valid = EngineConfig::default().with_top_k(3);
        assert_eq!(valid.clone().or_default_if_invalid(), valid);
    }

    #[test]
    fn test_from_toml_rejects_malformed_text() {
        let result = EngineConfig::from_toml_str("top_k = [");
        assert!(matches!(result, Err(crate::Error::OperationFailed { .. })));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = EngineConfig::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scoring]\ncontext_boost = 1.5\n").unwrap();
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert!((config.scoring.context_boost - 1.5).abs() < f64::EPSILON);
    }
}
