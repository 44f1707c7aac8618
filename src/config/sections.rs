//! Tunable sections of the engine configuration.
//!
//! Every threshold, gap and boost the engine uses lives here with a named
//! default, so behaviour is reproducible and tunable per deployment.

use crate::{Error, Result};
use std::time::Duration;

/// Default high-confidence threshold.
pub const DEFAULT_HIGH_CONFIDENCE: f64 = 88.0;
/// Default minimum gap between the first and second candidate.
pub const DEFAULT_MIN_GAP: f64 = 6.0;
/// Default minimum viable score (lower edge of the ambiguous band).
pub const DEFAULT_MIN_VIABLE: f64 = 76.0;
/// Default number of normalized prefix characters used for blocking.
pub const DEFAULT_PREFIX_LEN: usize = 3;
/// Default cap on the blocked candidate set.
pub const DEFAULT_MAX_CANDIDATES: usize = 5_000;
/// Default boost when a hint agrees with a candidate's context.
pub const DEFAULT_CONTEXT_BOOST: f64 = 2.0;
/// Default boost when a candidate carries a strong external identifier.
pub const DEFAULT_EXTERNAL_ID_BOOST: f64 = 1.0;
/// Default cap on the sum of all boosts.
pub const DEFAULT_MAX_TOTAL_BOOST: f64 = 3.0;
/// Default tie-break timeout in milliseconds.
pub const DEFAULT_TIE_BREAK_TIMEOUT_MS: u64 = 2_000;

/// Decision thresholds.
///
/// # Environment Variables
///
/// | Variable | Type | Default |
/// |----------|------|---------|
/// | `ENTITYIDENTITY_HIGH_CONFIDENCE` | f64 | `88.0` |
/// | `ENTITYIDENTITY_MIN_GAP` | f64 | `6.0` |
/// | `ENTITYIDENTITY_MIN_VIABLE` | f64 | `76.0` |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionConfig {
    /// Top score at or above which a match may be accepted.
    pub high_confidence: f64,
    /// Required gap between the first and second candidate.
    pub min_gap: f64,
    /// Top score below which the result is `no_match`.
    pub min_viable: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            high_confidence: DEFAULT_HIGH_CONFIDENCE,
            min_gap: DEFAULT_MIN_GAP,
            min_viable: DEFAULT_MIN_VIABLE,
        }
    }
}

impl DecisionConfig {
    /// Builder method to set the high-confidence threshold.
    #[must_use]
    pub const fn with_high_confidence(mut self, value: f64) -> Self {
        self.high_confidence = value;
        self
    }

    /// Builder method to set the minimum gap.
    #[must_use]
    pub const fn with_min_gap(mut self, value: f64) -> Self {
        self.min_gap = value;
        self
    }

    /// Builder method to set the minimum viable score.
    #[must_use]
    pub const fn with_min_viable(mut self, value: f64) -> Self {
        self.min_viable = value;
        self
    }

    /// Returns a copy with the high-confidence threshold overridden.
    ///
    /// `min_viable` is lowered to the override when it would exceed it.
    #[must_use]
    pub fn with_threshold_override(self, threshold: Option<f64>) -> Self {
        let Some(threshold) = threshold else {
            return self;
        };
        let threshold = threshold.clamp(0.0, 100.0);
        Self {
            high_confidence: threshold,
            min_viable: self.min_viable.min(threshold),
            ..self
        }
    }

    /// Validates the thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a value is outside `[0, 100]` or
    /// `min_viable` exceeds `high_confidence`.
    pub fn validate(&self) -> Result<()> {
        check_score("high_confidence", self.high_confidence)?;
        check_score("min_gap", self.min_gap)?;
        check_score("min_viable", self.min_viable)?;
        if self.min_viable > self.high_confidence {
            return Err(Error::InvalidInput(format!(
                "min_viable ({}) exceeds high_confidence ({})",
                self.min_viable, self.high_confidence
            )));
        }
        Ok(())
    }
}

/// Blocking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingConfig {
    /// Number of leading normalized characters shared with the query.
    pub prefix_len: usize,
    /// Cap on the candidate set; larger sets are truncated deterministically.
    pub max_candidates: usize,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            prefix_len: DEFAULT_PREFIX_LEN,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl BlockingConfig {
    /// Builder method to set the prefix length.
    #[must_use]
    pub const fn with_prefix_len(mut self, len: usize) -> Self {
        self.prefix_len = len;
        self
    }

    /// Builder method to set the candidate cap.
    #[must_use]
    pub const fn with_max_candidates(mut self, cap: usize) -> Self {
        self.max_candidates = cap;
        self
    }

    /// Validates the blocking parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the prefix length or cap is zero.
    pub fn validate(&self) -> Result<()> {
        if self.prefix_len == 0 {
            return Err(Error::InvalidInput("prefix_len must be at least 1".to_string()));
        }
        if self.max_candidates == 0 {
            return Err(Error::InvalidInput(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scoring boosts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Boost when any hint agrees with the candidate's context fields.
    pub context_boost: f64,
    /// Boost when the candidate carries a strong external identifier.
    pub external_id_boost: f64,
    /// Cap on the combined boost.
    pub max_total_boost: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            context_boost: DEFAULT_CONTEXT_BOOST,
            external_id_boost: DEFAULT_EXTERNAL_ID_BOOST,
            max_total_boost: DEFAULT_MAX_TOTAL_BOOST,
        }
    }
}

impl ScoringConfig {
    /// Builder method to set the context boost.
    #[must_use]
    pub const fn with_context_boost(mut self, value: f64) -> Self {
        self.context_boost = value;
        self
    }

    /// Builder method to set the external identifier boost.
    #[must_use]
    pub const fn with_external_id_boost(mut self, value: f64) -> Self {
        self.external_id_boost = value;
        self
    }

    /// Builder method to set the combined boost cap.
    #[must_use]
    pub const fn with_max_total_boost(mut self, value: f64) -> Self {
        self.max_total_boost = value;
        self
    }

    /// Validates the boosts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a boost is negative or above 100.
    pub fn validate(&self) -> Result<()> {
        check_score("context_boost", self.context_boost)?;
        check_score("external_id_boost", self.external_id_boost)?;
        check_score("max_total_boost", self.max_total_boost)
    }
}

/// External tie-break settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieBreakConfig {
    /// Whether a configured tie-breaker is consulted for ambiguous results.
    pub enabled: bool,
    /// Upper bound on a single tie-break call.
    pub timeout_ms: u64,
}

impl Default for TieBreakConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: DEFAULT_TIE_BREAK_TIMEOUT_MS,
        }
    }
}

impl TieBreakConfig {
    /// Returns the timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Builder method to enable or disable tie-breaking.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

fn check_score(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "{name} must be within [0, 100], got {value}"
        )));
    }
    Ok(())
}
