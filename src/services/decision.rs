//! Decision engine: maps a ranked candidate list to a terminal state.
//!
//! | Condition | State |
//! |-----------|-------|
//! | no candidates | `no_match` |
//! | top >= high and gap >= min gap | `confident_match` |
//! | top >= high and gap < min gap | `ambiguous` |
//! | min viable <= top < high | `ambiguous` |
//! | top < min viable | `no_match` |
//!
//! The gap of a single candidate is its own score.

use crate::config::DecisionConfig;
use crate::models::{DecisionState, ScoredCandidate};
use std::cmp::Ordering;

/// Threshold-based classifier over ranked candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    /// Creates an engine with the given thresholds.
    #[must_use]
    pub const fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// The configured thresholds.
    #[must_use]
    pub const fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Returns a copy with the high-confidence threshold overridden.
    #[must_use]
    pub fn with_threshold(self, threshold: Option<f64>) -> Self {
        Self {
            config: self.config.with_threshold_override(threshold),
        }
    }

    /// Sorts candidates best first: score descending, then `match_key`,
    /// then `entity_id`, so equal scores never depend on input order.
    pub fn rank(candidates: &mut [ScoredCandidate]) {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.match_key.cmp(&b.record.match_key))
                .then_with(|| a.record.entity_id.cmp(&b.record.entity_id))
        });
    }

    /// Classifies a ranked candidate list (highest score first).
    #[must_use]
    pub fn decide(&self, ranked: &[ScoredCandidate]) -> DecisionState {
        let Some(top) = ranked.first() else {
            return DecisionState::NoMatch;
        };
        let second = ranked.get(1).map_or(0.0, |c| c.score);
        let gap = round_gap(top.score - second);

        if top.score >= self.config.high_confidence {
            if gap >= self.config.min_gap {
                DecisionState::ConfidentMatch
            } else {
                DecisionState::Ambiguous
            }
        } else if top.score >= self.config.min_viable {
            DecisionState::Ambiguous
        } else {
            DecisionState::NoMatch
        }
    }
}

impl DecisionEngine {
    /// Returns `true` if the top score lies in the uncertain band
    /// `[min_viable, high_confidence)`.
    ///
    /// Only such results go to an external tie-breaker; a close race above
    /// `high_confidence` stays `ambiguous`.
    #[must_use]
    pub fn in_uncertain_band(&self, ranked: &[ScoredCandidate]) -> bool {
        ranked.first().is_some_and(|top| {
            top.score >= self.config.min_viable && top.score < self.config.high_confidence
        })
    }
}

fn round_gap(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
