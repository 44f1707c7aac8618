//! Resolution results.

use super::record::EntityRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    /// The top candidate is accepted.
    ConfidentMatch,
    /// Plausible candidates exist but none is clearly distinguishable.
    Ambiguous,
    /// Nothing viable was found.
    NoMatch,
}

impl DecisionState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConfidentMatch => "confident_match",
            Self::Ambiguous => "ambiguous",
            Self::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a confident match was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResolutionSource {
    /// Exact identifier lookup bypassed scoring.
    ExactKey {
        /// Name of the exact-key rule that fired.
        rule: String,
    },
    /// Thresholds on scored candidates.
    Scored,
    /// Picked by an external tie-break collaborator.
    ExternalTieBreak {
        /// Name of the collaborator.
        resolver: String,
    },
}

/// How a candidate's score was composed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreExplanation {
    /// Similarity against the candidate's match key.
    pub primary: f64,
    /// Best similarity against the candidate's alternate names.
    pub alias: f64,
    /// Whether a hint agreed with the candidate's context fields.
    pub context_match: bool,
    /// Whether the candidate carries a strong external identifier.
    pub has_external_id: bool,
    /// Boost applied after capping.
    pub boost: f64,
}

/// A candidate with its bounded score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// The candidate record.
    pub record: EntityRecord,
    /// Score in `[0, 100]`.
    pub score: f64,
    /// Score breakdown.
    pub explain: ScoreExplanation,
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Terminal decision state.
    pub state: DecisionState,
    /// Accepted record when `state` is `ConfidentMatch`.
    pub best: Option<EntityRecord>,
    /// Ranked candidates (highest score first), truncated to top-k.
    pub candidates: Vec<ScoredCandidate>,
    /// The query after match normalization.
    pub query_normalized: String,
    /// How the best record was selected, when there is one.
    pub source: Option<ResolutionSource>,
}

impl Resolution {
    /// Creates a `no_match` result.
    #[must_use]
    pub const fn no_match(query_normalized: String, candidates: Vec<ScoredCandidate>) -> Self {
        Self {
            state: DecisionState::NoMatch,
            best: None,
            candidates,
            query_normalized,
            source: None,
        }
    }

    /// Returns the accepted record, if any.
    #[must_use]
    pub const fn best(&self) -> Option<&EntityRecord> {
        self.best.as_ref()
    }

    /// Returns `true` if the state is `ConfidentMatch`.
    #[must_use]
    pub fn is_confident(&self) -> bool {
        self.state == DecisionState::ConfidentMatch
    }

    /// Returns the top score, or `0.0` without candidates.
    #[must_use]
    pub fn top_score(&self) -> f64 {
        self.candidates.first().map_or(0.0, |c| c.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&DecisionState::ConfidentMatch).unwrap_or_default();
        assert_eq!(json, "\"confident_match\"");
        assert_eq!(DecisionState::NoMatch.to_string(), "no_match");
    }

    #[test]
    fn test_no_match_has_no_best() {
        let r = Resolution::no_match(String::new(), Vec::new());
        assert_eq!(r.state, DecisionState::NoMatch);
        assert!(r.best().is_none());
        assert!((r.top_score() - 0.0).abs() < f64::EPSILON);
    }
}
