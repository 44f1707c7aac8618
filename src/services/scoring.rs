//! Candidate scoring.
//!
//! The base score is a bounded, token-aware similarity between the query
//! match key and the candidate's match key or best alternate name. Small,
//! capped boosts are added when auxiliary signals agree.

use super::normalize::Normalizer;
use crate::config::ScoringConfig;
use crate::models::{EntityRecord, ResolveHints, ScoreExplanation, ScoredCandidate};

/// Weight applied to token-reordered comparisons so that an exact
/// character-level match always outranks a reordering.
const TOKEN_SCALE: f64 = 0.95;

/// Character-level similarity in `[0, 100]`.
///
/// The mean of normalized Damerau-Levenshtein (edit distance with
/// transpositions) and Jaro-Winkler (prefix-weighted). Identical strings
/// score 100, and an empty side scores 0.
#[must_use]
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return if a.is_empty() { 0.0 } else { 100.0 };
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let edit = strsim::normalized_damerau_levenshtein(a, b);
    let jw = strsim::jaro_winkler(a, b);
    100.0 * (0.5 * edit + 0.5 * jw)
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// [`ratio`] after sorting tokens, so word order is ignored.
#[must_use]
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

/// Token-set similarity: compares the shared tokens against each side's
/// full token set. A query whose tokens are a subset of the candidate's
/// scores 100.
#[must_use]
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = sorted_tokens(a);
    let tb = sorted_tokens(b);
    let shared: Vec<&str> = ta.iter().filter(|t| tb.contains(t)).copied().collect();
    if shared.is_empty() {
        return ratio(&ta.join(" "), &tb.join(" "));
    }
    let only_a: Vec<&str> = ta.iter().filter(|t| !shared.contains(t)).copied().collect();
    let only_b: Vec<&str> = tb.iter().filter(|t| !shared.contains(t)).copied().collect();

    let sect = shared.join(" ");
    let combined_a = join_nonempty(&sect, &only_a.join(" "));
    let combined_b = join_nonempty(&sect, &only_b.join(" "));

    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_nonempty(head: &str, tail: &str) -> String {
    if tail.is_empty() {
        head.to_string()
    } else {
        format!("{head} {tail}")
    }
}

/// Bounded token-aware similarity in `[0, 100]`: the best of the
/// character-level ratio and the scaled token-sort and token-set ratios.
///
/// # Example
///
/// ```rust
/// use entityidentity::services::weighted_ratio;
///
/// assert!((weighted_ratio("acme", "acme") - 100.0).abs() < f64::EPSILON);
/// assert!(weighted_ratio("bhp", "bhp group") > 90.0);
/// assert!(weighted_ratio("acme", "zenith") < 50.0);
/// ```
#[must_use]
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    let direct = ratio(a, b);
    if direct >= 100.0 {
        return 100.0;
    }
    direct
        .max(TOKEN_SCALE * token_sort_ratio(a, b))
        .max(TOKEN_SCALE * token_set_ratio(a, b))
}

/// Scores candidates against a normalized query.
#[derive(Debug, Clone)]
pub struct Scorer {
    normalizer: Normalizer,
    config: ScoringConfig,
}

impl Scorer {
    /// Creates a scorer.
    #[must_use]
    pub const fn new(normalizer: Normalizer, config: ScoringConfig) -> Self {
        Self { normalizer, config }
    }

    /// Returns the scoring configuration.
    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scores `candidate` against `query_match_key`.
    ///
    /// Alternate names are match-normalized on the fly; use
    /// [`Self::score_with_alias_keys`] when they are precomputed.
    #[must_use]
    pub fn score(
        &self,
        query_match_key: &str,
        candidate: &EntityRecord,
        hints: &ResolveHints,
    ) -> ScoredCandidate {
        let alias_keys: Vec<String> = candidate
            .alternate_names
            .iter()
            .map(|name| self.normalizer.normalize_match(name))
            .collect();
        self.score_with_alias_keys(query_match_key, candidate, &alias_keys, hints)
    }

    /// Scores `candidate` using already-normalized alternate names.
    ///
    /// The result is a pure function of the arguments and lies in `[0, 100]`.
    #[must_use]
    pub fn score_with_alias_keys(
        &self,
        query_match_key: &str,
        candidate: &EntityRecord,
        alias_keys: &[String],
        hints: &ResolveHints,
    ) -> ScoredCandidate {
        let primary = weighted_ratio(query_match_key, &candidate.match_key);
        let alias = alias_keys
            .iter()
            .map(|key| weighted_ratio(query_match_key, key))
            .fold(0.0_f64, f64::max);
        let base = primary.max(alias);

        let context_match = hints
            .context_pairs()
            .iter()
            .any(|(key, value)| candidate.context_matches(key, value));
        let has_external_id = candidate.has_external_id();

        let mut boost = 0.0;
        if base > 0.0 {
            if context_match {
                boost += self.config.context_boost;
            }
            if has_external_id {
                boost += self.config.external_id_boost;
            }
            boost = boost.min(self.config.max_total_boost);
        }

        ScoredCandidate {
            record: candidate.clone(),
            score: round_score((base + boost).clamp(0.0, 100.0)),
            explain: ScoreExplanation {
                primary: round_score(primary),
                alias: round_score(alias),
                context_match,
                has_external_id,
                boost,
            },
        }
    }
}

/// Rounds to two decimals so scores compare stably at threshold boundaries.
fn round_score(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
