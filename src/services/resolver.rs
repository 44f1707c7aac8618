//! Query resolution: normalize, block, score, decide.

use super::decision::DecisionEngine;
use super::scoring::Scorer;
use super::tie_break::{TieBreakQuery, TieBreaker, TimeBoundedTieBreaker};
use crate::config::EngineConfig;
use crate::models::{
    CanonicalTable, DecisionState, EntityProfile, EntityRecord, Resolution, ResolutionSource,
    ResolveHints, ScoreExplanation, ScoredCandidate,
};
use crate::observability::RESOLUTIONS_TOTAL;
use crate::services::Normalizer;
use crate::storage::LoadedTable;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::instrument;

/// Candidate count above which scoring fans out across threads.
const PARALLEL_THRESHOLD: usize = 256;

/// Resolves free-form mentions against a loaded canonical table.
///
/// Holds only immutable state; share it freely between threads.
///
/// # Example
///
/// ```rust
/// use entityidentity::models::{EntityProfile, RawRecord, RawSource, ResolveHints};
/// use entityidentity::services::{ConsolidationConfig, Resolver, consolidate};
/// use entityidentity::EngineConfig;
///
/// let source = RawSource::new("registry", 1, vec![RawRecord::new("Apple Inc.")]);
/// let profile = EntityProfile::company();
/// let built = consolidate(&[source], &ConsolidationConfig::new(profile.clone())).unwrap();
///
/// let resolver = Resolver::from_table(built.table, &profile, &EngineConfig::default());
/// let result = resolver.resolve("apple inc", &ResolveHints::default(), None);
/// assert!(result.is_confident());
/// assert_eq!(result.best().map(|r| r.display_name.as_str()), Some("Apple Inc"));
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    loaded: Arc<LoadedTable>,
    normalizer: Normalizer,
    scorer: Scorer,
    decision: DecisionEngine,
    tie_breaker: Option<TimeBoundedTieBreaker>,
    top_k: usize,
}

impl Resolver {
    /// Creates a resolver over a loaded table.
    ///
    /// `profile` must be the profile the table was consolidated and indexed
    /// under.
    #[must_use]
    pub fn new(loaded: Arc<LoadedTable>, profile: &EntityProfile, config: &EngineConfig) -> Self {
        let normalizer = Normalizer::new(profile);
        Self {
            loaded,
            scorer: Scorer::new(normalizer.clone(), config.scoring),
            normalizer,
            decision: DecisionEngine::new(config.decision),
            tie_breaker: None,
            top_k: config.top_k.max(1),
        }
    }

    /// Indexes an in-memory table and creates a resolver over it.
    #[must_use]
    pub fn from_table(table: CanonicalTable, profile: &EntityProfile, config: &EngineConfig) -> Self {
        let loaded = Arc::new(LoadedTable::new(table, profile, config.blocking));
        Self::new(loaded, profile, config)
    }

    /// Builder method to attach an external tie-breaker.
    ///
    /// It is called for `ambiguous` results whose top score lies below the
    /// high-confidence threshold, bounded by `config.tie_break`. Nothing is attached when tie-breaking is disabled.
    #[must_use]
    pub fn with_tie_breaker(mut self, tie_breaker: Arc<dyn TieBreaker>, config: &EngineConfig) -> Self {
        self.tie_breaker = config
            .tie_break
            .enabled
            .then(|| TimeBoundedTieBreaker::new(tie_breaker, config.tie_break.timeout()));
        self
    }

    /// The canonical table.
    #[must_use]
    pub fn table(&self) -> &CanonicalTable {
        &self.loaded.table
    }

    /// The loaded table and index.
    #[must_use]
    pub fn loaded(&self) -> &Arc<LoadedTable> {
        &self.loaded
    }

    /// Resolves one mention.
    ///
    /// `threshold` overrides the high-confidence threshold for this call.
    /// Empty or unnormalizable text yields `no_match`.
    #[instrument(
        name = "entityidentity.resolve",
        skip(self, hints),
        fields(query_len = text.len(), state = tracing::field::Empty)
    )]
    pub fn resolve(&self, text: &str, hints: &ResolveHints, threshold: Option<f64>) -> Resolution {
        let resolution = self.resolve_inner(text, hints, threshold);
        tracing::Span::current().record("state", resolution.state.as_str());
        metrics::counter!(RESOLUTIONS_TOTAL, "state" => resolution.state.as_str()).increment(1);
        resolution
    }

    fn resolve_inner(&self, text: &str, hints: &ResolveHints, threshold: Option<f64>) -> Resolution {
        let query_normalized = self.normalizer.normalize_match(text);
        if query_normalized.is_empty() {
            return Resolution::no_match(query_normalized, Vec::new());
        }

        let index = &self.loaded.index;
        let set = index.block(text, &query_normalized, hints);
        tracing::debug!(
            candidates = set.len(),
            truncated = set.truncated(),
            exact_rule = set.exact_rule.as_deref(),
            "Blocked query"
        );

        if let Some(rule) = set.exact_rule.clone() {
            let mut ranked: Vec<ScoredCandidate> = set
                .indices
                .iter()
                .filter_map(|&idx| self.loaded.table.at(idx))
                .map(exact_candidate)
                .collect();
            if let [only] = ranked.as_slice() {
                return Resolution {
                    state: DecisionState::ConfidentMatch,
                    best: Some(only.record.clone()),
                    candidates: ranked,
                    query_normalized,
                    source: Some(ResolutionSource::ExactKey { rule }),
                };
            }
            DecisionEngine::rank(&mut ranked);
            return self.decide(ranked, query_normalized, text, hints, threshold);
        }

        let ranked = self.score_ranked(&query_normalized, &set.indices, hints);
        self.decide(ranked, query_normalized, text, hints, threshold)
    }

    fn decide(
        &self,
        mut ranked: Vec<ScoredCandidate>,
        query_normalized: String,
        text: &str,
        hints: &ResolveHints,
        threshold: Option<f64>,
    ) -> Resolution {
        let engine = self.decision.with_threshold(threshold);
        let state = engine.decide(&ranked);
        let uncertain = engine.in_uncertain_band(&ranked);
        ranked.truncate(self.top_k);

        match state {
            DecisionState::ConfidentMatch => Resolution {
                state,
                best: ranked.first().map(|c| c.record.clone()),
                candidates: ranked,
                query_normalized,
                source: Some(ResolutionSource::Scored),
            },
            DecisionState::Ambiguous => {
                if let Some(tie_breaker) = self.tie_breaker.as_ref().filter(|_| uncertain) {
                    let records: Vec<EntityRecord> = ranked.iter().map(|c| c.record.clone()).collect();
                    let query = TieBreakQuery {
                        text: text.to_string(),
                        normalized: query_normalized.clone(),
                        hints: hints.clone(),
                    };
                    if let Some(pick) = tie_breaker.pick(&records, &query) {
                        let best = records.into_iter().find(|r| r.entity_id == pick);
                        return Resolution {
                            state: DecisionState::ConfidentMatch,
                            best,
                            candidates: ranked,
                            query_normalized,
                            source: Some(ResolutionSource::ExternalTieBreak {
                                resolver: tie_breaker.name().to_string(),
                            }),
                        };
                    }
                }
                Resolution {
                    state,
                    best: None,
                    candidates: ranked,
                    query_normalized,
                    source: None,
                }
            },
            DecisionState::NoMatch => Resolution::no_match(query_normalized, ranked),
        }
    }

    fn score_ranked(&self, query: &str, indices: &[usize], hints: &ResolveHints) -> Vec<ScoredCandidate> {
        let table = &self.loaded.table;
        let index = &self.loaded.index;
        let score_one = |&idx: &usize| {
            table
                .at(idx)
                .map(|record| self.scorer.score_with_alias_keys(query, record, index.alias_keys(idx), hints))
        };
        let mut scored: Vec<ScoredCandidate> = if indices.len() >= PARALLEL_THRESHOLD {
            indices.par_iter().filter_map(score_one).collect()
        } else {
            indices.iter().filter_map(score_one).collect()
        };
        DecisionEngine::rank(&mut scored);
        scored
    }

    /// Resolves many mentions in parallel, preserving input order.
    pub fn resolve_batch<S>(&self, texts: &[S], hints: &ResolveHints, threshold: Option<f64>) -> Vec<Resolution>
    where
        S: AsRef<str> + Sync,
    {
        texts
            .par_iter()
            .map(|text| self.resolve(text.as_ref(), hints, threshold))
            .collect()
    }

    /// Returns the accepted record, or `None` unless the result is confident.
    #[must_use]
    pub fn match_entity(&self, text: &str, hints: &ResolveHints) -> Option<EntityRecord> {
        self.resolve(text, hints, None).best
    }

    /// Returns up to `k` ranked candidates without making a decision.
    #[must_use]
    pub fn top_k(&self, text: &str, hints: &ResolveHints, k: usize) -> Vec<ScoredCandidate> {
        let query = self.normalizer.normalize_match(text);
        if query.is_empty() || k == 0 {
            return Vec::new();
        }
        let set = self.loaded.index.candidates(&query, hints);
        let mut ranked = self.score_ranked(&query, &set.indices, hints);
        ranked.truncate(k);
        ranked
    }
}

/// An exact identifier hit is a perfect match on the identifier itself.
fn exact_candidate(record: &EntityRecord) -> ScoredCandidate {
    ScoredCandidate {
        record: record.clone(),
        score: 100.0,
        explain: ScoreExplanation {
            primary: 100.0,
            alias: 0.0,
            context_match: false,
            has_external_id: record.has_external_id(),
            boost: 0.0,
        },
    }
}
