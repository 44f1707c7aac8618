//! External tie-break for ambiguous results.
//!
//! A [`TieBreaker`] is an optional collaborator, for example a review queue
//! or a rules service, that may pick one of several plausible candidates.
//! Calls go through [`TimeBoundedTieBreaker`]; any failure or late answer
//! counts as "no opinion".

use crate::Result;
use crate::models::{EntityId, EntityRecord, ResolveHints};
use crate::observability::TIE_BREAK_TOTAL;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// The query an ambiguous result came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TieBreakQuery {
    /// Query text as supplied by the caller.
    pub text: String,
    /// Match-normalized query.
    pub normalized: String,
    /// Hints supplied with the query.
    pub hints: ResolveHints,
}

/// Picks one of several ambiguous candidates.
///
/// Implementations return `Ok(None)` when they have no opinion. Returning an
/// ID that is not among `candidates` is treated as no opinion.
pub trait TieBreaker: Send + Sync {
    /// Collaborator name, recorded on resolutions it decides.
    fn name(&self) -> &str;

    /// Chooses a candidate.
    ///
    /// # Errors
    ///
    /// Any error is logged and recovered locally by the caller.
    fn tie_break(&self, candidates: &[EntityRecord], query: &TieBreakQuery)
    -> Result<Option<EntityId>>;
}

/// Runs a [`TieBreaker`] on a worker thread with an upper time bound.
///
/// A timed-out call keeps running in the background until it finishes; its
/// result is discarded.
#[derive(Clone)]
pub struct TimeBoundedTieBreaker {
    inner: Arc<dyn TieBreaker>,
    timeout: Duration,
}

impl std::fmt::Debug for TimeBoundedTieBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBoundedTieBreaker")
            .field("inner", &self.inner.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TimeBoundedTieBreaker {
    /// Wraps a collaborator with a timeout.
    #[must_use]
    pub fn new(inner: Arc<dyn TieBreaker>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped collaborator's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Asks the collaborator for a pick.
    ///
    /// Returns the chosen candidate's ID, or `None` on no opinion, error,
    /// timeout or a pick outside `candidates`. Never fails.
    #[must_use]
    pub fn pick(&self, candidates: &[EntityRecord], query: &TieBreakQuery) -> Option<EntityId> {
        if candidates.is_empty() {
            return None;
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let owned: Vec<EntityRecord> = candidates.to_vec();
        let owned_query = query.clone();
        let parent_span = tracing::Span::current();

        metrics::counter!(TIE_BREAK_TOTAL, "status" => "started").increment(1);

        let spawned = std::thread::Builder::new()
            .name("entityidentity-tie-break".to_string())
            .spawn(move || {
                let _parent = parent_span.enter();
                let span = tracing::debug_span!("tie_break.call");
                let _guard = span.enter();
                let result = inner.tie_break(&owned, &owned_query);
                // The receiver is gone after a timeout; nothing to report.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "Failed to spawn tie-break worker");
            metrics::counter!(TIE_BREAK_TOTAL, "status" => "error").increment(1);
            return None;
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(Some(id))) => {
                if candidates.iter().any(|c| c.entity_id == id) {
                    metrics::counter!(TIE_BREAK_TOTAL, "status" => "picked")
                        .increment(1);
                    Some(id)
                } else {
                    tracing::warn!(
                        resolver = self.name(),
                        picked = %id,
                        "Tie-breaker picked an entity outside the candidate list"
                    );
                    metrics::counter!(TIE_BREAK_TOTAL, "status" => "unknown_pick")
                        .increment(1);
                    None
                }
            },
            Ok(Ok(None)) => {
                metrics::counter!(TIE_BREAK_TOTAL, "status" => "no_opinion")
                    .increment(1);
                None
            },
            Ok(Err(e)) => {
                tracing::warn!(resolver = self.name(), error = %e, "Tie-breaker failed, staying ambiguous");
                metrics::counter!(TIE_BREAK_TOTAL, "status" => "error").increment(1);
                None
            },
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    resolver = self.name(),
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Tie-breaker timed out, staying ambiguous"
                );
                metrics::counter!(TIE_BREAK_TOTAL, "status" => "timeout")
                    .increment(1);
                None
            },
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(resolver = self.name(), "Tie-breaker worker exited without a result");
                metrics::counter!(TIE_BREAK_TOTAL, "status" => "disconnected")
                    .increment(1);
                None
            },
        }
    }
}
