//! Metric names emitted by the crate.
//!
//! The crate records through the `metrics` facade and installs no exporter;
//! applications install a recorder and may call [`describe_metrics`].

/// Resolutions by decision state (`state` label).
pub const RESOLUTIONS_TOTAL: &str = "entityidentity_resolutions_total";

/// Tie-break attempts by outcome (`status` label).
pub const TIE_BREAK_TOTAL: &str = "entityidentity_tie_break_total";

/// Candidate sets cut down to the blocking cap.
pub const BLOCKING_TRUNCATED_TOTAL: &str = "entityidentity_blocking_truncated_total";

/// Candidate set size per resolution.
pub const CANDIDATES: &str = "entityidentity_candidates";

/// Registers descriptions for every metric with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(RESOLUTIONS_TOTAL, "Resolutions by decision state");
    metrics::describe_counter!(TIE_BREAK_TOTAL, "Tie-break attempts by outcome");
    metrics::describe_counter!(
        BLOCKING_TRUNCATED_TOTAL,
        "Candidate sets truncated to the blocking cap"
    );
    metrics::describe_histogram!(CANDIDATES, "Candidates scored per resolution");
}
