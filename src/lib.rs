//! # entityidentity
//!
//! Deterministic resolution of free-form entity mentions to canonical records.
//!
//! Upstream text is messy (abbreviations, legal-suffix variants, transliterations),
//! downstream consumers need one stable key per real-world entity. This crate
//! provides the generic engine shared by every entity type:
//!
//! - Text normalization into match keys, display names and slugs
//! - Content-derived, order-independent entity identifiers
//! - Candidate blocking that narrows the search space without losing exact matches
//! - Bounded token-aware similarity scoring with capped contextual boosts
//! - Threshold-based decisions (`confident_match`, `ambiguous`, `no_match`)
//! - Offline consolidation of several raw sources into one canonical table
//!
//! ## Example
//!
//! Loading a persisted table and resolving a mention:
//!
//! ```rust,no_run
//! use entityidentity::{EngineConfig, EntityProfile, ResolveHints, Resolver, TableCache};
//!
//! # fn main() -> entityidentity::Result<()> {
//! let profile = EntityProfile::company();
//! let config = EngineConfig::load_default();
//! let cache = TableCache::new(profile.clone(), &config);
//! let resolver = Resolver::new(cache.get()?, &profile, &config);
//!
//! let result = resolver.resolve("Apple Inc.", &ResolveHints::default(), None);
//! if let Some(best) = result.best() {
//!     println!("{} -> {}", best.display_name, best.entity_id);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// arrow/parquet pull several versions of the same transitive crates.
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{BlockingConfig, DecisionConfig, EngineConfig, ScoringConfig, TieBreakConfig};
pub use io::{RawSourceSpec, RawTable};
pub use models::{
    CanonicalTable, DecisionState, EntityId, EntityProfile, EntityRecord, ExactKeyRule,
    IdStrategy, KeySource, RawRecord, RawSource, Resolution, ResolutionSource, ResolveHints,
    ScoreExplanation, ScoredCandidate,
};
pub use services::{
    BlockingIndex, CandidateSet, Consolidation, ConsolidationConfig, DecisionEngine,
    IdGenerator, Normalizer, Resolver, Scorer, TieBreaker, TimeBoundedTieBreaker,
    ValidationReport, consolidate,
};
pub use storage::{LoadedTable, TableCache, read_parquet, write_parquet};

/// Error type for entity resolution and consolidation.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad configuration values, malformed profile patterns |
/// | `DataNotFound` | The canonical table cannot be located or read at load time |
/// | `Validation` | Raw sources or the consolidated table violate build invariants |
/// | `OperationFailed` | I/O, CSV, Parquet or TOML operations fail |
/// | `Internal` | Invariants internal to the crate are broken |
///
/// Ambiguous resolutions and empty queries are *not* errors; they surface as
/// [`DecisionState`] values on a [`Resolution`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A threshold lies outside `[0, 100]`
    /// - `min_viable` exceeds `high_confidence`
    /// - An exact-key rule pattern fails to compile
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The canonical reference table could not be found.
    ///
    /// Raised when no data file exists at any searched location, or the file
    /// found cannot be read as a canonical table. The message lists every searched path and
    /// the build step that produces the table.
    #[error("canonical table not found (searched: {}). To fix: {remediation}", display_paths(.searched))]
    DataNotFound {
        /// Locations that were searched, in order.
        searched: Vec<PathBuf>,
        /// Actionable remediation message.
        remediation: String,
    },

    /// A raw source or the consolidated table failed validation.
    ///
    /// Raised when:
    /// - A raw source declares no context column, or its table lacks a
    ///   required column
    /// - One external identifier carries conflicting names across sources
    /// - Two clusters would receive the same `entity_id`
    /// - A persisted record has an empty `match_key`
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur
    /// - CSV or Parquet encoding/decoding fails
    /// - A configuration file cannot be parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Internal error (unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for entityidentity operations.
pub type Result<T> = std::result::Result<T, Error>;

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no locations".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "read_parquet".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'read_parquet' failed: failed");

        let err = Error::Validation("missing column 'name'".to_string());
        assert_eq!(err.to_string(), "validation failed: missing column 'name'");
    }

    #[test]
    fn test_data_not_found_lists_locations() {
        let err = Error::DataNotFound {
            searched: vec![PathBuf::from("/a/companies.parquet"), PathBuf::from("/b/companies.parquet")],
            remediation: "run the consolidation build".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/a/companies.parquet, /b/companies.parquet"));
        assert!(msg.contains("run the consolidation build"));
    }
}
