//! Data models for entityidentity.
//!
//! This module contains the core data structures shared by the resolution
//! engine and the offline consolidation build.

mod hints;
mod profile;
mod record;
mod resolution;
mod table;

pub use hints::{CATEGORY, CLUSTER, JURISDICTION, ResolveHints};
pub use profile::{EntityProfile, ExactKeyRule, IdStrategy, KeySource, canonical_identifier};
pub use record::{EntityId, EntityRecord, RawRecord, RawSource};
pub use resolution::{
    DecisionState, Resolution, ResolutionSource, ScoreExplanation, ScoredCandidate,
};
pub use table::CanonicalTable;
