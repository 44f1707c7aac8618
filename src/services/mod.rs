//! Resolution and consolidation services.
//!
//! Runtime path: [`Normalizer`] -> [`BlockingIndex`] -> [`Scorer`] ->
//! [`DecisionEngine`], orchestrated by [`Resolver`].
//!
//! Build path: [`consolidate`] turns prioritized raw sources into a
//! [`crate::models::CanonicalTable`] with [`IdGenerator`] identifiers.

// Scores and counts are small; f64 precision loss is irrelevant here.
#![allow(clippy::cast_precision_loss)]

mod blocking;
mod consolidation;
mod decision;
mod identifier;
mod normalize;
mod resolver;
mod scoring;
mod tie_break;

pub use blocking::{BlockingIndex, CandidateSet};
pub use consolidation::{
    Consolidation, ConsolidationConfig, IdentifierConflict, MixedIdentifierGroup, SharedMatchKey,
    SourceStats, ValidationReport, consolidate,
};
pub use decision::DecisionEngine;
pub use identifier::{ID_HEX_LEN, IdGenerator, generate_id};
pub use normalize::{Normalizer, fold_unicode, slugify};
pub use resolver::Resolver;
pub use scoring::{Scorer, ratio, token_set_ratio, token_sort_ratio, weighted_ratio};
pub use tie_break::{TieBreakQuery, TieBreaker, TimeBoundedTieBreaker};
