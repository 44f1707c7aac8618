//! Data-quality report produced alongside the canonical table.

use crate::models::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-source counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Raw records supplied.
    pub records_in: usize,
    /// Records dropped because their name normalized to nothing.
    pub dropped_empty_names: usize,
    /// Records that survived as canonical rows.
    pub survivors: usize,
}

/// Distinct canonical entities that share a match key.
///
/// Expected for same-named entities in different jurisdictions; worth a
/// look otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedMatchKey {
    /// The shared key.
    pub match_key: String,
    /// Entities carrying it, sorted.
    pub entity_ids: Vec<EntityId>,
}

/// One external identifier carried by records with unrelated names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierConflict {
    /// The identifier, canonicalized.
    pub external_id: String,
    /// Conflicting primary names as `source: name`, sorted.
    pub names: Vec<String>,
}

/// A key group whose records carry several distinct external identifiers.
///
/// Records without an identifier in such a group merge only among
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedIdentifierGroup {
    /// The group's match key.
    pub match_key: String,
    /// Distinct identifiers seen, sorted.
    pub external_ids: Vec<String>,
}

/// Findings of one consolidation run.
///
/// Every list is sorted so reports compare equal regardless of input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Total records dropped for empty names.
    pub dropped_empty_names: usize,
    /// Match keys shared by more than one canonical entity.
    pub shared_match_keys: Vec<SharedMatchKey>,
    /// Identifier conflicts merged in relaxed mode.
    pub identifier_conflicts: Vec<IdentifierConflict>,
    /// Key groups with several external identifiers.
    pub mixed_identifier_groups: Vec<MixedIdentifierGroup>,
    /// Counters per source name.
    pub per_source: BTreeMap<String, SourceStats>,
}

impl ValidationReport {
    /// Returns `true` if there is nothing worth reviewing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped_empty_names == 0
            && self.shared_match_keys.is_empty()
            && self.identifier_conflicts.is_empty()
            && self.mixed_identifier_groups.is_empty()
    }

    /// Number of findings that need review.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.shared_match_keys.len()
            + self.identifier_conflicts.len()
            + self.mixed_identifier_groups.len()
    }
}
