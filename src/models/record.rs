//! Entity records and identifiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable, content-derived identifier for a canonical entity.
///
/// Produced by [`crate::services::IdGenerator`]; never derived from row
/// position, load order or record count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One row of the canonical reference table.
///
/// Created in bulk by consolidation; read-only at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Stable identifier.
    pub entity_id: EntityId,
    /// Human-readable canonical form (case preserved, punctuation cleaned).
    pub display_name: String,
    /// Aggressively normalized form used for comparison. Never empty.
    pub match_key: String,
    /// Key-safe slug of the display name.
    pub slug: String,
    /// Additional names that match the same entity, sorted and deduplicated.
    pub alternate_names: Vec<String>,
    /// Categorical attributes used for blocking and boosting.
    pub context_fields: BTreeMap<String, String>,
    /// Strong external identifier (regulatory code, registry number).
    pub external_id: Option<String>,
    /// Origin system of the surviving row.
    pub source: String,
    /// Rank of the origin system; lower wins conflicts.
    pub source_priority: u32,
}

impl EntityRecord {
    /// Returns the context value for `key`, if present.
    #[must_use]
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context_fields.get(key).map(String::as_str)
    }

    /// Returns `true` if the record carries a strong external identifier.
    #[must_use]
    pub fn has_external_id(&self) -> bool {
        self.external_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    /// Returns `true` if the context field `key` equals `value` (case-insensitive).
    #[must_use]
    pub fn context_matches(&self, key: &str, value: &str) -> bool {
        self.context(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(value.trim()))
    }
}

/// One row of a raw provider table, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Primary name as supplied by the provider.
    pub name: String,
    /// Provider-supplied aliases, tickers, transliterations.
    pub alternate_names: Vec<String>,
    /// Categorical attributes (jurisdiction, category, ...).
    pub context: BTreeMap<String, String>,
    /// Strong external identifier, if the provider supplies one.
    pub external_id: Option<String>,
}

impl RawRecord {
    /// Creates a raw record with only a primary name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an alternate name.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alternate_names.push(alias.into());
        self
    }

    /// Sets a context field.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the external identifier.
    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }
}

/// A raw provider table together with its conflict-resolution priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource {
    /// Origin system name (e.g. `"GLEIF"`).
    pub name: String,
    /// Source priority; lower value wins conflicts.
    pub priority: u32,
    /// Rows supplied by the source.
    pub records: Vec<RawRecord>,
}

impl RawSource {
    /// Creates a new raw source.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: u32, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            priority,
            records,
        }
    }
}
