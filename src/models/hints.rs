//! Typed resolution hints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context key for the jurisdiction hint.
pub const JURISDICTION: &str = "jurisdiction";
/// Context key for the category hint.
pub const CATEGORY: &str = "category";
/// Context key for the cluster hint.
pub const CLUSTER: &str = "cluster";

/// Optional context supplied with a query.
///
/// Each set field names a `context_fields` value. Blocking restricts to
/// records sharing it (falling back to the unrestricted set when nothing
/// matches) and scoring adds a capped boost when it agrees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveHints {
    /// Jurisdiction / country code (e.g. `"AU"`).
    pub jurisdiction: Option<String>,
    /// Category bucket (e.g. `"precious"`).
    pub category: Option<String>,
    /// Grouping cluster (e.g. `"pgm_complex"`).
    pub cluster: Option<String>,
    /// Additional entity-type specific context keys.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ResolveHints {
    /// Creates empty hints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the jurisdiction hint.
    #[must_use]
    pub fn with_jurisdiction(mut self, value: impl Into<String>) -> Self {
        self.jurisdiction = Some(value.into());
        self
    }

    /// Sets the category hint.
    #[must_use]
    pub fn with_category(mut self, value: impl Into<String>) -> Self {
        self.category = Some(value.into());
        self
    }

    /// Sets the cluster hint.
    #[must_use]
    pub fn with_cluster(mut self, value: impl Into<String>) -> Self {
        self.cluster = Some(value.into());
        self
    }

    /// Sets an additional context hint.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns the `(context_key, value)` filters in fixed order.
    ///
    /// Blank values are skipped.
    #[must_use]
    pub fn context_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        let named = [
            (JURISDICTION, self.jurisdiction.as_deref()),
            (CATEGORY, self.category.as_deref()),
            (CLUSTER, self.cluster.as_deref()),
        ];
        for (key, value) in named {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                pairs.push((key, value));
            }
        }
        for (key, value) in &self.extra {
            if !value.trim().is_empty() {
                pairs.push((key.as_str(), value.as_str()));
            }
        }
        pairs
    }

    /// Returns `true` if no hint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.context_pairs().is_empty()
    }
}
