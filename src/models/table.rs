//! The canonical reference table.

use super::hints::ResolveHints;
use super::record::{EntityId, EntityRecord};
use crate::{Error, Result};
use std::collections::HashMap;

/// Consolidated, deduplicated entity records.
///
/// Construction validates that every `match_key` is non-empty and every
/// `entity_id` is unique. The table is read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalTable {
    records: Vec<EntityRecord>,
    by_id: HashMap<EntityId, usize>,
}

impl CanonicalTable {
    /// Builds a table from records, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a record has an empty `match_key` or
    /// an `entity_id` appears twice.
    pub fn new(records: Vec<EntityRecord>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if record.match_key.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "record '{}' ({}) has an empty match_key",
                    record.display_name, record.entity_id
                )));
            }
            if let Some(prev) = by_id.insert(record.entity_id.clone(), idx) {
                return Err(Error::Validation(format!(
                    "duplicate entity_id {} for '{}' and '{}'",
                    record.entity_id, records[prev].display_name, record.display_name
                )));
            }
        }
        Ok(Self { records, by_id })
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in table order.
    #[must_use]
    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    /// Record at a table position.
    #[must_use]
    pub fn at(&self, idx: usize) -> Option<&EntityRecord> {
        self.records.get(idx)
    }

    /// Looks up a record by entity ID.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.by_id.get(id).and_then(|idx| self.records.get(*idx))
    }

    /// Iterates over records in table order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter()
    }

    /// Lists records matching all hints and an optional substring search.
    ///
    /// The search is case-insensitive over `display_name` and `match_key`.
    #[must_use]
    pub fn filter(
        &self,
        hints: &ResolveHints,
        search: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<&EntityRecord> {
        let pairs = hints.context_pairs();
        let needle = search.map(str::to_lowercase).filter(|s| !s.is_empty());
        self.records
            .iter()
            .filter(|r| pairs.iter().all(|(k, v)| r.context_matches(k, v)))
            .filter(|r| {
                needle.as_deref().is_none_or(|n| {
                    r.display_name.to_lowercase().contains(n) || r.match_key.contains(n)
                })
            })
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}

impl<'a> IntoIterator for &'a CanonicalTable {
    type Item = &'a EntityRecord;
    type IntoIter = std::slice::Iter<'a, EntityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rec(id: &str, name: &str, key: &str, jurisdiction: &str) -> EntityRecord {
        EntityRecord {
            entity_id: EntityId::new(id),
            display_name: name.to_string(),
            match_key: key.to_string(),
            slug: key.replace(' ', "-"),
            alternate_names: Vec::new(),
            context_fields: BTreeMap::from([("jurisdiction".to_string(), jurisdiction.to_string())]),
            external_id: None,
            source: "test".to_string(),
            source_priority: 1,
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = CanonicalTable::new(vec![
            rec("a", "Apple Inc", "apple", "US"),
            rec("a", "Apple Bank", "apple bank", "US"),
        ]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_match_key_rejected() {
        let result = CanonicalTable::new(vec![rec("a", "Inc", "", "US")]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_get_and_filter() {
        let table = CanonicalTable::new(vec![
            rec("a", "Apple Inc", "apple", "US"),
            rec("b", "BHP Group", "bhp group", "AU"),
            rec("c", "BHP Billiton", "bhp billiton", "GB"),
        ])
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get(&EntityId::new("b")).map(|r| r.display_name.as_str()),
            Some("BHP Group")
        );

        let hints = ResolveHints::new().with_jurisdiction("au");
        let found = table.filter(&hints, Some("bhp"), None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id.as_str(), "b");

        let found = table.filter(&ResolveHints::default(), Some("BHP"), Some(1));
        assert_eq!(found.len(), 1);
    }
}
