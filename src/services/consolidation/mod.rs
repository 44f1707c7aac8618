//! Source consolidation: raw sources in, canonical table out.
//!
//! The build is order-independent. Members are sorted by content before
//! clustering, survivors are chosen by a content rule (lowest
//! `source_priority`, then match key, display name and source), name sets
//! are sorted, and the output is ordered by `(match_key, entity_id)`.
//! Consolidating the same sources in any order yields an identical table.
//!
//! # Example
//!
//! ```rust
//! use entityidentity::models::{EntityProfile, RawRecord, RawSource};
//! use entityidentity::services::{ConsolidationConfig, consolidate};
//!
//! let a = RawSource::new("registry", 1, vec![
//!     RawRecord::new("Acme Corp").with_external_id("5493001KJTIIGC8Y1R12"),
//! ]);
//! let b = RawSource::new("exchange", 2, vec![
//!     RawRecord::new("ACME CORPORATION").with_external_id("5493001KJTIIGC8Y1R12"),
//! ]);
//!
//! let config = ConsolidationConfig::new(EntityProfile::company());
//! let built = consolidate(&[a, b], &config).unwrap();
//! let acme = &built.table.records()[0];
//! assert_eq!(acme.display_name, "Acme Corp");
//! assert!(acme.alternate_names.contains(&"ACME CORPORATION".to_string()));
//! ```

mod cluster;
mod report;

pub use report::{
    IdentifierConflict, MixedIdentifierGroup, SharedMatchKey, SourceStats, ValidationReport,
};

use super::identifier::IdGenerator;
use super::normalize::Normalizer;
use crate::models::{
    CanonicalTable, EntityId, EntityProfile, EntityRecord, RawRecord, RawSource,
    canonical_identifier,
};
use crate::{Error, Result};
use cluster::Member;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::instrument;

/// Consolidation settings.
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Entity type parameters.
    pub profile: EntityProfile,
    /// Abort when one external identifier is carried by unrelated names.
    ///
    /// Defaults to `true`. When `false`, such records are merged and the
    /// conflict is reported.
    pub strict_identifier_names: bool,
}

impl ConsolidationConfig {
    /// Creates a strict configuration for a profile.
    #[must_use]
    pub const fn new(profile: EntityProfile) -> Self {
        Self {
            profile,
            strict_identifier_names: true,
        }
    }

    /// Builder method to toggle strict identifier-name checking.
    #[must_use]
    pub const fn with_strict_identifier_names(mut self, strict: bool) -> Self {
        self.strict_identifier_names = strict;
        self
    }
}

/// Output of a consolidation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    /// The canonical table, sorted by `(match_key, entity_id)`.
    pub table: CanonicalTable,
    /// Data-quality findings.
    pub report: ValidationReport,
}

/// Consolidates raw sources into a canonical table.
///
/// # Errors
///
/// Returns [`Error::Validation`] if
/// - strict mode is on and an external identifier is carried by unrelated names
/// - two clusters derive the same `entity_id`
#[instrument(
    name = "entityidentity.consolidate",
    skip(sources, config),
    fields(sources = sources.len(), namespace = %config.profile.namespace)
)]
pub fn consolidate(sources: &[RawSource], config: &ConsolidationConfig) -> Result<Consolidation> {
    let normalizer = Normalizer::new(&config.profile);
    let ids = IdGenerator::new(&config.profile);
    let mut report = ValidationReport::default();

    let mut members = Vec::new();
    for source in sources {
        let stats = report.per_source.entry(source.name.clone()).or_default();
        stats.records_in += source.records.len();
        for raw in &source.records {
            match normalize_member(&normalizer, &config.profile, source, raw) {
                Some(member) => members.push(member),
                None => {
                    stats.dropped_empty_names += 1;
                    report.dropped_empty_names += 1;
                },
            }
        }
    }
    members.sort();
    members.dedup();

    let clusters = cluster::cluster(&members);
    if config.strict_identifier_names {
        if let Some(conflict) = clusters.conflicts.first() {
            return Err(Error::Validation(format!(
                "external identifier {} is carried by unrelated names: {}",
                conflict.external_id,
                conflict.names.join(", ")
            )));
        }
    }
    for conflict in &clusters.conflicts {
        tracing::warn!(
            external_id = %conflict.external_id,
            names = ?conflict.names,
            "Merged records with conflicting names under one identifier"
        );
    }
    report.identifier_conflicts = clusters.conflicts;
    report.mixed_identifier_groups = clusters.mixed;

    let identified = &clusters.identified;
    let mut records = clusters
        .groups
        .par_iter()
        .map(|group| {
            let by_identifier = group.iter().any(|i| identified.contains(i));
            build_survivor(&members, group, &ids, &config.profile, by_identifier)
        })
        .collect::<Result<Vec<_>>>()?;
    records.sort_by(|a, b| {
        a.match_key
            .cmp(&b.match_key)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });

    check_collisions(&records)?;
    report.shared_match_keys = shared_match_keys(&records);
    for record in &records {
        report.per_source.entry(record.source.clone()).or_default().survivors += 1;
    }

    tracing::info!(
        members = members.len(),
        entities = records.len(),
        dropped = report.dropped_empty_names,
        issues = report.issue_count(),
        "Consolidated sources"
    );

    let table = CanonicalTable::new(records)?;
    Ok(Consolidation { table, report })
}

fn normalize_member(
    normalizer: &Normalizer,
    profile: &EntityProfile,
    source: &RawSource,
    raw: &RawRecord,
) -> Option<Member> {
    let match_key = normalizer.normalize_match(&raw.name);
    if match_key.is_empty() {
        tracing::debug!(source = %source.name, name = %raw.name, "Dropping record with empty name");
        return None;
    }
    let display_name = normalizer.normalize_display(&raw.name);

    let mut names = BTreeSet::new();
    let mut alias_keys = BTreeSet::new();
    names.insert(display_name.clone());
    for alias in &raw.alternate_names {
        let display = normalizer.normalize_display(alias);
        if !display.is_empty() {
            names.insert(display);
        }
        let key = normalizer.normalize_match(alias);
        if !key.is_empty() && key != match_key {
            alias_keys.insert(key);
        }
    }

    let context: BTreeMap<String, String> = raw
        .context
        .iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();
    let identity = profile
        .identity_context_keys
        .iter()
        .map(|key| context.get(key).map(|v| canonical_identifier(v)).unwrap_or_default())
        .collect();
    let external_id = raw
        .external_id
        .as_deref()
        .map(canonical_identifier)
        .filter(|s| !s.is_empty());

    Some(Member {
        priority: source.priority,
        slug: normalizer.slugify(&display_name),
        match_key,
        display_name,
        source: source.name.clone(),
        external_id,
        context,
        names,
        alias_keys,
        identity,
    })
}

/// Builds the canonical record of one cluster.
///
/// `group` is sorted and `members` is in survivor order, so the first index
/// is the survivor. With `by_identifier` the id is hashed from the
/// cluster's external identifier, since its key is shared with other
/// identified clusters.
fn build_survivor(
    members: &[Member],
    group: &[usize],
    ids: &IdGenerator,
    profile: &EntityProfile,
    by_identifier: bool,
) -> Result<EntityRecord> {
    let Some(survivor) = group.first().and_then(|&i| members.get(i)) else {
        return Err(Error::Internal("empty duplicate cluster".to_string()));
    };

    let mut alternate_names = BTreeSet::new();
    let mut context_fields = survivor.context.clone();
    let mut external_id = survivor.external_id.clone();
    for member in group.iter().filter_map(|&i| members.get(i)) {
        alternate_names.extend(member.names.iter().cloned());
        for (key, value) in &member.context {
            if !profile.identity_context_keys.contains(key) {
                context_fields
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        if external_id.is_none() {
            external_id.clone_from(&member.external_id);
        }
    }
    alternate_names.remove(&survivor.display_name);

    let entity_id = match external_id.as_deref().filter(|_| by_identifier) {
        Some(ext) => ids.external_id_for(ext).unwrap_or_else(|| {
            ids.id_for(&survivor.match_key, &survivor.context, None)
        })?,
        None => ids.id_for(
            &survivor.match_key,
            &survivor.context,
            survivor.external_id.as_deref(),
        )?,
    };

    Ok(EntityRecord {
        entity_id,
        display_name: survivor.display_name.clone(),
        match_key: survivor.match_key.clone(),
        slug: survivor.slug.clone(),
        alternate_names: alternate_names.into_iter().collect(),
        context_fields,
        external_id,
        source: survivor.source.clone(),
        source_priority: survivor.priority,
    })
}

fn check_collisions(records: &[EntityRecord]) -> Result<()> {
    let mut seen: HashMap<&EntityId, &EntityRecord> = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(prev) = seen.insert(&record.entity_id, record) {
            return Err(Error::Validation(format!(
                "entity_id {} derived for two distinct entities: '{}' ({}) and '{}' ({}); \
                 add identity context or use external identifiers",
                record.entity_id, prev.display_name, prev.source, record.display_name, record.source
            )));
        }
    }
    Ok(())
}

fn shared_match_keys(records: &[EntityRecord]) -> Vec<SharedMatchKey> {
    records
        .chunk_by(|a, b| a.match_key == b.match_key)
        .filter(|chunk| chunk.len() > 1)
        .map(|chunk| SharedMatchKey {
            match_key: chunk[0].match_key.clone(),
            entity_ids: chunk.iter().map(|r| r.entity_id.clone()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdStrategy;

    const LEI: &str = "5493001KJTIIGC8Y1R12";

    fn company() -> ConsolidationConfig {
        ConsolidationConfig::new(EntityProfile::company())
    }

    fn ids(c: &Consolidation) -> Vec<String> {
        c.table.iter().map(|r| r.entity_id.to_string()).collect()
    }

    #[test]
    fn test_priority_survivor_and_alias_union() {
        let a = RawSource::new("a", 1, vec![RawRecord::new("Acme Corp").with_external_id(LEI)]);
        let b = RawSource::new(
            "b",
            2,
            vec![
                RawRecord::new("ACME CORPORATION")
                    .with_external_id(LEI)
                    .with_alias("Acme")
                    .with_context("ticker", "ACME"),
            ],
        );

        let built = consolidate(&[b.clone(), a.clone()], &company()).unwrap();
        assert_eq!(built.table.len(), 1);
        let acme = &built.table.records()[0];
        assert_eq!(acme.display_name, "Acme Corp");
        assert_eq!(acme.source, "a");
        assert_eq!(acme.alternate_names, vec!["ACME CORPORATION".to_string(), "Acme".to_string()]);
        assert_eq!(acme.context("ticker"), Some("ACME"));
        assert_eq!(acme.external_id.as_deref(), Some(LEI));
        assert_eq!(built.report.per_source["a"].survivors, 1);
        assert_eq!(built.report.per_source["b"].survivors, 0);

        let reordered = consolidate(&[a, b], &company()).unwrap();
        assert_eq!(built, reordered);
    }

    #[test]
    fn test_same_key_merges_without_identifier() {
        let a = RawSource::new("a", 1, vec![RawRecord::new("Rio Tinto plc")]);
        let b = RawSource::new("b", 2, vec![RawRecord::new("Rio Tinto").with_alias("RIO")]);
        let built = consolidate(&[a, b], &company()).unwrap();
        assert_eq!(built.table.len(), 1);
        let rio = &built.table.records()[0];
        assert_eq!(rio.display_name, "Rio Tinto plc");
        assert_eq!(rio.alternate_names, vec!["RIO".to_string(), "Rio Tinto".to_string()]);
    }

    #[test]
    fn test_jurisdiction_keeps_same_names_apart() {
        let src = RawSource::new(
            "a",
            1,
            vec![
                RawRecord::new("BHP Group").with_context("jurisdiction", "AU"),
                RawRecord::new("BHP Group Plc").with_context("jurisdiction", "GB"),
            ],
        );
        let built = consolidate(&[src], &company()).unwrap();
        assert_eq!(built.table.len(), 2);
        assert_eq!(built.report.shared_match_keys.len(), 1);
        assert_eq!(built.report.shared_match_keys[0].match_key, "bhp group");
    }

    #[test]
    fn test_empty_names_are_dropped_and_counted() {
        let src = RawSource::new(
            "a",
            1,
            vec![RawRecord::new("   "), RawRecord::new("..."), RawRecord::new("Vale SA")],
        );
        let built = consolidate(&[src], &company()).unwrap();
        assert_eq!(built.table.len(), 1);
        assert_eq!(built.report.dropped_empty_names, 2);
        assert_eq!(built.report.per_source["a"].dropped_empty_names, 2);
    }

    #[test]
    fn test_identifier_conflict_is_strict_by_default() {
        let a = RawSource::new("a", 1, vec![RawRecord::new("Acme Corp").with_external_id(LEI)]);
        let b = RawSource::new("b", 2, vec![RawRecord::new("Zenith Ltd").with_external_id(LEI)]);

        let err = consolidate(&[a.clone(), b.clone()], &company());
        assert!(matches!(err, Err(Error::Validation(msg)) if msg.contains(LEI)));

        let relaxed = company().with_strict_identifier_names(false);
        let built = consolidate(&[a, b], &relaxed).unwrap();
        assert_eq!(built.table.len(), 1);
        assert_eq!(built.table.records()[0].display_name, "Acme Corp");
        assert_eq!(built.report.identifier_conflicts.len(), 1);
    }

    #[test]
    fn test_same_name_with_distinct_identifiers_stays_apart() {
        let src = RawSource::new(
            "gleif",
            1,
            vec![
                RawRecord::new("Acme Holdings Ltd")
                    .with_context("jurisdiction", "US")
                    .with_external_id("5493000000000000AA11"),
                RawRecord::new("Acme Holdings Ltd")
                    .with_context("jurisdiction", "US")
                    .with_external_id("5493000000000000BB22"),
                RawRecord::new("Acme Holdings").with_context("jurisdiction", "US"),
            ],
        );
        let built = consolidate(&[src.clone()], &company()).unwrap();
        assert_eq!(built.table.len(), 3);
        assert_eq!(built.report.mixed_identifier_groups.len(), 1);
        assert_eq!(
            built.report.mixed_identifier_groups[0].external_ids,
            vec!["5493000000000000AA11".to_string(), "5493000000000000BB22".to_string()]
        );

        let generator = IdGenerator::new(&EntityProfile::company());
        for ext in ["5493000000000000AA11", "5493000000000000BB22"] {
            let id = generator.external_id_for(ext).unwrap().unwrap();
            let record = built.table.get(&id).unwrap();
            assert_eq!(record.external_id.as_deref(), Some(ext));
        }
        let unidentified: Vec<_> = built.table.iter().filter(|r| r.external_id.is_none()).collect();
        assert_eq!(unidentified.len(), 1);
        assert_eq!(
            unidentified[0].entity_id,
            generator.id_for("acme holdings", &unidentified[0].context_fields, None).unwrap()
        );

        let by_identifier = ConsolidationConfig::new(
            EntityProfile::company().with_id_strategy(IdStrategy::ExternalIdentifier),
        );
        assert_eq!(consolidate(&[src], &by_identifier).unwrap().table.len(), 3);
    }

    #[test]
    fn test_indistinguishable_ids_are_a_validation_error() {
        let record = |name: &str| EntityRecord {
            entity_id: EntityId::new("0123456789abcdef"),
            display_name: name.to_string(),
            match_key: name.to_lowercase(),
            slug: name.to_lowercase(),
            alternate_names: Vec::new(),
            context_fields: BTreeMap::new(),
            external_id: None,
            source: "a".to_string(),
            source_priority: 1,
        };
        let err = check_collisions(&[record("Acme"), record("Zenith")]);
        assert!(matches!(err, Err(Error::Validation(msg)) if msg.contains("Acme") && msg.contains("Zenith")));
    }

    #[test]
    fn test_new_unrelated_source_keeps_ids() {
        let a = RawSource::new("a", 1, vec![RawRecord::new("Acme Corp"), RawRecord::new("Vale SA")]);
        let before = consolidate(&[a.clone()], &company()).unwrap();

        let c = RawSource::new("c", 3, vec![RawRecord::new("Zenith Mining")]);
        let after = consolidate(&[a, c], &company()).unwrap();

        for record in before.table.iter() {
            assert!(after.table.get(&record.entity_id).is_some());
        }
        assert_eq!(after.table.len(), 3);
        assert_eq!(ids(&before).len(), 2);
    }
}
