//! Candidate blocking.
//!
//! Narrows the canonical table to a small candidate set before scoring.
//! Predicates run in a fixed order:
//!
//! 1. Exact key lookup when the raw query matches an identifier format
//! 2. Context filter per hint, skipped when it would empty the set
//! 3. Prefix filter on match keys and alternate names, skipped when it
//!    would empty the set
//!
//! Prefix keys are one-edit tolerant: each key is indexed under every
//! string obtained by deleting one character from its first `N + 1`
//! non-space characters. A single typo inside the prefix therefore still
//! shares at least one key with the true record.
//!
//! Oversized sets are truncated deterministically: records whose match key
//! or alternate name equals the query come first, then lexicographic
//! `(match_key, entity_id)` order. Truncation can cost recall for fuzzy
//! matches that sort late but never drops a verbatim match, even when the
//! verbatim matches alone exceed the cap.

use super::normalize::Normalizer;
use crate::config::BlockingConfig;
use crate::models::{
    CanonicalTable, EntityProfile, EntityRecord, ExactKeyRule, KeySource, ResolveHints,
    canonical_identifier,
};
use crate::observability::{BLOCKING_TRUNCATED_TOTAL, CANDIDATES};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Result of blocking one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    /// Table positions of the candidates, in deterministic order.
    pub indices: Vec<usize>,
    /// Name of the exact-key rule that produced the set, if any.
    pub exact_rule: Option<String>,
    /// Size before truncation to the cap.
    pub total_before_truncation: usize,
}

impl CandidateSet {
    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns `true` if the set was truncated to the cap.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.total_before_truncation > self.indices.len()
    }
}

/// Exact-key postings for one rule.
#[derive(Debug, Clone)]
struct ExactIndex {
    rule: ExactKeyRule,
    postings: HashMap<String, Vec<usize>>,
}

/// Blocking index over a [`CanonicalTable`].
///
/// The index stores table positions only; pass the same table it was built
/// from to [`Self::records`].
#[derive(Debug, Clone)]
pub struct BlockingIndex {
    config: BlockingConfig,
    normalizer: Normalizer,
    len: usize,
    /// Normalized alternate names per record.
    alias_keys: Vec<Vec<String>>,
    /// Position of each record in `(match_key, entity_id)` order.
    rank: Vec<usize>,
    exact: Vec<ExactIndex>,
    /// Full match key or alias key -> records.
    keys: HashMap<String, Vec<usize>>,
    /// One-edit prefix key -> records. Keys shorter than the prefix length
    /// are indexed under their whole compact form.
    prefixes: HashMap<String, Vec<usize>>,
    /// Context field -> upper-cased value -> records.
    context: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl BlockingIndex {
    /// Builds the index for a table under a profile.
    #[must_use]
    pub fn build(table: &CanonicalTable, profile: &EntityProfile, config: BlockingConfig) -> Self {
        let normalizer = Normalizer::new(profile);
        let prefix_len = config.prefix_len.max(1);

        let mut order: Vec<usize> = (0..table.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&table.records()[a], &table.records()[b]);
            ra.match_key
                .cmp(&rb.match_key)
                .then_with(|| ra.entity_id.cmp(&rb.entity_id))
        });
        let mut rank = vec![0; table.len()];
        for (pos, idx) in order.into_iter().enumerate() {
            rank[idx] = pos;
        }

        let mut exact: Vec<ExactIndex> = profile
            .exact_key_rules
            .iter()
            .map(|rule| ExactIndex {
                rule: rule.clone(),
                postings: HashMap::new(),
            })
            .collect();
        let mut alias_keys = Vec::with_capacity(table.len());
        let mut keys: HashMap<String, Vec<usize>> = HashMap::new();
        let mut prefixes: HashMap<String, Vec<usize>> = HashMap::new();
        let mut context: HashMap<String, HashMap<String, Vec<usize>>> = HashMap::new();

        for (idx, record) in table.iter().enumerate() {
            let aliases: Vec<String> = record
                .alternate_names
                .iter()
                .map(|name| normalizer.normalize_match(name))
                .filter(|key| !key.is_empty() && *key != record.match_key)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let mut record_prefixes = BTreeSet::new();
            for key in std::iter::once(&record.match_key).chain(aliases.iter()) {
                keys.entry(key.clone()).or_default().push(idx);
                let blocking_keys = prefix_keys(key, prefix_len);
                if blocking_keys.is_empty() {
                    record_prefixes.insert(compact(key, prefix_len));
                } else {
                    record_prefixes.extend(blocking_keys);
                }
            }
            record_prefixes.remove("");
            for prefix in record_prefixes {
                prefixes.entry(prefix).or_default().push(idx);
            }

            for (field, value) in &record.context_fields {
                let value = canonical_identifier(value);
                if value.is_empty() {
                    continue;
                }
                context
                    .entry(field.clone())
                    .or_default()
                    .entry(value)
                    .or_default()
                    .push(idx);
            }

            for entry in &mut exact {
                if let Some(value) = identifier_of(record, &entry.rule.source) {
                    entry.postings.entry(value).or_default().push(idx);
                }
            }

            alias_keys.push(aliases);
        }

        for postings in keys.values_mut() {
            postings.dedup();
        }

        tracing::debug!(
            records = table.len(),
            prefix_keys = prefixes.len(),
            exact_rules = exact.len(),
            "Built blocking index"
        );

        Self {
            config,
            normalizer,
            len: table.len(),
            alias_keys,
            rank,
            exact,
            keys,
            prefixes,
            context,
        }
    }

    /// Number of indexed records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the index is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The blocking configuration.
    #[must_use]
    pub const fn config(&self) -> &BlockingConfig {
        &self.config
    }

    /// Normalized alternate names of the record at `idx`.
    #[must_use]
    pub fn alias_keys(&self, idx: usize) -> &[String] {
        self.alias_keys.get(idx).map_or(&[], Vec::as_slice)
    }

    /// Resolves candidate positions to records of `table`.
    #[must_use]
    pub fn records<'t>(&self, table: &'t CanonicalTable, set: &CandidateSet) -> Vec<&'t EntityRecord> {
        set.indices.iter().filter_map(|&idx| table.at(idx)).collect()
    }

    /// Runs exact-key lookup on the raw query text.
    ///
    /// Returns the rule name and the matching records, narrowed by hints
    /// when that leaves at least one record. `None` when no rule matches the
    /// query format or no record carries the identifier.
    #[must_use]
    pub fn exact_lookup(&self, raw_query: &str, hints: &ResolveHints) -> Option<(String, Vec<usize>)> {
        for entry in &self.exact {
            let Some(key) = entry.rule.key_for(raw_query) else {
                continue;
            };
            let Some(hits) = entry.postings.get(&key) else {
                continue;
            };
            let mut hits = hits.clone();
            self.sort_by_rank(&mut hits);
            let narrowed = self.apply_context(hits, hints);
            tracing::debug!(rule = %entry.rule.name, hits = narrowed.len(), "Exact key lookup hit");
            return Some((entry.rule.name.clone(), narrowed));
        }
        None
    }

    /// Blocks a query through all predicates.
    ///
    /// `raw_query` is consulted for exact-key formats; `query_match_key` is
    /// the match-normalized query. An empty match key yields no candidates.
    #[must_use]
    pub fn block(&self, raw_query: &str, query_match_key: &str, hints: &ResolveHints) -> CandidateSet {
        if let Some((rule, indices)) = self.exact_lookup(raw_query, hints) {
            let total = indices.len();
            return self.finish(indices, &HashSet::new(), total, Some(rule));
        }
        self.candidates(query_match_key, hints)
    }

    /// Blocks a match-normalized query through the context and prefix
    /// predicates.
    #[must_use]
    pub fn candidates(&self, query_match_key: &str, hints: &ResolveHints) -> CandidateSet {
        if query_match_key.trim().is_empty() || self.len == 0 {
            return CandidateSet::default();
        }

        let all: Vec<usize> = (0..self.len).collect();
        let restricted = self.apply_context(all, hints);

        let prefix_len = self.config.prefix_len.max(1);
        let mut query_keys = prefix_keys(query_match_key, prefix_len);
        let narrowed = if query_keys.is_empty() {
            restricted
        } else {
            // Records with short keys are reachable through the query's
            // shorter leading substrings.
            let head = compact(query_match_key, prefix_len);
            query_keys.extend(head.char_indices().skip(1).map(|(i, _)| head[..i].to_string()));

            let mut hit: HashSet<usize> = HashSet::new();
            for key in &query_keys {
                if let Some(postings) = self.prefixes.get(key) {
                    hit.extend(postings.iter().copied());
                }
            }
            let filtered: Vec<usize> = restricted.iter().copied().filter(|i| hit.contains(i)).collect();
            if filtered.is_empty() {
                tracing::debug!(query = %query_match_key, "Prefix filter empty, falling back");
                restricted
            } else {
                filtered
            }
        };

        let allowed: HashSet<usize> = narrowed.iter().copied().collect();
        let pinned: HashSet<usize> = self
            .keys
            .get(query_match_key)
            .map(|hits| hits.iter().copied().filter(|i| allowed.contains(i)).collect())
            .unwrap_or_default();

        let total = narrowed.len();
        self.finish(narrowed, &pinned, total, None)
    }

    /// Applies each hint as a narrowing filter, skipping any that would
    /// leave nothing.
    fn apply_context(&self, mut current: Vec<usize>, hints: &ResolveHints) -> Vec<usize> {
        for (field, value) in hints.context_pairs() {
            let value = canonical_identifier(value);
            let Some(postings) = self.context.get(field).and_then(|values| values.get(&value)) else {
                tracing::debug!(field, value = %value, "Context hint matches nothing, ignored");
                continue;
            };
            let wanted: HashSet<usize> = postings.iter().copied().collect();
            let next: Vec<usize> = current.iter().copied().filter(|i| wanted.contains(i)).collect();
            if next.is_empty() {
                tracing::debug!(field, value = %value, "Context hint would empty candidates, ignored");
            } else {
                current = next;
            }
        }
        current
    }

    fn sort_by_rank(&self, indices: &mut [usize]) {
        indices.sort_by_key(|&idx| self.rank.get(idx).copied().unwrap_or(usize::MAX));
    }

    fn finish(
        &self,
        mut indices: Vec<usize>,
        pinned: &HashSet<usize>,
        total: usize,
        exact_rule: Option<String>,
    ) -> CandidateSet {
        indices.sort_by_key(|idx| {
            (
                !pinned.contains(idx),
                self.rank.get(*idx).copied().unwrap_or(usize::MAX),
            )
        });
        let cap = self.config.max_candidates.max(1).max(pinned.len());
        if indices.len() > cap {
            indices.truncate(cap);
            tracing::warn!(
                total,
                cap,
                "Candidate set exceeds cap, truncated in match_key order"
            );
            metrics::counter!(BLOCKING_TRUNCATED_TOTAL).increment(1);
        }
        metrics::histogram!(CANDIDATES).record(indices.len() as f64);
        CandidateSet {
            indices,
            exact_rule,
            total_before_truncation: total,
        }
    }

    /// Normalizer used for alias keys.
    #[must_use]
    pub const fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }
}

/// First `n` non-space characters of `key`.
fn compact(key: &str, n: usize) -> String {
    key.chars().filter(|c| !c.is_whitespace()).take(n).collect()
}

/// One-edit tolerant prefix keys of `key`.
///
/// Empty when `key` has fewer than `prefix_len` non-space characters.
fn prefix_keys(key: &str, prefix_len: usize) -> BTreeSet<String> {
    let window: Vec<char> = key
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(prefix_len + 1)
        .collect();
    let mut keys = BTreeSet::new();
    if window.len() < prefix_len {
        return keys;
    }
    keys.insert(window[..prefix_len].iter().collect());
    if window.len() > prefix_len {
        for skip in 0..window.len() {
            keys.insert(
                window
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip)
                    .map(|(_, c)| *c)
                    .collect(),
            );
        }
    }
    keys
}

fn identifier_of(record: &EntityRecord, source: &KeySource) -> Option<String> {
    let raw = match source {
        KeySource::ExternalId => record.external_id.as_deref(),
        KeySource::Context(field) => record.context(field),
    }?;
    let value = canonical_identifier(raw);
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityId;
    use std::collections::BTreeMap;

    fn rec(id: &str, key: &str, aliases: &[&str], ctx: &[(&str, &str)], ext: Option<&str>) -> EntityRecord {
        EntityRecord {
            entity_id: EntityId::new(id),
            display_name: key.to_string(),
            match_key: key.to_string(),
            slug: key.replace(' ', "-"),
            alternate_names: aliases.iter().map(|a| (*a).to_string()).collect(),
            context_fields: ctx
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            external_id: ext.map(str::to_string),
            source: "test".to_string(),
            source_priority: 1,
        }
    }

    fn table() -> CanonicalTable {
        CanonicalTable::new(vec![
            rec("1", "acme", &["Acme Holdings"], &[("jurisdiction", "US")], Some("5493001KJTIIGC8Y1R12")),
            rec("2", "ace hardware", &[], &[("jurisdiction", "US")], None),
            rec("3", "bhp group", &["BHP"], &[("jurisdiction", "AU"), ("ticker", "BHP")], None),
            rec("4", "bhp group", &["BHP"], &[("jurisdiction", "GB"), ("ticker", "BHP")], None),
            rec("5", "zenith", &[], &[("jurisdiction", "US")], None),
            rec("6", "3m", &[], &[("jurisdiction", "US")], None),
        ])
        .unwrap()
    }

    fn index(table: &CanonicalTable) -> BlockingIndex {
        BlockingIndex::build(table, &EntityProfile::company(), BlockingConfig::default())
    }

    fn ids(table: &CanonicalTable, set: &CandidateSet) -> Vec<String> {
        set.indices
            .iter()
            .filter_map(|&i| table.at(i))
            .map(|r| r.entity_id.to_string())
            .collect()
    }

    #[test]
    fn test_prefix_keys_tolerate_one_edit() {
        let acme = prefix_keys("acme", 3);
        let typo = prefix_keys("acem", 3);
        assert!(acme.intersection(&typo).next().is_some());
        assert!(prefix_keys("ab", 3).is_empty());
        assert_eq!(prefix_keys("abc", 3).into_iter().collect::<Vec<_>>(), vec!["abc"]);
        assert_eq!(compact("a b cd", 3), "abc");
    }

    #[test]
    fn test_short_record_keys_reachable_from_longer_query() {
        let table = table();
        let index = index(&table);
        let set = index.candidates("3m co", &ResolveHints::default());
        assert!(ids(&table, &set).contains(&"6".to_string()));

        let set = index.candidates("bhp group", &ResolveHints::default());
        assert!(!ids(&table, &set).contains(&"6".to_string()));
    }

    #[test]
    fn test_typo_keeps_true_match() {
        let table = table();
        let index = index(&table);
        let set = index.candidates("acem", &ResolveHints::default());
        let found = ids(&table, &set);
        assert!(found.contains(&"1".to_string()));
        assert!(!found.contains(&"5".to_string()));
    }

    #[test]
    fn test_context_hint_narrows() {
        let table = table();
        let index = index(&table);
        let hints = ResolveHints::new().with_jurisdiction("au");
        let set = index.candidates("bhp", &hints);
        assert_eq!(ids(&table, &set), vec!["3"]);
    }

    #[test]
    fn test_context_hint_never_poisons() {
        let table = table();
        let index = index(&table);
        let hints = ResolveHints::new().with_jurisdiction("JP");
        let set = index.candidates("bhp group", &hints);
        assert_eq!(ids(&table, &set), vec!["3", "4"]);
    }

    #[test]
    fn test_short_query_skips_prefix_filter() {
        let table = table();
        let index = index(&table);
        let set = index.candidates("3m", &ResolveHints::default());
        assert_eq!(set.len(), table.len());
        assert_eq!(ids(&table, &set)[0], "6");
    }

    #[test]
    fn test_empty_query_has_no_candidates() {
        let table = table();
        let index = index(&table);
        assert!(index.candidates("", &ResolveHints::default()).is_empty());
        assert!(index.block("   ", "", &ResolveHints::default()).is_empty());
    }

    #[test]
    fn test_exact_lookup_by_external_id() {
        let table = table();
        let index = index(&table);
        let set = index.block("5493001kjtiigc8y1r12", "5493001kjtiigc8y1r12", &ResolveHints::default());
        assert_eq!(set.exact_rule.as_deref(), Some("lei"));
        assert_eq!(ids(&table, &set), vec!["1"]);
    }

    #[test]
    fn test_exact_ticker_lookup_respects_hints() {
        let table = table();
        let index = index(&table);

        let set = index.block("BHP", "bhp", &ResolveHints::default());
        assert_eq!(set.exact_rule.as_deref(), Some("ticker"));
        assert_eq!(set.len(), 2);

        let hints = ResolveHints::new().with_jurisdiction("GB");
        let set = index.block("BHP", "bhp", &hints);
        assert_eq!(ids(&table, &set), vec!["4"]);
    }

    #[test]
    fn test_truncation_is_deterministic_and_keeps_verbatim_match() {
        let mut records: Vec<EntityRecord> = (0..50)
            .map(|i| rec(&format!("id{i:02}"), &format!("acme {i:02}"), &[], &[], None))
            .collect();
        records.push(rec("zz", "acme zz", &[], &[], None));
        let table = CanonicalTable::new(records).unwrap();
        let config = BlockingConfig::default().with_max_candidates(10);
        let index = BlockingIndex::build(&table, &EntityProfile::generic("test"), config);

        let set = index.candidates("acme zz", &ResolveHints::default());
        assert!(set.truncated());
        assert_eq!(set.total_before_truncation, 51);
        let found = ids(&table, &set);
        assert_eq!(found.len(), 10);
        assert_eq!(found[0], "zz");
        assert_eq!(found[1], "id00");

        let again = index.candidates("acme zz", &ResolveHints::default());
        assert_eq!(set, again);
    }

    #[test]
    fn test_alias_keys_are_normalized() {
        let table = table();
        let index = index(&table);
        assert_eq!(index.alias_keys(0), &["acme holdings".to_string()]);
        assert_eq!(index.alias_keys(2), &["bhp".to_string()]);
        assert!(index.alias_keys(99).is_empty());
    }
}
