//! Duplicate clustering over normalized members.

use super::report::{IdentifierConflict, MixedIdentifierGroup};
use std::collections::{BTreeMap, BTreeSet};

/// A raw record after normalization.
///
/// Field order defines the derived ordering, which is the survivor rule:
/// lowest priority first, then match key, display name, source and the
/// remaining content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct Member {
    pub priority: u32,
    pub match_key: String,
    pub display_name: String,
    pub source: String,
    pub external_id: Option<String>,
    pub context: BTreeMap<String, String>,
    /// Display-normalized primary and alternate names.
    pub names: BTreeSet<String>,
    /// Match-normalized alternate names, excluding `match_key`.
    pub alias_keys: BTreeSet<String>,
    pub slug: String,
    /// Identity context values in profile key order; missing values are empty.
    pub identity: Vec<String>,
}

impl Member {
    /// Whether either record lists the other's match key among its
    /// alternate names.
    fn related_to(&self, other: &Self) -> bool {
        self.match_key == other.match_key
            || self.alias_keys.contains(&other.match_key)
            || other.alias_keys.contains(&self.match_key)
    }
}

/// Disjoint-set forest with path halving; roots are the smallest index so
/// the partition is reported in a stable order.
#[derive(Debug)]
pub(super) struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }

    /// Groups of member indices, each sorted, ordered by their smallest index.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..self.parent.len() {
            let root = self.find(idx);
            by_root.entry(root).or_default().push(idx);
        }
        by_root.into_values().collect()
    }
}

/// Clustering output.
#[derive(Debug, Default)]
pub(super) struct Clusters {
    pub groups: Vec<Vec<usize>>,
    pub conflicts: Vec<IdentifierConflict>,
    pub mixed: Vec<MixedIdentifierGroup>,
    /// Members of mixed groups that carry an identifier. Their clusters
    /// are told apart by that identifier rather than by the shared key.
    pub identified: BTreeSet<usize>,
}

/// Groups sorted members into duplicate clusters.
///
/// 1. Members sharing an external identifier are merged. Unrelated names
///    under one identifier are reported as conflicts.
/// 2. Members sharing `(match_key, identity)` are merged, unless the group
///    carries several distinct identifiers; then only identifier-less
///    members merge with each other.
pub(super) fn cluster(members: &[Member]) -> Clusters {
    let mut sets = DisjointSet::new(members.len());
    let mut out = Clusters::default();

    let mut by_ext: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, member) in members.iter().enumerate() {
        if let Some(ext) = member.external_id.as_deref() {
            by_ext.entry(ext).or_default().push(idx);
        }
    }
    for (ext, idxs) in &by_ext {
        let unrelated = idxs.iter().enumerate().any(|(i, &a)| {
            idxs[i + 1..]
                .iter()
                .any(|&b| !members[a].related_to(&members[b]))
        });
        if unrelated {
            let names: BTreeSet<String> = idxs
                .iter()
                .map(|&i| format!("{}: {}", members[i].source, members[i].display_name))
                .collect();
            out.conflicts.push(IdentifierConflict {
                external_id: (*ext).to_string(),
                names: names.into_iter().collect(),
            });
        }
        for pair in idxs.windows(2) {
            sets.union(pair[0], pair[1]);
        }
    }

    let mut by_key: BTreeMap<(&str, &[String]), Vec<usize>> = BTreeMap::new();
    for (idx, member) in members.iter().enumerate() {
        by_key
            .entry((member.match_key.as_str(), member.identity.as_slice()))
            .or_default()
            .push(idx);
    }
    for ((match_key, _), idxs) in &by_key {
        let ids: BTreeSet<&str> = idxs
            .iter()
            .filter_map(|&i| members[i].external_id.as_deref())
            .collect();
        let mergeable: Vec<usize> = if ids.len() <= 1 {
            idxs.clone()
        } else {
            out.mixed.push(MixedIdentifierGroup {
                match_key: (*match_key).to_string(),
                external_ids: ids.iter().map(|s| (*s).to_string()).collect(),
            });
            out.identified.extend(
                idxs.iter()
                    .copied()
                    .filter(|&i| members[i].external_id.is_some()),
            );
            idxs.iter()
                .copied()
                .filter(|&i| members[i].external_id.is_none())
                .collect()
        };
        for pair in mergeable.windows(2) {
            sets.union(pair[0], pair[1]);
        }
    }

    out.groups = sets.groups();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(source: &str, priority: u32, key: &str, ext: Option<&str>) -> Member {
        Member {
            priority,
            match_key: key.to_string(),
            display_name: key.to_string(),
            source: source.to_string(),
            external_id: ext.map(str::to_string),
            context: BTreeMap::new(),
            names: BTreeSet::from([key.to_string()]),
            alias_keys: BTreeSet::new(),
            slug: key.to_string(),
            identity: Vec::new(),
        }
    }

    #[test]
    fn test_disjoint_set_groups() {
        let mut sets = DisjointSet::new(5);
        sets.union(3, 1);
        sets.union(4, 3);
        assert_eq!(sets.groups(), vec![vec![0], vec![1, 3, 4], vec![2]]);
    }

    #[test]
    fn test_shared_identifier_merges_different_keys_as_conflict() {
        let mut members = vec![
            member("a", 1, "acme", Some("X1")),
            member("b", 2, "zenith", Some("X1")),
        ];
        members.sort();
        let clusters = cluster(&members);
        assert_eq!(clusters.groups, vec![vec![0, 1]]);
        assert_eq!(clusters.conflicts.len(), 1);
        assert_eq!(clusters.conflicts[0].names, vec!["a: acme", "b: zenith"]);
    }

    #[test]
    fn test_alias_relates_names_under_one_identifier() {
        let mut renamed = member("b", 2, "acme industries", Some("X1"));
        renamed.alias_keys.insert("acme".to_string());
        let members = vec![member("a", 1, "acme", Some("X1")), renamed];
        let clusters = cluster(&members);
        assert!(clusters.conflicts.is_empty());
        assert_eq!(clusters.groups.len(), 1);
    }

    #[test]
    fn test_distinct_identifiers_do_not_absorb_idless_records() {
        let members = vec![
            member("a", 1, "acme", Some("X1")),
            member("a", 1, "acme", Some("X2")),
            member("b", 2, "acme", None),
            member("c", 3, "acme", None),
        ];
        let clusters = cluster(&members);
        assert_eq!(clusters.groups, vec![vec![0], vec![1], vec![2, 3]]);
        assert_eq!(clusters.mixed.len(), 1);
        assert_eq!(clusters.mixed[0].external_ids, vec!["X1", "X2"]);
        assert_eq!(clusters.identified, BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_identity_context_splits_key_groups() {
        let mut au = member("a", 1, "bhp", None);
        au.identity = vec!["AU".to_string()];
        let mut gb = member("a", 1, "bhp", None);
        gb.identity = vec!["GB".to_string()];
        let clusters = cluster(&[au, gb]);
        assert_eq!(clusters.groups.len(), 2);
    }
}
