//! Entity profiles: the per-type parameters of the generic engine.
//!
//! The engine itself knows nothing about companies, metals or places. A
//! profile supplies the namespace used for identifiers, the trailing tokens to
//! strip from match keys, the punctuation that survives normalization, the
//! context fields that participate in identity, and the exact-key formats that
//! bypass scoring.

use crate::{Error, Result};
use regex::Regex;

/// Where an exact-key rule looks up the identifier on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The record's strong external identifier.
    ExternalId,
    /// A named context field (e.g. `ticker`).
    Context(String),
}

/// An identifier format that triggers exact lookup before scoring.
#[derive(Debug, Clone)]
pub struct ExactKeyRule {
    /// Rule name, used in logs and explanations.
    pub name: String,
    /// Pattern the trimmed, upper-cased query must match in full.
    pub pattern: Regex,
    /// Record attribute holding the identifier.
    pub source: KeySource,
}

impl ExactKeyRule {
    /// Creates a rule from a regex source string.
    ///
    /// The pattern is anchored on both ends if it is not already.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the pattern does not compile.
    pub fn new(name: impl Into<String>, pattern: &str, source: KeySource) -> Result<Self> {
        let anchored = anchor(pattern);
        let pattern = Regex::new(&anchored).map_err(|e| {
            Error::InvalidInput(format!("invalid exact-key pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            name: name.into(),
            pattern,
            source,
        })
    }

    /// Returns the canonical lookup form of `query` if it matches this rule.
    #[must_use]
    pub fn key_for(&self, query: &str) -> Option<String> {
        let key = canonical_identifier(query);
        if key.is_empty() || !self.pattern.is_match(&key) {
            return None;
        }
        Some(key)
    }
}

/// Canonical form of an identifier for exact lookup: trimmed, upper-cased.
#[must_use]
pub fn canonical_identifier(value: &str) -> String {
    value.trim().to_uppercase()
}

fn anchor(pattern: &str) -> String {
    let start = if pattern.starts_with('^') { "" } else { "^" };
    let end = if pattern.ends_with('$') { "" } else { "$" };
    format!("{start}{pattern}{end}")
}

/// How consolidation derives `entity_id` for a surviving record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Hash of the survivor's identity key (match key plus identity context).
    #[default]
    MatchKey,
    /// Hash of the survivor's own external identifier when it has one,
    /// falling back to [`IdStrategy::MatchKey`].
    ExternalIdentifier,
}

/// Parameters describing one entity type to the generic engine.
#[derive(Debug, Clone)]
pub struct EntityProfile {
    /// Type namespace mixed into every identifier (e.g. `"company"`).
    pub namespace: String,
    /// Trailing type markers / legal suffixes stripped as whole tokens.
    pub legal_suffixes: Vec<String>,
    /// Punctuation kept in match keys.
    pub match_allowed_punctuation: Vec<char>,
    /// Context fields that distinguish same-named entities.
    ///
    /// These form part of the duplicate-detection key and of the identity key
    /// hashed into `entity_id`.
    pub identity_context_keys: Vec<String>,
    /// Identifier formats resolved by exact lookup.
    pub exact_key_rules: Vec<ExactKeyRule>,
    /// Identifier derivation strategy.
    pub id_strategy: IdStrategy,
}

/// Legal-form suffixes recognised for companies across jurisdictions.
const COMPANY_SUFFIXES: &[&str] = &[
    "incorporated",
    "corporation",
    "inc",
    "corp",
    "co",
    "company",
    "ltd",
    "plc",
    "sa",
    "ag",
    "gmbh",
    "spa",
    "oyj",
    "kgaa",
    "sarl",
    "sro",
    "pte",
    "llc",
    "lp",
    "llp",
    "bv",
    "nv",
    "ab",
    "as",
    "oy",
    "sas",
    "limited",
    "limitada",
    "ltda",
    "jsc",
    "pty",
    "se",
];

impl EntityProfile {
    /// Creates a profile with no suffixes, rules or identity context.
    #[must_use]
    pub fn generic(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            legal_suffixes: Vec::new(),
            match_allowed_punctuation: vec!['-'],
            identity_context_keys: Vec::new(),
            exact_key_rules: Vec::new(),
            id_strategy: IdStrategy::MatchKey,
        }
    }

    /// Company profile: legal suffixes, `&`/`-` kept, jurisdiction identity,
    /// LEI and ticker exact rules.
    #[must_use]
    pub fn company() -> Self {
        let mut rules = Vec::new();
        // Literal patterns; the unit tests check both compile.
        if let Ok(rule) = ExactKeyRule::new("lei", r"[A-Z0-9]{18}[0-9]{2}", KeySource::ExternalId) {
            rules.push(rule);
        }
        if let Ok(rule) = ExactKeyRule::new(
            "ticker",
            r"[A-Z]{1,5}(\.[A-Z]{1,2})?",
            KeySource::Context("ticker".to_string()),
        ) {
            rules.push(rule);
        }

        Self {
            namespace: "company".to_string(),
            legal_suffixes: COMPANY_SUFFIXES.iter().map(|s| (*s).to_string()).collect(),
            match_allowed_punctuation: vec!['&', '-'],
            identity_context_keys: vec!["jurisdiction".to_string()],
            exact_key_rules: rules,
            id_strategy: IdStrategy::MatchKey,
        }
    }

    /// Sets the legal suffix vocabulary.
    #[must_use]
    pub fn with_legal_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legal_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the punctuation kept in match keys.
    #[must_use]
    pub fn with_allowed_punctuation(mut self, chars: &[char]) -> Self {
        self.match_allowed_punctuation = chars.to_vec();
        self
    }

    /// Sets the identity context keys.
    #[must_use]
    pub fn with_identity_context<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();
        self.identity_context_keys = keys;
        self
    }

    /// Adds an exact-key rule.
    #[must_use]
    pub fn with_exact_rule(mut self, rule: ExactKeyRule) -> Self {
        self.exact_key_rules.push(rule);
        self
    }

    /// Sets the identifier strategy.
    #[must_use]
    pub const fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Returns the default parquet file name for this profile's table.
    #[must_use]
    pub fn table_file_name(&self) -> String {
        format!("{}.parquet", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_profile_has_rules() {
        let profile = EntityProfile::company();
        assert_eq!(profile.namespace, "company");
        assert_eq!(profile.exact_key_rules.len(), 2);
        assert!(profile.legal_suffixes.iter().any(|s| s == "inc"));
        assert_eq!(profile.identity_context_keys, vec!["jurisdiction".to_string()]);
    }

    #[test]
    fn test_lei_rule_matches_full_identifier_only() {
        let profile = EntityProfile::company();
        let lei = &profile.exact_key_rules[0];
        assert_eq!(
            lei.key_for(" hwupkr0mpou8fgxbt394 ").as_deref(),
            Some("HWUPKR0MPOU8FGXBT394")
        );
        assert!(lei.key_for("apple inc").is_none());
        assert!(lei.key_for("HWUPKR0MPOU8FGXBT394X").is_none());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = ExactKeyRule::new("bad", "([", KeySource::ExternalId);
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_identity_context_is_sorted_and_deduplicated() {
        let profile = EntityProfile::generic("metal")
            .with_identity_context(["cluster", "category", "cluster"]);
        assert_eq!(
            profile.identity_context_keys,
            vec!["category".to_string(), "cluster".to_string()]
        );
    }
}
