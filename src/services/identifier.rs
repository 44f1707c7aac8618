//! Deterministic entity identifiers.
//!
//! An `entity_id` is the first 16 hex characters of
//! `SHA256("{namespace}|{key}")`. It depends only on content, never on row
//! position, load order or record count.

use crate::models::{EntityId, EntityProfile, IdStrategy, canonical_identifier};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Length of a generated identifier in hex characters.
pub const ID_HEX_LEN: usize = 16;

/// Separator between namespace and key in the hashed payload.
const SEPARATOR: char = '|';

/// Generates the identifier for `match_key` within `namespace`.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `namespace` or `match_key` is empty.
/// An empty key never yields a degenerate identifier.
///
/// # Example
///
/// ```rust
/// use entityidentity::services::generate_id;
///
/// let a = generate_id("company", "apple").unwrap();
/// let b = generate_id("metal", "apple").unwrap();
/// assert_eq!(a.as_str().len(), 16);
/// assert_ne!(a, b);
/// assert!(generate_id("company", "  ").is_err());
/// ```
pub fn generate_id(namespace: &str, match_key: &str) -> Result<EntityId> {
    if namespace.trim().is_empty() {
        return Err(Error::Validation(
            "cannot generate an entity_id without a namespace".to_string(),
        ));
    }
    if match_key.trim().is_empty() {
        return Err(Error::Validation(format!(
            "cannot generate an entity_id in namespace '{namespace}' from an empty match_key"
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([SEPARATOR as u8]);
    hasher.update(match_key.as_bytes());
    let digest = hex::encode(hasher.finalize());
    Ok(EntityId::new(&digest[..ID_HEX_LEN]))
}

/// Identifier generator bound to one entity profile.
///
/// Extends the plain match-key hash with the profile's identity context so
/// that same-named entities in different jurisdictions (or clusters) get
/// different identifiers.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    namespace: String,
    identity_context_keys: Vec<String>,
    strategy: IdStrategy,
}

impl IdGenerator {
    /// Creates a generator for a profile.
    #[must_use]
    pub fn new(profile: &EntityProfile) -> Self {
        Self {
            namespace: profile.namespace.clone(),
            identity_context_keys: profile.identity_context_keys.clone(),
            strategy: profile.id_strategy,
        }
    }

    /// The namespace mixed into every identifier.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds the identity key: `match_key` followed by `|key=value` for each
    /// identity context key present, in sorted key order.
    ///
    /// Context values are trimmed and upper-cased so `"au"` and `"AU"` agree.
    #[must_use]
    pub fn identity_key(&self, match_key: &str, context: &BTreeMap<String, String>) -> String {
        let mut key = match_key.to_string();
        for name in &self.identity_context_keys {
            let Some(value) = context.get(name).map(|v| canonical_identifier(v)) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            key.push(SEPARATOR);
            key.push_str(name);
            key.push('=');
            key.push_str(&value);
        }
        key
    }

    /// Generates the identifier for a surviving record.
    ///
    /// With [`IdStrategy::ExternalIdentifier`] a non-blank `external_id` is
    /// hashed instead of the identity key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `match_key` is empty.
    pub fn id_for(
        &self,
        match_key: &str,
        context: &BTreeMap<String, String>,
        external_id: Option<&str>,
    ) -> Result<EntityId> {
        if match_key.trim().is_empty() {
            return generate_id(&self.namespace, match_key);
        }
        if self.strategy == IdStrategy::ExternalIdentifier {
            if let Some(id) = external_id.and_then(|ext| self.external_id_for(ext)) {
                return id;
            }
        }
        generate_id(&self.namespace, &self.identity_key(match_key, context))
    }

    /// Generates the identifier from an external identifier alone.
    ///
    /// Returns `None` when `external_id` is blank.
    #[must_use]
    pub fn external_id_for(&self, external_id: &str) -> Option<Result<EntityId>> {
        let ext = canonical_identifier(external_id);
        (!ext.is_empty()).then(|| generate_id(&self.namespace, &format!("ext={ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_stable() {
        let first = generate_id("company", "apple").unwrap();
        let second = generate_id("company", "apple").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), ID_HEX_LEN);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_payload_is_namespace_pipe_key() {
        let mut hasher = Sha256::new();
        hasher.update(b"a|b");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(generate_id("a", "b").unwrap().as_str(), &expected[..16]);
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        assert_ne!(
            generate_id("company", "apple").unwrap(),
            generate_id("place", "apple").unwrap()
        );
    }

    #[test]
    fn test_empty_key_fails_loudly() {
        assert!(matches!(generate_id("company", ""), Err(Error::Validation(_))));
        assert!(matches!(generate_id("", "apple"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_identity_context_separates_jurisdictions() {
        let ids = IdGenerator::new(&EntityProfile::company());
        let au = BTreeMap::from([("jurisdiction".to_string(), "au".to_string())]);
        let gb = BTreeMap::from([("jurisdiction".to_string(), "GB".to_string())]);

        assert_eq!(ids.identity_key("bhp", &au), "bhp|jurisdiction=AU");
        assert_ne!(
            ids.id_for("bhp", &au, None).unwrap(),
            ids.id_for("bhp", &gb, None).unwrap()
        );
        assert_eq!(ids.identity_key("bhp", &BTreeMap::new()), "bhp");
    }

    #[test]
    fn test_non_identity_context_is_ignored() {
        let ids = IdGenerator::new(&EntityProfile::company());
        let ctx = BTreeMap::from([("ticker".to_string(), "AAPL".to_string())]);
        assert_eq!(
            ids.id_for("apple", &ctx, None).unwrap(),
            generate_id("company", "apple").unwrap()
        );
    }

    #[test]
    fn test_external_identifier_strategy() {
        let profile = EntityProfile::company().with_id_strategy(IdStrategy::ExternalIdentifier);
        let ids = IdGenerator::new(&profile);
        let ctx = BTreeMap::new();

        let by_lei = ids.id_for("apple", &ctx, Some("hwupkr0mpou8fgxbt394")).unwrap();
        let renamed = ids.id_for("apple computer", &ctx, Some("HWUPKR0MPOU8FGXBT394")).unwrap();
        assert_eq!(by_lei, renamed);

        let fallback = ids.id_for("apple", &ctx, Some("  ")).unwrap();
        assert_eq!(fallback, generate_id("company", "apple").unwrap());

        let plain = IdGenerator::new(&EntityProfile::company());
        assert_eq!(plain.external_id_for(" hwupkr0mpou8fgxbt394").unwrap().unwrap(), by_lei);
        assert!(plain.external_id_for("  ").is_none());
    }
}
