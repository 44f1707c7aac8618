//! Text normalization for entity names.
//!
//! Three complementary forms are produced from one input:
//!
//! - **match key**: aggressive, for similarity comparison and deduplication
//! - **display name**: gentle, case and word order preserved
//! - **slug**: key/URL-safe
//!
//! All three are pure functions of their input and the profile vocabulary,
//! which is what makes `entity_id` derivation deterministic.

use crate::models::EntityProfile;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Characters that do not decompose under NFKD but have a base-alphabet spelling.
fn fold_special(c: char) -> Option<&'static str> {
    match c {
        'ß' => Some("ss"),
        'æ' => Some("ae"),
        'Æ' => Some("AE"),
        'œ' => Some("oe"),
        'Œ' => Some("OE"),
        'ø' => Some("o"),
        'Ø' => Some("O"),
        'ł' => Some("l"),
        'Ł' => Some("L"),
        'đ' => Some("d"),
        'Đ' => Some("D"),
        'þ' => Some("th"),
        'Þ' => Some("TH"),
        'ı' => Some("i"),
        _ => None,
    }
}

/// Folds text to its base alphabet: NFKD, combining marks removed,
/// special letters spelled out. Case is preserved.
#[must_use]
pub fn fold_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        match fold_special(c) {
            Some(spelled) => out.push_str(spelled),
            None => out.push(c),
        }
    }
    out
}

/// Creates a key/URL-safe slug.
///
/// Lowercased, folded, whitespace and underscores become single hyphens,
/// everything outside `[a-z0-9-]` is dropped.
///
/// # Example
///
/// ```rust
/// use entityidentity::services::slugify;
///
/// assert_eq!(slugify("Ammonium paratungstate (APT)"), "ammonium-paratungstate-apt");
/// assert_eq!(slugify("  PGM 4E "), "pgm-4e");
/// ```
#[must_use]
pub fn slugify(text: &str) -> String {
    let folded = fold_unicode(text.trim()).to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_sep = !slug.is_empty();
        } else if c.is_ascii_alphanumeric() {
            if pending_sep {
                slug.push('-');
                pending_sep = false;
            }
            slug.push(c);
        }
    }
    slug
}

/// Normalizer configured from an [`EntityProfile`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    suffixes: HashSet<String>,
    allowed_punctuation: Vec<char>,
}

impl Normalizer {
    /// Creates a normalizer from a profile's vocabulary.
    #[must_use]
    pub fn new(profile: &EntityProfile) -> Self {
        Self {
            suffixes: profile
                .legal_suffixes
                .iter()
                .map(|s| s.trim().to_lowercase().replace('.', ""))
                .filter(|s| !s.is_empty())
                .collect(),
            allowed_punctuation: profile.match_allowed_punctuation.clone(),
        }
    }

    /// Returns `true` if `token` (any case, periods ignored) is a legal suffix.
    fn is_suffix(&self, token: &str) -> bool {
        let bare: String = token
            .chars()
            .filter(|c| *c != '.')
            .flat_map(char::to_lowercase)
            .collect();
        self.suffixes.contains(&bare)
    }

    /// Normalizes text into a match key.
    ///
    /// Steps:
    /// 1. Unicode fold to the base alphabet, lowercase
    /// 2. Periods and apostrophes are deleted (`"s.a."` -> `"sa"`)
    /// 3. Other punctuation outside the allow-list becomes whitespace
    /// 4. Trailing legal suffixes are stripped as whole tokens, keeping at
    ///    least one token
    /// 5. Whitespace is collapsed
    ///
    /// Empty or whitespace-only input yields an empty string, which callers
    /// must treat as unresolvable.
    ///
    /// # Example
    ///
    /// ```rust
    /// use entityidentity::models::EntityProfile;
    /// use entityidentity::services::Normalizer;
    ///
    /// let n = Normalizer::new(&EntityProfile::company());
    /// assert_eq!(n.normalize_match("Apple Inc."), "apple");
    /// assert_eq!(n.normalize_match("Société Générale S.A."), "societe generale");
    /// assert_eq!(n.normalize_match("AT&T Corp."), "at&t");
    /// ```
    #[must_use]
    pub fn normalize_match(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let folded = fold_unicode(text).to_lowercase();
        let cleaned: String = folded
            .chars()
            .filter(|c| !matches!(c, '.' | '\'' | '\u{2019}'))
            .map(|c| {
                if c.is_alphanumeric() || self.allowed_punctuation.contains(&c) {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut tokens: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|t| t.chars().any(|c| c.is_alphanumeric() || c == '&'))
            .collect();

        while tokens.len() > 1 && tokens.last().is_some_and(|t| self.is_suffix(t)) {
            tokens.pop();
        }

        tokens.join(" ")
    }

    /// Normalizes text for display.
    ///
    /// Gentler than [`Self::normalize_match`]: case and word order are kept,
    /// commas become whitespace, trailing periods are removed from legal
    /// suffixes and from the final token, and characters outside letters,
    /// digits and `& - . ' / ( )` become whitespace.
    ///
    /// # Example
    ///
    /// ```rust
    /// use entityidentity::models::EntityProfile;
    /// use entityidentity::services::Normalizer;
    ///
    /// let n = Normalizer::new(&EntityProfile::company());
    /// assert_eq!(n.normalize_display("Tesla, Inc."), "Tesla Inc");
    /// assert_eq!(n.normalize_display("Amazon.com, Inc."), "Amazon.com Inc");
    /// assert_eq!(n.normalize_display("Société Générale"), "Societe Generale");
    /// ```
    #[must_use]
    pub fn normalize_display(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let folded = fold_unicode(text);
        let cleaned: String = folded
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '&' | '-' | '.' | '\'' | '/' | '(' | ')') {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let tokens: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|t| t.chars().any(|c| c.is_alphanumeric() || c == '&'))
            .collect();

        let last = tokens.len().saturating_sub(1);
        tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                if token.ends_with('.') && (i == last || self.is_suffix(token)) {
                    token.trim_end_matches('.')
                } else {
                    token
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Creates a slug; see [`slugify`].
    #[must_use]
    pub fn slugify(&self, text: &str) -> String {
        slugify(text)
    }
}
