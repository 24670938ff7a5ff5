//! Feature Token Sets
//!
//! A [`FeatureSet`] holds the string tokens that drive conditional template
//! lines (`/// IF USE_RIM && !NO_SHADOWS`).
//!
//! # Architecture
//!
//! Tokens are kept in a sorted, deduplicated `Vec<String>`:
//!
//! - **Lookup**: O(log n) binary search
//! - **Deterministic order**: identical sets iterate and hash identically,
//!   whatever order the tokens were inserted in
//!
//! A set is built up front and only queried while a generation pass runs.
//!
//! # Negation
//!
//! Query tokens prefixed with `!` are negated: `has("!A")` holds when `A`
//! is absent.
//!
//! ```rust,ignore
//! use shadergen_core::FeatureSet;
//!
//! let features = FeatureSet::from_tokens(["RIM", "SPECULAR"]);
//! assert!(features.has_all(&["RIM", "!OUTLINE"]));
//! ```

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// An ordered set of enabled feature tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet {
    tokens: Vec<String>,
}

impl FeatureSet {
    /// Create an empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Build a set from any list of tokens; duplicates and empty tokens are dropped
    #[must_use]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        set.extend(tokens);
        set
    }

    /// Insert a token (maintains sorted order). Returns `true` if it was new.
    pub fn insert(&mut self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return false;
        }
        match self.search(token) {
            Ok(_) => false,
            Err(idx) => {
                self.tokens.insert(idx, token.to_string());
                true
            }
        }
    }

    /// Remove a token. Returns `true` if it was present.
    pub fn remove(&mut self, token: &str) -> bool {
        if let Ok(idx) = self.search(token) {
            self.tokens.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            self.insert(token.as_ref());
        }
    }

    /// Union of two sets
    #[must_use]
    pub fn merged_with(&self, other: &FeatureSet) -> FeatureSet {
        let mut result = self.clone();
        result.extend(other.iter());
        result
    }

    #[inline]
    fn search(&self, token: &str) -> Result<usize, usize> {
        self.tokens.binary_search_by(|t| t.as_str().cmp(token))
    }

    /// Raw membership test, no negation handling
    #[inline]
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.search(token).is_ok()
    }

    /// Membership test; a `!` prefix negates the query
    #[must_use]
    pub fn has(&self, token: &str) -> bool {
        match token.strip_prefix('!') {
            Some(negated) => !self.has(negated),
            None => self.contains(token),
        }
    }

    /// `true` when at least one query holds; `false` for an empty query list
    #[must_use]
    pub fn has_any<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        tokens.iter().any(|t| self.has(t.as_ref()))
    }

    /// `true` when every query holds; `true` for an empty query list
    #[must_use]
    pub fn has_all<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        tokens.iter().all(|t| self.has(t.as_ref()))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate tokens in sorted order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Compute content hash (for caching)
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        use std::hash::BuildHasher;

        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for FeatureSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tokens.hash(state);
    }
}

impl<S: AsRef<str>> FromIterator<S> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}

impl From<&[&str]> for FeatureSet {
    fn from(tokens: &[&str]) -> Self {
        Self::from_tokens(tokens.iter().copied())
    }
}
