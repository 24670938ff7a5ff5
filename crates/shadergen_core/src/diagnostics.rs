//! Diagnostic Collection
//!
//! Generation keeps going after most errors. Each one is recorded here as a
//! `(message, line)` pair so the caller can surface the whole list at once,
//! and is also forwarded to the `log` facade at the moment it is recorded.

use std::fmt;

use crate::errors::ShaderGenError;

/// A single recorded error with its optional template line number (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub error: ShaderGenError,
    pub line: Option<usize>,
}

impl Diagnostic {
    #[must_use]
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.error.is_fatal()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} @ line {line}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Ordered list of diagnostics for one generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records an error at a template line.
    pub fn push(&mut self, error: ShaderGenError, line: usize) {
        self.record(error, Some(line));
    }

    /// Records an error with no line attached.
    pub fn push_unlocated(&mut self, error: ShaderGenError) {
        self.record(error, None);
    }

    fn record(&mut self, error: ShaderGenError, line: Option<usize>) {
        let diagnostic = Diagnostic { error, line };
        if diagnostic.is_fatal() {
            log::error!("{diagnostic}");
        } else {
            log::warn!("{diagnostic}");
        }
        self.entries.push(diagnostic);
    }

    /// Appends every entry of `other`, keeping order. Entries are not logged again.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    #[inline]
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_fatal)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// `(message, line)` pairs, the form surfaced to users.
    #[must_use]
    pub fn messages(&self) -> Vec<(String, Option<usize>)> {
        self.entries
            .iter()
            .map(|d| (d.message(), d.line))
            .collect()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
