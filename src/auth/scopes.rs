//! OAuth scope sets
//!
//! Scopes travel as a space-separated string on the wire and as a JSON list
//! in the persisted token record. [`ScopeSet`] normalizes both into an
//! ordered set so coverage checks are plain set operations.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Read/write access to Google Docs documents.
pub const DOCUMENTS: &str = "https://www.googleapis.com/auth/documents";

/// Read-only access to Google Drive file metadata (document search).
pub const DRIVE_READONLY: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Scopes needed by the document tools.
pub const DOCS_SCOPES: &[&str] = &[DOCUMENTS, DRIVE_READONLY];

/// An ordered, de-duplicated set of scope identifiers.
///
/// # Examples
///
/// ```
/// use autoclerk::auth::scopes::ScopeSet;
///
/// let granted = ScopeSet::from_space_delimited("docs drive");
/// let required: ScopeSet = ["docs"].into_iter().collect();
/// assert!(granted.covers(&required));
/// assert!(!required.covers(&granted));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Creates an empty scope set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the space-delimited `scope` parameter format of RFC 6749.
    pub fn from_space_delimited(raw: &str) -> Self {
        raw.split_whitespace().collect()
    }

    /// Renders the set in the space-delimited wire format.
    pub fn to_space_delimited(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }

    /// Returns `true` when every scope in `required` is granted by `self`.
    pub fn covers(&self, required: &ScopeSet) -> bool {
        self.0.is_superset(&required.0)
    }

    /// Scopes in `required` that `self` does not grant.
    pub fn missing<'a>(&'a self, required: &'a ScopeSet) -> impl Iterator<Item = &'a str> {
        required.0.difference(&self.0).map(String::as_str)
    }

    /// Returns the union of both sets.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet(self.0.union(&other.0).cloned().collect())
    }

    /// Returns `true` if the scope is in the set.
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Returns `true` if no scope is granted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct scopes.
    ///
    /// # Examples
    ///
    /// ```
    /// use autoclerk::auth::scopes::ScopeSet;
    ///
    /// let scopes = ScopeSet::from_space_delimited("docs  drive docs");
    /// assert_eq!(scopes.len(), 2);
    /// ```
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the scopes in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ScopeSet(
            iter.into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_space_delimited())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_space_delimited_dedups_and_sorts() {
        let set = ScopeSet::from_space_delimited("  drive docs   docs ");
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_space_delimited(), "docs drive");
    }

    #[test]
    fn test_covers_requires_superset() {
        let granted: ScopeSet = ["docs"].into_iter().collect();
        let required: ScopeSet = ["docs", "drive"].into_iter().collect();
        assert!(!granted.covers(&required));
        assert_eq!(granted.missing(&required).collect::<Vec<_>>(), vec!["drive"]);
    }

    #[test]
    fn test_everything_covers_empty_requirement() {
        assert!(ScopeSet::new().covers(&ScopeSet::new()));
    }

    #[test]
    fn test_union_merges_sets() {
        let a: ScopeSet = ["docs"].into_iter().collect();
        let b: ScopeSet = ["drive"].into_iter().collect();
        let u = a.union(&b);
        assert!(u.contains("docs") && u.contains("drive"));
    }

    #[test]
    fn test_serializes_as_json_list() {
        let set: ScopeSet = DOCS_SCOPES.iter().copied().collect();
        let json = serde_json::to_string(&set).expect("serialize");
        assert!(json.starts_with('['));
        let back: ScopeSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, set);
    }

    #[test]
    fn test_empty_strings_are_dropped() {
        let set: ScopeSet = ["", "docs"].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
