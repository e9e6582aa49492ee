//! Case-insensitive category names.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Root container category forced into every non-empty inclusion set.
pub const PORTAL_CATEGORY: &str = "portal";

/// Category forced in when an export request carries a page sub-selection.
pub const PAGES_CATEGORY: &str = "pages";

/// Name of a category of portable data.
///
/// Equality, ordering and hashing ignore case, so `"Pages"` and `"pages"`
/// are the same category. The original spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryName(String);

impl CategoryName {
    /// Creates a category name without validation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parses a user-supplied category name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the name is blank.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("category name is empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Parses a declared parent category. Blank means "top-level".
    #[must_use]
    pub fn parent(name: &str) -> Option<Self> {
        Self::parse(name).ok()
    }

    /// The implicit top-level container category.
    #[must_use]
    pub fn portal() -> Self {
        Self::new(PORTAL_CATEGORY)
    }

    /// The pages category.
    #[must_use]
    pub fn pages() -> Self {
        Self::new(PAGES_CATEGORY)
    }

    /// Returns the name as originally spelled.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lowercased key used for storage and file names.
    ///
    /// Uses the same per-character fold as equality, so equal names share a key.
    #[must_use]
    pub fn key(&self) -> String {
        self.folded().collect()
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

impl PartialEq for CategoryName {
    fn eq(&self, other: &Self) -> bool {
        self.folded().eq(other.folded())
    }
}

impl Eq for CategoryName {}

impl PartialEq<str> for CategoryName {
    fn eq(&self, other: &str) -> bool {
        self.folded().eq(other.chars().flat_map(char::to_lowercase))
    }
}

impl PartialEq<&str> for CategoryName {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

impl Hash for CategoryName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
    }
}

impl PartialOrd for CategoryName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CategoryName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(other.folded())
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CategoryName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CategoryName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_case_insensitive_equality() {
        assert_eq!(CategoryName::new("Pages"), CategoryName::new("pages"));
        assert_eq!(CategoryName::new("PORTAL"), CategoryName::portal());
        assert!(CategoryName::new("Users") == "users");
        assert_ne!(CategoryName::new("users"), CategoryName::new("roles"));
    }

    #[test]
    fn test_case_insensitive_hashing() {
        let mut set = HashSet::new();
        set.insert(CategoryName::new("Pages"));
        assert!(set.contains(&CategoryName::new("PAGES")));
        assert!(!set.insert(CategoryName::new("pages")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display_keeps_spelling() {
        let name = CategoryName::new("PageTemplates");
        assert_eq!(name.to_string(), "PageTemplates");
        assert_eq!(name.key(), "pagetemplates");
    }

    #[test]
    fn test_equal_names_share_key() {
        let upper = CategoryName::new("ΑΣ");
        let lower = CategoryName::new("ασ");
        assert_eq!(upper, lower);
        assert_eq!(upper.key(), lower.key());
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(CategoryName::parse("   ").is_err());
        assert_eq!(CategoryName::parse(" users ").unwrap().as_str(), "users");
        assert!(CategoryName::parent("").is_none());
    }
}
