//! Request descriptors carried in job payloads.

use super::category::CategoryName;
use crate::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

/// A page (and optionally its descendants) selected for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    /// Page path, e.g. `about` or `docs/install`.
    pub path: String,
    /// Whether pages below `path` are included too.
    #[serde(default)]
    pub include_children: bool,
}

impl PageSelection {
    /// Returns `true` if the page at `path` is covered by this selection.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let wanted = self.path.trim_matches('/');
        let path = path.trim_matches('/');
        if path.eq_ignore_ascii_case(wanted) {
            return true;
        }
        self.include_children
            && path
                .get(..wanted.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(wanted))
            && path
                .get(wanted.len()..)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// What an export job should include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Schema version stamp of the engine that created the request.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Explicitly requested categories.
    #[serde(default)]
    pub categories: Vec<CategoryName>,
    /// Page sub-selection; non-empty forces the pages category in.
    #[serde(default)]
    pub pages: Vec<PageSelection>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl ExportRequest {
    /// Creates a request for the given categories.
    #[must_use]
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CategoryName>,
    {
        Self {
            schema_version: default_schema_version(),
            categories: categories.into_iter().map(Into::into).collect(),
            pages: Vec::new(),
        }
    }

    /// Adds a page selection.
    #[must_use]
    pub fn with_page(mut self, path: impl Into<String>, include_children: bool) -> Self {
        self.pages.push(PageSelection {
            path: path.into(),
            include_children,
        });
        self
    }

    /// Returns `true` if the page at `path` should be exported.
    ///
    /// An empty page selection means every page.
    #[must_use]
    pub fn includes_page(&self, path: &str) -> bool {
        self.pages.is_empty() || self.pages.iter().any(|p| p.matches(path))
    }
}

/// What an import job should read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Archive file name inside the export directory.
    pub archive_name: String,
    /// Schema version the requester expects the archive to carry.
    #[serde(default)]
    pub schema_version: Option<String>,
}

impl ImportRequest {
    /// Creates a request for the named archive.
    #[must_use]
    pub fn new(archive_name: impl Into<String>) -> Self {
        Self {
            archive_name: archive_name.into(),
            schema_version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("about", false, "about" => true; "exact")]
    #[test_case("About", false, "about" => true; "case insensitive")]
    #[test_case("docs", false, "docs/install" => false; "children excluded")]
    #[test_case("docs", true, "docs/install" => true; "children included")]
    #[test_case("docs", true, "docsite" => false; "prefix is not a child")]
    fn test_page_selection(path: &str, include_children: bool, candidate: &str) -> bool {
        PageSelection {
            path: path.to_string(),
            include_children,
        }
        .matches(candidate)
    }

    #[test]
    fn test_empty_selection_includes_everything() {
        let request = ExportRequest::new(["pages"]);
        assert!(request.includes_page("anything"));
        let request = request.with_page("home", false);
        assert!(request.includes_page("home"));
        assert!(!request.includes_page("contact"));
    }

    #[test]
    fn test_payload_defaults() {
        let request: ExportRequest = serde_json::from_str(r#"{"categories":["Users"]}"#).unwrap();
        assert_eq!(request.schema_version, SCHEMA_VERSION);
        assert_eq!(request.categories, vec![CategoryName::new("users")]);
        assert!(request.pages.is_empty());
    }
}
