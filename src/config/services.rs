//! Service catalog entries.

use serde::{Deserialize, Serialize};

/// Declaration of one built-in portable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Category the service owns.
    pub category: String,
    /// Parent category; empty means top-level.
    #[serde(default)]
    pub parent: String,
    /// Lower runs first among siblings.
    #[serde(default)]
    pub priority: i32,
    /// Directory under the site root; defaults to the category key.
    #[serde(default)]
    pub directory: Option<String>,
}

impl ServiceSpec {
    /// Creates a top-level service declaration.
    #[must_use]
    pub fn root(category: impl Into<String>, priority: i32) -> Self {
        Self {
            category: category.into(),
            parent: String::new(),
            priority,
            directory: None,
        }
    }

    /// Creates a child service declaration.
    #[must_use]
    pub fn child(category: impl Into<String>, parent: impl Into<String>, priority: i32) -> Self {
        Self {
            category: category.into(),
            parent: parent.into(),
            priority,
            directory: None,
        }
    }
}

/// Built-in catalog used when the config file declares no services.
#[must_use]
pub fn default_catalog() -> Vec<ServiceSpec> {
    vec![
        ServiceSpec::root("portal", 0),
        ServiceSpec::root("roles", 10),
        ServiceSpec::root("users", 20),
        ServiceSpec::child("user-profiles", "users", 0),
        ServiceSpec::root("pages", 30),
        ServiceSpec::child("page-versions", "pages", 0),
        ServiceSpec::child("page-permissions", "pages", 10),
        ServiceSpec::root("assets", 40),
    ]
}
