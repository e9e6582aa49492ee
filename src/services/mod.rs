//! Built-in portable services.
//!
//! The default catalog (see [`crate::config::default_catalog`]) maps every
//! category to a [`DirectoryService`] over the site root.

mod directory;

pub use directory::DirectoryService;
