//! Persistence for jobs, checkpoints and portable archives.
//!
//! Two kinds of `SQLite` file are managed here:
//!
//! | File | Type | Contents |
//! |------|------|----------|
//! | `<data_dir>/porter.db` | [`SqliteStateStore`] | job records and checkpoints |
//! | `<export_dir>/export-<id>.porter.db` | [`ArchiveRepository`] | archive metadata and records |
//!
//! The orchestrator only sees the [`JobStore`] and [`CheckpointStore`] traits.

mod archive;
pub mod sqlite;
mod state;
mod traits;

pub use archive::{ArchiveMetadata, ArchiveRecord, ArchiveRepository};
pub use state::SqliteStateStore;
pub use traits::{CheckpointStore, JobStore};
