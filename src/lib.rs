//! # Porter
//!
//! Resumable export/import job orchestrator for portable data services.
//!
//! Porter drives a set of *portable services*, each responsible for moving one
//! category of data (pages, users, roles, ...) into or out of a portable
//! archive. The interesting part is the orchestration core:
//!
//! - discovering services from an explicit registry
//! - ordering them by a parent/child category hierarchy and priority
//! - running them under a shared cancellation token and a wall-clock budget
//! - persisting per-category checkpoints so a long job resumes across
//!   scheduler invocations
//! - aggregating a structured result for the host
//!
//! ## Example
//!
//! ```rust,ignore
//! use porter::{Job, Orchestrator, PorterConfig};
//! use porter::models::ExportRequest;
//!
//! let config = PorterConfig::load_default();
//! let orchestrator = Orchestrator::from_config(&config)?;
//! let request = ExportRequest::new(["pages", "users"]);
//! let mut job = Job::export(&request)?;
//! let result = orchestrator.run(&mut job)?;
//! println!("{}: {}", job.id, result.status);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod portability;
pub mod scheduler;
pub mod services;
pub mod storage;

pub use config::{FailurePolicy, PorterConfig, ServiceSpec};
pub use models::{
    CategoryName, Checkpoint, ExportRequest, ImportRequest, Job, JobId, JobKind, JobStatus,
    RunResult, SummaryLine,
};
pub use portability::{
    CancellationRegistry, CategoryGraph, InMemoryCancellationRegistry, Orchestrator,
    PortableService, ServiceContext, ServiceRegistry,
};
pub use scheduler::{NoteLog, Scheduler};
pub use storage::{ArchiveRepository, CheckpointStore, JobStore, SqliteStateStore};

/// Schema version written into every archive produced by this engine.
///
/// Imports refuse archives whose recorded schema version is newer than the
/// engine's configured version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Error type for porter operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed job payloads, bad category names, bad config values |
/// | `OperationFailed` | `SQLite`, filesystem or serialization failures |
/// | `Precondition` | Empty export selection, missing import archive |
/// | `IncompatibleSchema` | Archive schema is newer than the engine understands |
/// | `NotFound` | Unknown job id or archive record |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations on the job, checkpoint or archive stores fail
    /// - Filesystem I/O errors occur
    /// - A portable service reports a failure
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A job precondition does not hold; no service was run.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The archive was written by a newer engine.
    #[error("archive schema version {archive} is newer than supported version {engine}")]
    IncompatibleSchema {
        /// Version recorded in the archive.
        archive: String,
        /// Version of the running engine.
        engine: String,
    },

    /// A requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Returns `true` for errors that mean "do not start the job".
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_) | Self::IncompatibleSchema { .. } | Self::InvalidInput(_)
        )
    }
}

/// Result type alias for porter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::operation("test", "failed");
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::IncompatibleSchema {
            archive: "1.0.0".to_string(),
            engine: "0.9.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "archive schema version 1.0.0 is newer than supported version 0.9.0"
        );
    }

    #[test]
    fn test_precondition_classification() {
        assert!(Error::Precondition("empty".to_string()).is_precondition());
        assert!(Error::InvalidInput("bad".to_string()).is_precondition());
        assert!(!Error::operation("x", "y").is_precondition());
        assert!(!Error::NotFound("job".to_string()).is_precondition());
    }

    #[test]
    fn test_current_timestamp_is_positive() {
        assert!(current_timestamp() > 0);
    }
}
