//! Export and import jobs.

use super::request::{ExportRequest, ImportRequest};
use crate::{Error, Result, current_timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random job ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Direction of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Moves data out of the site into an archive.
    Export,
    /// Moves data from an archive into the site.
    Import,
}

impl JobKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Import => "import",
        }
    }

    /// Past-tense label used in summary lines ("Exported: pages").
    #[must_use]
    pub const fn completed_label(&self) -> &'static str {
        match self {
            Self::Export => "Exported",
            Self::Import => "Imported",
        }
    }

    /// Parses a kind string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "export" => Some(Self::Export),
            "import" => Some(Self::Import),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a job (and terminal status of a run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but never invoked.
    #[default]
    NotStarted,
    /// Work has begun; also the status of a run interrupted by the time budget.
    InProgress,
    /// Every included category completed.
    DoneSuccess,
    /// A precondition or a service failed.
    DoneFailure,
    /// Cancelled through the cancellation registry.
    Cancelled,
}

impl JobStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::DoneSuccess => "done_success",
            Self::DoneFailure => "done_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "done_success" => Some(Self::DoneSuccess),
            "done_failure" => Some(Self::DoneFailure),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` once the job will not be invoked again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::DoneSuccess | Self::DoneFailure | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One export or import run, possibly spanning several invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// Export or import.
    pub kind: JobKind,
    /// Serialized request descriptor (JSON).
    pub payload: String,
    /// Current status.
    pub status: JobStatus,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Completion timestamp, set once the job reaches a terminal status.
    pub completed_at: Option<u64>,
}

impl Job {
    /// Creates a job with a raw payload.
    #[must_use]
    pub fn new(id: JobId, kind: JobKind, payload: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            payload: payload.into(),
            status: JobStatus::NotStarted,
            created_at: current_timestamp(),
            completed_at: None,
        }
    }

    /// Creates an export job for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    pub fn export(request: &ExportRequest) -> Result<Self> {
        let payload =
            serde_json::to_string(request).map_err(|e| Error::operation("serialize_export_request", e))?;
        Ok(Self::new(JobId::generate(), JobKind::Export, payload))
    }

    /// Creates an import job for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    pub fn import(request: &ImportRequest) -> Result<Self> {
        let payload =
            serde_json::to_string(request).map_err(|e| Error::operation("serialize_import_request", e))?;
        Ok(Self::new(JobId::generate(), JobKind::Import, payload))
    }

    /// Overrides the generated ID.
    #[must_use]
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Parses the payload as an export request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the payload is not a valid export request.
    pub fn export_request(&self) -> Result<ExportRequest> {
        serde_json::from_str(&self.payload)
            .map_err(|e| Error::InvalidInput(format!("malformed export request: {e}")))
    }

    /// Parses the payload as an import request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the payload is not a valid import request.
    pub fn import_request(&self) -> Result<ImportRequest> {
        serde_json::from_str(&self.payload)
            .map_err(|e| Error::InvalidInput(format!("malformed import request: {e}")))
    }

    /// Key under which this job's cancellation token is registered.
    ///
    /// Derived from the direction and the job ID, e.g. `export:1234`.
    #[must_use]
    pub fn cancellation_key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    /// Base file name of the archive an export job produces.
    #[must_use]
    pub fn archive_base(&self) -> String {
        format!("export-{}", self.id)
    }

    /// Records a terminal status and the completion time.
    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(current_timestamp());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::NotStarted,
            JobStatus::InProgress,
            JobStatus::DoneSuccess,
            JobStatus::DoneFailure,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_cancellation_key_includes_direction() {
        let job = Job::new(JobId::new("42"), JobKind::Import, "{}");
        assert_eq!(job.cancellation_key(), "import:42");
    }

    #[test]
    fn test_finish_sets_completion_only_when_terminal() {
        let mut job = Job::new(JobId::new("1"), JobKind::Export, "{}");
        job.finish(JobStatus::InProgress);
        assert!(job.completed_at.is_none());
        job.finish(JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_malformed_payload_is_invalid_input() {
        let job = Job::new(JobId::new("1"), JobKind::Export, "not json");
        assert!(matches!(job.export_request(), Err(Error::InvalidInput(_))));
    }
}
