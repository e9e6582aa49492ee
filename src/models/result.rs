//! Run results returned to the host scheduler.

use super::category::CategoryName;
use super::job::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One human-readable line of a run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLine {
    /// Short label, e.g. `Exported`.
    pub label: String,
    /// Detail, e.g. the category name.
    pub detail: String,
}

impl SummaryLine {
    /// Creates a summary line.
    #[must_use]
    pub fn new(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.detail)
    }
}

/// Aggregated outcome of one orchestrator invocation.
///
/// Starts pessimistic (`DoneFailure`), is moved to `InProgress` once work
/// begins and only reaches `DoneSuccess` if nothing failed or was cancelled.
/// Summary lines are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Job this result belongs to.
    pub job_id: JobId,
    /// Terminal status of this invocation.
    pub status: JobStatus,
    /// Ordered summary lines.
    pub summary: Vec<SummaryLine>,
    /// Operator notes: warnings and failure reasons.
    pub notes: Vec<String>,
    /// Categories whose service ran during this invocation, in order.
    pub executed: Vec<CategoryName>,
    /// Final archive size in bytes (export only).
    pub archive_size: Option<u64>,
}

impl RunResult {
    /// Creates a result with the pessimistic default status.
    #[must_use]
    pub const fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::DoneFailure,
            summary: Vec::new(),
            notes: Vec::new(),
            executed: Vec::new(),
            archive_size: None,
        }
    }

    /// Appends a summary line.
    pub fn add_summary(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.summary.push(SummaryLine::new(label, detail));
    }

    /// Appends an operator note.
    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Marks the run failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::DoneFailure;
        self.add_note(reason);
    }

    /// Returns `true` if the summary contains `label: detail`.
    #[must_use]
    pub fn has_line(&self, line: &str) -> bool {
        self.summary.iter().any(|l| l.to_string() == line)
    }

    /// Renders the summary as lines of text.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        self.summary.iter().map(ToString::to_string).collect()
    }
}
