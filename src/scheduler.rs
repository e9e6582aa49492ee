//! Host-side job driver.
//!
//! The scheduler plays the role of the periodic host: every call to
//! [`Scheduler::run_pending`] gives each unfinished job one orchestrator
//! invocation and appends what happened to a [`NoteLog`]. Jobs interrupted
//! by the time budget stay pending and continue on the next call.

use crate::models::{Job, JobId, RunResult};
use crate::portability::Orchestrator;
use crate::{Error, Result};
use std::fmt;
use tracing::{error, info, instrument};

/// Append-only, line-oriented log attached to a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteLog {
    lines: Vec<String>,
}

impl NoteLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// All lines in order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns `true` if any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for NoteLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Runs pending jobs through an orchestrator.
pub struct Scheduler {
    orchestrator: Orchestrator,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub const fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// The orchestrator jobs are run with.
    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Gives every job that has not reached a terminal status one invocation.
    ///
    /// A job whose invocation fails with a storage error is logged and the
    /// remaining jobs still run.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending jobs cannot be listed.
    #[instrument(skip_all)]
    pub fn run_pending(&self, log: &mut NoteLog) -> Result<Vec<RunResult>> {
        let pending = self.orchestrator.jobs().pending()?;
        info!(count = pending.len(), "Running pending jobs");

        let mut results = Vec::with_capacity(pending.len());
        for mut job in pending {
            match self.invoke(&mut job, log) {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Job invocation failed");
                    log.append(format!("{} job {} aborted: {e}", job.kind, job.id));
                },
            }
        }
        Ok(results)
    }

    /// Gives one job an invocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown job, [`Error::Precondition`]
    /// for a job that already finished, or a storage error.
    pub fn run_job(&self, id: &JobId, log: &mut NoteLog) -> Result<RunResult> {
        let mut job = self
            .orchestrator
            .jobs()
            .load(id)?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        if job.status.is_terminal() {
            return Err(Error::Precondition(format!(
                "job {id} already finished with status {}",
                job.status
            )));
        }
        self.invoke(&mut job, log)
    }

    fn invoke(&self, job: &mut Job, log: &mut NoteLog) -> Result<RunResult> {
        log.append(format!("{} job {} started", job.kind, job.id));
        let result = self.orchestrator.run(job)?;
        for line in result.summary_lines() {
            log.append(line);
        }
        for note in &result.notes {
            log.append(format!("Note: {note}"));
        }
        log.append(format!("{} job {} {}", job.kind, job.id, result.status));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExportRequest, JobStatus};
    use crate::portability::ServiceRegistry;
    use crate::storage::{JobStore, SqliteStateStore};
    use std::sync::Arc;

    fn scheduler(dir: &std::path::Path) -> Scheduler {
        let store = Arc::new(SqliteStateStore::in_memory().unwrap());
        let jobs: Arc<dyn JobStore> = store.clone();
        Scheduler::new(Orchestrator::new(ServiceRegistry::new(), jobs, store, dir))
    }

    #[test]
    fn test_note_log() {
        let mut log = NoteLog::new();
        assert!(log.is_empty());
        log.append("first");
        log.append(String::from("second"));
        assert_eq!(log.len(), 2);
        assert!(log.contains("sec"));
        assert_eq!(log.to_string(), "first\nsecond\n");
    }

    #[test]
    fn test_run_pending_skips_finished_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let pending = Job::export(&ExportRequest::new(["users"])).unwrap();
        let mut done = Job::export(&ExportRequest::new(["roles"])).unwrap();
        done.finish(JobStatus::DoneSuccess);
        scheduler.orchestrator().submit(&pending).unwrap();
        scheduler.orchestrator().submit(&done).unwrap();

        let mut log = NoteLog::new();
        let results = scheduler.run_pending(&mut log).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job_id, pending.id);
        assert!(log.contains(&format!("export job {} done_success", pending.id)));

        let second = scheduler.run_pending(&mut NoteLog::new()).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_run_job_rejects_unknown_and_finished() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let mut log = NoteLog::new();
        assert!(matches!(
            scheduler.run_job(&JobId::new("missing"), &mut log),
            Err(Error::NotFound(_))
        ));

        let mut job = Job::export(&ExportRequest::new(["users"])).unwrap();
        job.finish(JobStatus::Cancelled);
        scheduler.orchestrator().submit(&job).unwrap();
        assert!(matches!(
            scheduler.run_job(&job.id, &mut log),
            Err(Error::Precondition(_))
        ));
    }
}
