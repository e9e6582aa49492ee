//! Portable service contract.

use crate::models::{CategoryName, Checkpoint, ExportRequest, Job, RunResult};
use crate::storage::{ArchiveRepository, CheckpointStore};
use crate::Result;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Wall-clock budget for one orchestrator invocation.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    /// Starts the clock.
    #[must_use]
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time spent since the invocation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Configured limit.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Returns `true` once the limit has been reached.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.elapsed() >= self.limit
    }
}

/// Everything a service may touch while it runs.
///
/// Built by the orchestrator for a single service invocation: the result
/// sink, the shared archive, the job's cancellation token, and the service's
/// own checkpoint together with the callback that persists it.
pub struct ServiceContext<'a> {
    result: &'a mut RunResult,
    archive: &'a ArchiveRepository,
    token: &'a CancellationToken,
    checkpoint: Checkpoint,
    store: &'a dyn CheckpointStore,
    budget: &'a TimeBudget,
    stop_requested: bool,
}

impl<'a> ServiceContext<'a> {
    /// Creates a context around `checkpoint`.
    #[must_use]
    pub fn new(
        result: &'a mut RunResult,
        archive: &'a ArchiveRepository,
        token: &'a CancellationToken,
        checkpoint: Checkpoint,
        store: &'a dyn CheckpointStore,
        budget: &'a TimeBudget,
    ) -> Self {
        Self {
            result,
            archive,
            token,
            checkpoint,
            store,
            budget,
            stop_requested: false,
        }
    }

    /// Result sink for summary lines and notes.
    pub fn result(&mut self) -> &mut RunResult {
        &mut *self.result
    }

    /// Archive shared by every service of the job.
    #[must_use]
    pub const fn archive(&self) -> &ArchiveRepository {
        self.archive
    }

    /// Returns `true` once the job has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The service's checkpoint.
    #[must_use]
    pub const fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Mutable access to the checkpoint; call [`update_checkpoint`] to persist.
    ///
    /// [`update_checkpoint`]: Self::update_checkpoint
    pub fn checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.checkpoint
    }

    /// Persists the checkpoint and reports whether the service should stop.
    ///
    /// Stop is requested once the time budget is exhausted or the job has been
    /// cancelled. The service is expected to return promptly; nothing is
    /// aborted on its behalf.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be saved.
    pub fn update_checkpoint(&mut self) -> Result<bool> {
        self.checkpoint.touch();
        self.store.upsert(&self.checkpoint)?;
        if self.budget.exhausted() || self.token.is_cancelled() {
            self.stop_requested = true;
        }
        Ok(self.stop_requested)
    }

    /// Records that the service is returning before its work is done.
    ///
    /// The checkpoint is then left incomplete so the next invocation resumes it.
    pub const fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Returns `true` if the service stopped early or a checkpoint update asked it to.
    #[must_use]
    pub const fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub(crate) fn into_checkpoint(self) -> Checkpoint {
        self.checkpoint
    }
}

/// A worker that moves one category of data into or out of an archive.
///
/// Instances are created once per run by a [`ServiceRegistry`] factory.
///
/// [`ServiceRegistry`]: super::ServiceRegistry
pub trait PortableService: Send {
    /// Category owned by this service.
    fn category(&self) -> CategoryName;

    /// Parent category; `None` for a top-level service.
    fn parent(&self) -> Option<CategoryName> {
        None
    }

    /// Lower runs first among siblings.
    fn priority(&self) -> i32 {
        0
    }

    /// Writes this category's data into the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the export fails.
    fn export_data(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        job: &Job,
        request: &ExportRequest,
    ) -> Result<()>;

    /// Reads this category's data back from the archive.
    ///
    /// `exported` is the request the archive was originally produced from.
    ///
    /// # Errors
    ///
    /// Returns an error if the import fails.
    fn import_data(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        job: &Job,
        exported: &ExportRequest,
    ) -> Result<()>;
}
