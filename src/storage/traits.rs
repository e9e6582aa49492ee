//! Store traits consumed by the orchestrator.

use crate::Result;
use crate::models::{CategoryName, Checkpoint, Job, JobId};
use std::collections::HashMap;

/// Persistence for job records.
///
/// Implementations must be safe for concurrent use by jobs with different IDs.
pub trait JobStore: Send + Sync {
    /// Inserts or replaces a job.
    fn save(&self, job: &Job) -> Result<()>;

    /// Loads a job by ID.
    fn load(&self, id: &JobId) -> Result<Option<Job>>;

    /// Lists all jobs, oldest first.
    fn list(&self) -> Result<Vec<Job>>;

    /// Lists jobs that have not reached a terminal status, oldest first.
    fn pending(&self) -> Result<Vec<Job>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect())
    }
}

/// Persistence for per-(job, category) checkpoints.
///
/// At most one checkpoint exists per (job, category); `upsert` replaces it.
pub trait CheckpointStore: Send + Sync {
    /// Returns every checkpoint of a job.
    fn checkpoints(&self, job_id: &JobId) -> Result<Vec<Checkpoint>>;

    /// Inserts or replaces a checkpoint.
    fn upsert(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Returns a job's checkpoints keyed by category.
    fn load_checkpoints(&self, job_id: &JobId) -> Result<HashMap<CategoryName, Checkpoint>> {
        Ok(self
            .checkpoints(job_id)?
            .into_iter()
            .map(|cp| (cp.category.clone(), cp))
            .collect())
    }
}
