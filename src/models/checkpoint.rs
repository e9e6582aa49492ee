//! Per-(job, category) progress markers.

use super::category::CategoryName;
use super::job::JobId;
use crate::current_timestamp;
use serde::{Deserialize, Serialize};

/// Resume point for one category of one job.
///
/// `progress` is opaque to the orchestrator; only the owning service
/// interprets it. At most one checkpoint exists per (job, category).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Owning job.
    pub job_id: JobId,
    /// Category the checkpoint belongs to.
    pub category: CategoryName,
    /// Service-defined progress payload.
    pub progress: String,
    /// Service-defined stage counter.
    pub stage: u32,
    /// Total items the service expects to process, if known.
    pub total_items: u64,
    /// Items processed so far.
    pub processed_items: u64,
    /// Set once the service returned without being asked to stop.
    pub completed: bool,
    /// Set when the service failed under the isolate policy.
    pub failed: bool,
    /// Last update (Unix epoch seconds).
    pub updated_at: u64,
}

impl Checkpoint {
    /// Creates an empty checkpoint.
    #[must_use]
    pub fn new(job_id: JobId, category: CategoryName) -> Self {
        Self {
            job_id,
            category,
            progress: String::new(),
            stage: 0,
            total_items: 0,
            processed_items: 0,
            completed: false,
            failed: false,
            updated_at: current_timestamp(),
        }
    }

    /// Sets the opaque progress payload.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = progress.into();
        self
    }

    /// Returns the completion percentage if the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> Option<f64> {
        if self.completed {
            return Some(100.0);
        }
        (self.total_items > 0)
            .then(|| (self.processed_items as f64 / self.total_items as f64) * 100.0)
    }

    /// Refreshes `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checkpoint_is_empty() {
        let cp = Checkpoint::new(JobId::new("j"), CategoryName::new("pages"));
        assert!(cp.progress.is_empty());
        assert!(!cp.completed);
        assert!(!cp.failed);
        assert_eq!(cp.percent_complete(), None);
    }

    #[test]
    fn test_percent_complete() {
        let mut cp = Checkpoint::new(JobId::new("j"), CategoryName::new("pages"));
        cp.total_items = 4;
        cp.processed_items = 1;
        assert_eq!(cp.percent_complete(), Some(25.0));
        cp.completed = true;
        assert_eq!(cp.percent_complete(), Some(100.0));
    }
}
