//! Data models for jobs, requests, checkpoints and run results.

mod category;
mod checkpoint;
mod job;
mod request;
mod result;

pub use category::{CategoryName, PAGES_CATEGORY, PORTAL_CATEGORY};
pub use checkpoint::Checkpoint;
pub use job::{Job, JobId, JobKind, JobStatus};
pub use request::{ExportRequest, ImportRequest, PageSelection};
pub use result::{RunResult, SummaryLine};
