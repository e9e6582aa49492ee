//! Command handlers module.
//!
//! - `jobs.rs`: commands that run jobs (export, import, resume, run-pending)
//! - `inspect.rs`: read-only commands (status, jobs, services)

mod inspect;
mod jobs;

pub use inspect::{cmd_jobs, cmd_services, cmd_status};
pub use jobs::{cmd_export, cmd_import, cmd_resume, cmd_run_pending};
