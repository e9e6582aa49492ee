//! Job-running command handlers.

use anyhow::bail;
use porter::scheduler::NoteLog;
use porter::{ExportRequest, ImportRequest, Job, JobId, JobStatus, RunResult, Scheduler};

/// Export command.
pub fn cmd_export(
    scheduler: &Scheduler,
    categories: Vec<String>,
    pages: Vec<String>,
    page_trees: Vec<String>,
    job_id: Option<String>,
    enqueue: bool,
) -> anyhow::Result<()> {
    let mut request = ExportRequest::new(categories);
    for page in pages {
        request = request.with_page(page, false);
    }
    for page in page_trees {
        request = request.with_page(page, true);
    }

    let mut job = Job::export(&request)?;
    if let Some(id) = job_id {
        job = job.with_id(JobId::new(id));
    }
    submit(scheduler, &job, enqueue)
}

/// Import command.
pub fn cmd_import(
    scheduler: &Scheduler,
    archive: String,
    schema_version: Option<String>,
    job_id: Option<String>,
    enqueue: bool,
) -> anyhow::Result<()> {
    let mut request = ImportRequest::new(archive);
    request.schema_version = schema_version;

    let mut job = Job::import(&request)?;
    if let Some(id) = job_id {
        job = job.with_id(JobId::new(id));
    }
    submit(scheduler, &job, enqueue)
}

/// Resume command.
pub fn cmd_resume(scheduler: &Scheduler, job_id: &str) -> anyhow::Result<()> {
    let mut log = NoteLog::new();
    let result = scheduler.run_job(&JobId::new(job_id), &mut log)?;
    report(&result, &log)
}

/// Run-pending command.
pub fn cmd_run_pending(scheduler: &Scheduler) -> anyhow::Result<()> {
    let mut log = NoteLog::new();
    let results = scheduler.run_pending(&mut log)?;
    print!("{log}");

    let unfinished = results
        .iter()
        .filter(|r| r.status == JobStatus::InProgress)
        .count();
    println!(
        "Ran {} job(s); {unfinished} still in progress",
        results.len()
    );
    Ok(())
}

fn submit(scheduler: &Scheduler, job: &Job, enqueue: bool) -> anyhow::Result<()> {
    scheduler.orchestrator().submit(job)?;
    if enqueue {
        println!("Queued {} job {}", job.kind, job.id);
        return Ok(());
    }

    let mut log = NoteLog::new();
    let result = scheduler.run_job(&job.id, &mut log)?;
    report(&result, &log)
}

fn report(result: &RunResult, log: &NoteLog) -> anyhow::Result<()> {
    print!("{log}");
    match result.status {
        JobStatus::DoneSuccess => Ok(()),
        JobStatus::InProgress | JobStatus::NotStarted => {
            println!(
                "Job {} suspended; continue with `porter resume {}`",
                result.job_id, result.job_id
            );
            Ok(())
        },
        JobStatus::DoneFailure => bail!("job {} failed", result.job_id),
        JobStatus::Cancelled => bail!("job {} was cancelled", result.job_id),
    }
}
