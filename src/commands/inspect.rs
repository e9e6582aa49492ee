//! Read-only command handlers.

use anyhow::Context;
use chrono::DateTime;
use porter::config::PorterConfig;
use porter::{JobId, Scheduler, ServiceRegistry};

/// Status command.
pub fn cmd_status(scheduler: &Scheduler, job_id: &str) -> anyhow::Result<()> {
    let orchestrator = scheduler.orchestrator();
    let id = JobId::new(job_id);
    let job = orchestrator
        .jobs()
        .load(&id)?
        .with_context(|| format!("job {job_id} not found"))?;

    println!("Job {}", job.id);
    println!("  Kind:      {}", job.kind);
    println!("  Status:    {}", job.status);
    println!("  Created:   {}", format_timestamp(job.created_at));
    if let Some(completed_at) = job.completed_at {
        println!("  Completed: {}", format_timestamp(completed_at));
    }

    let mut checkpoints = orchestrator.checkpoint_store().checkpoints(&id)?;
    if checkpoints.is_empty() {
        return Ok(());
    }
    checkpoints.sort_by(|a, b| a.category.cmp(&b.category));

    println!("  Checkpoints:");
    for checkpoint in checkpoints {
        let state = if checkpoint.failed {
            "failed"
        } else if checkpoint.completed {
            "completed"
        } else {
            "pending"
        };
        let percent = checkpoint
            .percent_complete()
            .map_or_else(|| "-".to_string(), |p| format!("{p:.0}%"));
        println!(
            "    {:<20} {:<10} {:>4} {}/{} {}",
            checkpoint.category.as_str(),
            state,
            percent,
            checkpoint.processed_items,
            checkpoint.total_items,
            checkpoint.progress
        );
    }
    Ok(())
}

/// Jobs command.
pub fn cmd_jobs(scheduler: &Scheduler, pending_only: bool) -> anyhow::Result<()> {
    let jobs = scheduler.orchestrator().jobs();
    let jobs = if pending_only { jobs.pending()? } else { jobs.list()? };

    if jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:<6}  {:<12}  {}",
            job.id,
            job.kind.as_str(),
            job.status.as_str(),
            format_timestamp(job.created_at)
        );
    }
    Ok(())
}

/// Services command.
pub fn cmd_services(config: &PorterConfig) -> anyhow::Result<()> {
    let registry = ServiceRegistry::from_config(config);
    println!("Site root: {}", config.site_dir().display());

    let mut services: Vec<_> = registry.discover().collect();
    services.sort_by_key(|s| (s.parent().map(|p| p.key()), s.priority()));
    for service in services {
        let parent = service.parent().map(|p| p.to_string()).unwrap_or_default();
        println!(
            "  {:<20} parent={:<12} priority={}",
            service.category().as_str(),
            parent,
            service.priority()
        );
    }
    Ok(())
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map_or_else(|| secs.to_string(), |dt| dt.to_rfc3339())
}
