//! Binary entry point for porter.
//!
//! Provides the CLI for submitting, running and inspecting export/import jobs.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use porter::config::PorterConfig;
use porter::observability::{self, LoggingConfig, ObservabilityConfig};
use porter::{Orchestrator, Scheduler};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Porter - resumable export/import of portable site data.
#[derive(Parser)]
#[command(name = "porter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "PORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Print a Prometheus metrics snapshot on exit.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Export categories into a new archive.
    Export {
        /// Categories to export.
        categories: Vec<String>,

        /// Export a single page (repeatable).
        #[arg(long = "page")]
        pages: Vec<String>,

        /// Export a page and every page below it (repeatable).
        #[arg(long = "page-tree")]
        page_trees: Vec<String>,

        /// Use this job ID instead of a generated one.
        #[arg(long)]
        job_id: Option<String>,

        /// Only queue the job; `run-pending` runs it later.
        #[arg(long)]
        enqueue: bool,
    },

    /// Import an archive from the export directory.
    Import {
        /// Archive file name inside the export directory.
        archive: String,

        /// Newest archive schema version to accept.
        #[arg(long)]
        schema_version: Option<String>,

        /// Use this job ID instead of a generated one.
        #[arg(long)]
        job_id: Option<String>,

        /// Only queue the job; `run-pending` runs it later.
        #[arg(long)]
        enqueue: bool,
    },

    /// Give one unfinished job another invocation.
    Resume {
        /// Job ID.
        job_id: String,
    },

    /// Give every unfinished job one invocation.
    RunPending,

    /// Show a job and its checkpoints.
    Status {
        /// Job ID.
        job_id: String,
    },

    /// List jobs.
    Jobs {
        /// Only list unfinished jobs.
        #[arg(long)]
        pending: bool,
    },

    /// List the configured services.
    Services,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let handle = match observability::init(ObservabilityConfig {
        logging: LoggingConfig::from_env(cli.verbose),
        metrics_enabled: cli.metrics || config.metrics_enabled,
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(cli.command, &config);

    if let Some(rendered) = handle.render_metrics() {
        print!("{rendered}");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from an explicit path or the default locations.
fn load_config(path: Option<&Path>) -> anyhow::Result<PorterConfig> {
    match path {
        Some(path) => PorterConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(PorterConfig::load_default()),
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &PorterConfig) -> anyhow::Result<()> {
    match command {
        Commands::Export {
            categories,
            pages,
            page_trees,
            job_id,
            enqueue,
        } => commands::cmd_export(
            &scheduler(config)?,
            categories,
            pages,
            page_trees,
            job_id,
            enqueue,
        ),

        Commands::Import {
            archive,
            schema_version,
            job_id,
            enqueue,
        } => commands::cmd_import(&scheduler(config)?, archive, schema_version, job_id, enqueue),

        Commands::Resume { job_id } => commands::cmd_resume(&scheduler(config)?, &job_id),

        Commands::RunPending => commands::cmd_run_pending(&scheduler(config)?),

        Commands::Status { job_id } => commands::cmd_status(&scheduler(config)?, &job_id),

        Commands::Jobs { pending } => commands::cmd_jobs(&scheduler(config)?, pending),

        Commands::Services => commands::cmd_services(config),
    }
}

/// Opens the state store and wires Ctrl-C to job cancellation.
fn scheduler(config: &PorterConfig) -> anyhow::Result<Scheduler> {
    let orchestrator = Orchestrator::from_config(config).context("opening state store")?;

    let cancellations = Arc::clone(orchestrator.cancellations());
    ctrlc::set_handler(move || {
        let cancelled = cancellations.cancel_all();
        tracing::warn!(cancelled, "Interrupt received, cancelling running jobs");
    })
    .context("installing Ctrl-C handler")?;

    Ok(Scheduler::new(orchestrator))
}
