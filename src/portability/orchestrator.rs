//! Orchestration core.
//!
//! One [`Orchestrator::run`] call is one invocation of a job:
//!
//! 1. Check preconditions (payload, selection, archive, schema version).
//! 2. Open the archive, fresh only when the job has no checkpoints yet.
//! 3. Discover services, build the category graph and the inclusion set.
//! 4. Walk the graph level by level in priority order, consulting
//!    checkpoints, the cancellation token and the time budget.
//! 5. Close the archive and record the final job status.
//!
//! Jobs that run out of time stay `InProgress` and pick up where they left
//! off on the next invocation.

use super::cancellation::{CancellationRegistry, InMemoryCancellationRegistry, Registration};
use super::graph::{CategoryGraph, ServiceDescriptor, resolve_included};
use super::registry::ServiceRegistry;
use super::service::{PortableService, ServiceContext, TimeBudget};
use crate::config::{
    DEFAULT_ARCHIVE_EXTENSION, DEFAULT_TIME_BUDGET, FailurePolicy, PorterConfig,
    engine_schema_version,
};
use crate::models::{CategoryName, Checkpoint, ExportRequest, Job, JobKind, JobStatus, RunResult};
use crate::storage::{
    ArchiveMetadata, ArchiveRepository, CheckpointStore, JobStore, SqliteStateStore,
};
use crate::{Error, Result};
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Drives portable services for export and import jobs.
pub struct Orchestrator {
    registry: ServiceRegistry,
    jobs: Arc<dyn JobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    cancellations: Arc<dyn CancellationRegistry>,
    export_dir: PathBuf,
    archive_extension: String,
    schema_version: Version,
    time_budget: Duration,
    failure_policy: FailurePolicy,
}

impl Orchestrator {
    /// Creates an orchestrator with default budget, policy and schema version.
    #[must_use]
    pub fn new(
        registry: ServiceRegistry,
        jobs: Arc<dyn JobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            jobs,
            checkpoints,
            cancellations: Arc::new(InMemoryCancellationRegistry::new()),
            export_dir: export_dir.into(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            schema_version: engine_schema_version(),
            time_budget: DEFAULT_TIME_BUDGET,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Builds an orchestrator backed by the state database in `config.data_dir`.
    ///
    /// Creates the data, export and site directories if they are missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the state database cannot be created.
    pub fn from_config(config: &PorterConfig) -> Result<Self> {
        config.ensure_directories()?;
        let store = Arc::new(SqliteStateStore::new(config.state_db_path())?);
        Ok(Self::from_parts(config, ServiceRegistry::from_config(config), store))
    }

    /// Builds an orchestrator from configuration with an explicit registry and store.
    #[must_use]
    pub fn from_parts(
        config: &PorterConfig,
        registry: ServiceRegistry,
        store: Arc<SqliteStateStore>,
    ) -> Self {
        let jobs: Arc<dyn JobStore> = store.clone();
        Self::new(registry, jobs, store, config.export_dir())
            .with_archive_extension(config.archive_extension.clone())
            .with_schema_version(config.schema_version.clone())
            .with_time_budget(config.time_budget)
            .with_failure_policy(config.failure_policy)
    }

    /// Uses a shared cancellation registry.
    #[must_use]
    pub fn with_cancellations(mut self, cancellations: Arc<dyn CancellationRegistry>) -> Self {
        self.cancellations = cancellations;
        self
    }

    /// Sets the wall-clock budget per invocation.
    #[must_use]
    pub const fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Sets what happens when a service fails.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the schema version written to and accepted from archives.
    #[must_use]
    pub fn with_schema_version(mut self, version: Version) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the archive file extension.
    #[must_use]
    pub fn with_archive_extension(mut self, extension: impl Into<String>) -> Self {
        self.archive_extension = extension.into();
        self
    }

    /// Job store.
    #[must_use]
    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Checkpoint store.
    #[must_use]
    pub fn checkpoint_store(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Cancellation registry shared by every job this orchestrator runs.
    #[must_use]
    pub fn cancellations(&self) -> &Arc<dyn CancellationRegistry> {
        &self.cancellations
    }

    /// Service registry.
    #[must_use]
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Path of the archive with base name `base`.
    #[must_use]
    pub fn archive_path(&self, base: &str) -> PathBuf {
        self.export_dir
            .join(format!("{base}.{}", self.archive_extension))
    }

    /// Persists a new job so the scheduler can pick it up.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store fails.
    pub fn submit(&self, job: &Job) -> Result<()> {
        self.jobs.save(job)
    }

    /// Runs one invocation of `job`.
    ///
    /// Precondition failures, cancellation and service failures are reported
    /// through the returned [`RunResult`] and the job's status. `Err` means
    /// the job or checkpoint store, or the archive itself, failed.
    ///
    /// The job's cancellation token is registered for the duration of the
    /// call and unregistered on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures.
    #[instrument(skip(self, job), fields(job_id = %job.id, direction = %job.kind))]
    pub fn run(&self, job: &mut Job) -> Result<RunResult> {
        let started = Instant::now();
        let budget = TimeBudget::start(self.time_budget);
        let token = CancellationToken::new();
        let _registration =
            Registration::new(self.cancellations.as_ref(), job.cancellation_key(), token.clone());
        let mut result = RunResult::new(job.id.clone());

        if let Err(e) = self.execute(job, &token, &budget, &mut result) {
            warn!(error = %e, "Job aborted");
            job.finish(JobStatus::DoneFailure);
            if let Err(save_err) = self.jobs.save(job) {
                warn!(error = %save_err, "Failed to record aborted job");
            }
            record_job(job, started);
            return Err(e);
        }

        job.finish(result.status);
        self.jobs.save(job)?;
        record_job(job, started);
        info!(
            status = %result.status,
            executed = result.executed.len(),
            duration_ms = started.elapsed().as_millis(),
            "Job invocation finished"
        );
        Ok(result)
    }

    fn execute(
        &self,
        job: &mut Job,
        token: &CancellationToken,
        budget: &TimeBudget,
        result: &mut RunResult,
    ) -> Result<()> {
        let prepared = match self.prepare(job) {
            Ok(prepared) => prepared,
            Err(e) if e.is_precondition() => {
                warn!(reason = %e, "Job not started");
                result.fail(e.to_string());
                return Ok(());
            },
            Err(e) => return Err(e),
        };

        job.status = JobStatus::InProgress;
        self.jobs.save(job)?;
        result.status = JobStatus::InProgress;

        let services: Vec<Box<dyn PortableService>> = self.registry.discover().collect();
        let descriptors: Vec<ServiceDescriptor> = services
            .iter()
            .map(|s| ServiceDescriptor::new(s.category(), s.parent(), s.priority()))
            .collect();
        let graph = CategoryGraph::build(&descriptors);
        let included = resolve_included(
            &prepared.request.categories,
            &descriptors,
            !prepared.request.pages.is_empty(),
        );
        debug!(services = services.len(), included = included.len(), "Resolved categories");

        if job.kind == JobKind::Export {
            let mut categories: Vec<CategoryName> = included.iter().cloned().collect();
            categories.sort();
            prepared.archive.put_metadata(
                &ArchiveMetadata::new(self.schema_version.to_string(), categories)
                    .with_request(prepared.request.clone()),
            )?;
        }

        let mut traversal = Traversal {
            orchestrator: self,
            job,
            request: &prepared.request,
            archive: &prepared.archive,
            token,
            budget,
            services,
            descriptors: &descriptors,
            checkpoints: prepared.checkpoints,
            included,
            failed: HashSet::new(),
            result: &mut *result,
        };
        let flow = traversal.walk(&graph)?;
        let any_failed = !traversal.failed.is_empty();

        match flow {
            Flow::Continue if any_failed => result.status = JobStatus::DoneFailure,
            Flow::Continue => result.status = JobStatus::DoneSuccess,
            Flow::Failed => result.status = JobStatus::DoneFailure,
            Flow::Cancelled => {
                info!("Job cancelled");
                result.status = JobStatus::Cancelled;
                result.add_note("Job cancelled before all categories ran");
            },
            Flow::OutOfTime => {
                info!(budget_secs = budget.limit().as_secs(), "Time budget exhausted");
                result.status = JobStatus::InProgress;
                result.add_note(format!(
                    "Time budget of {}s exhausted; remaining categories resume on the next invocation",
                    budget.limit().as_secs()
                ));
            },
        }

        let size = prepared.archive.close()?;
        if job.kind == JobKind::Export {
            result.archive_size = Some(size);
            result.add_summary("Export file size", format!("{size} bytes"));
        }
        Ok(())
    }

    fn prepare(&self, job: &Job) -> Result<Prepared> {
        match job.kind {
            JobKind::Export => {
                let request = job.export_request()?;
                if request.categories.is_empty() {
                    return Err(Error::Precondition(
                        "export request selects no categories".to_string(),
                    ));
                }
                let checkpoints = self.checkpoints.load_checkpoints(&job.id)?;
                let path = self.archive_path(&job.archive_base());
                let archive = if checkpoints.is_empty() {
                    ArchiveRepository::create(&path)?
                } else {
                    info!(checkpoints = checkpoints.len(), "Resuming into existing archive");
                    ArchiveRepository::open(&path)?
                };
                Ok(Prepared {
                    request,
                    archive,
                    checkpoints,
                })
            },
            JobKind::Import => {
                let request = job.import_request()?;
                let path = self.import_path(&request.archive_name)?;
                let archive = match ArchiveRepository::open_existing(&path) {
                    Ok(archive) => archive,
                    Err(Error::NotFound(_)) => {
                        return Err(Error::Precondition(format!(
                            "archive '{}' not found in {}",
                            request.archive_name,
                            self.export_dir.display()
                        )));
                    },
                    Err(e) => return Err(e),
                };
                let metadata = archive.metadata()?.ok_or_else(|| {
                    Error::Precondition(format!(
                        "archive '{}' has no metadata record",
                        request.archive_name
                    ))
                })?;

                let archive_version = Version::parse(&metadata.schema_version).map_err(|e| {
                    Error::Precondition(format!(
                        "archive schema version '{}': {e}",
                        metadata.schema_version
                    ))
                })?;
                let supported = match &request.schema_version {
                    Some(v) => Version::parse(v).map_err(|e| {
                        Error::InvalidInput(format!("requested schema version '{v}': {e}"))
                    })?,
                    None => self.schema_version.clone(),
                };
                if archive_version > supported {
                    return Err(Error::IncompatibleSchema {
                        archive: archive_version.to_string(),
                        engine: supported.to_string(),
                    });
                }

                let exported = metadata
                    .request
                    .unwrap_or_else(|| ExportRequest::new(metadata.categories));
                Ok(Prepared {
                    request: exported,
                    archive,
                    checkpoints: self.checkpoints.load_checkpoints(&job.id)?,
                })
            },
        }
    }

    fn import_path(&self, archive_name: &str) -> Result<PathBuf> {
        let name = Path::new(archive_name);
        if archive_name.is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(Error::InvalidInput(format!(
                "archive name '{archive_name}' must be a plain file name"
            )));
        }
        Ok(self.export_dir.join(name))
    }
}

/// Everything resolved before the first service runs.
struct Prepared {
    /// Export request, or the previously exported request for imports.
    request: ExportRequest,
    archive: ArchiveRepository,
    checkpoints: HashMap<CategoryName, Checkpoint>,
}

/// Where the walk goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
    OutOfTime,
    Failed,
}

/// Per-invocation traversal state.
struct Traversal<'a> {
    orchestrator: &'a Orchestrator,
    job: &'a Job,
    request: &'a ExportRequest,
    archive: &'a ArchiveRepository,
    token: &'a CancellationToken,
    budget: &'a TimeBudget,
    services: Vec<Box<dyn PortableService>>,
    descriptors: &'a [ServiceDescriptor],
    checkpoints: HashMap<CategoryName, Checkpoint>,
    included: HashSet<CategoryName>,
    failed: HashSet<CategoryName>,
    result: &'a mut RunResult,
}

impl Traversal<'_> {
    fn walk(&mut self, graph: &CategoryGraph) -> Result<Flow> {
        let mut level: Vec<usize> = graph.roots().to_vec();
        let mut first = true;
        let mut orphan_level = false;

        loop {
            if level.is_empty() {
                if orphan_level || graph.orphans().is_empty() {
                    return Ok(Flow::Continue);
                }
                orphan_level = true;
                level = graph.orphans().to_vec();
                self.report_orphans(&level);
            }

            if self.token.is_cancelled() {
                return Ok(Flow::Cancelled);
            }

            level.sort_by_key(|&idx| self.descriptors[idx].priority);
            let mut next = Vec::new();
            for &idx in &level {
                if self.token.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }
                if !orphan_level {
                    next.extend_from_slice(graph.children(idx));
                }
                let flow = self.visit(idx, first, orphan_level)?;
                if flow != Flow::Continue {
                    return Ok(flow);
                }
            }

            level = next;
            first = false;
        }
    }

    fn report_orphans(&mut self, orphans: &[usize]) {
        let names = orphans
            .iter()
            .map(|&idx| self.descriptors[idx].category.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(orphans = %names, "Running services whose parent category never ran");
        self.result
            .add_note(format!("Orphaned services with unmatched parent: {names}"));
    }

    fn visit(&mut self, idx: usize, first: bool, orphan_level: bool) -> Result<Flow> {
        let descriptor = &self.descriptors[idx];
        let category = descriptor.category.clone();
        let parent_included = descriptor
            .parent
            .as_ref()
            .is_some_and(|p| self.included.contains(p));

        let should_run = if orphan_level {
            parent_included || self.included.contains(&category)
        } else if first {
            self.included.contains(&category)
        } else {
            parent_included
        };
        if !should_run {
            debug!(category = %category, "Category not included");
            return Ok(Flow::Continue);
        }

        if let Some(parent) = descriptor.parent.as_ref().filter(|p| self.failed.contains(*p)) {
            info!(category = %category, parent = %parent, "Skipping category of failed parent");
            self.result.add_summary("Skipped", category.as_str());
            self.result
                .add_note(format!("{category} skipped because {parent} failed"));
            self.failed.insert(category);
            return Ok(Flow::Continue);
        }

        let flow = self.run_service(idx, &category)?;
        if flow == Flow::Continue && !self.failed.contains(&category) {
            self.included.insert(category);
        }
        Ok(flow)
    }

    fn run_service(&mut self, idx: usize, category: &CategoryName) -> Result<Flow> {
        let store = self.orchestrator.checkpoints.as_ref();
        let mut checkpoint = match self.checkpoints.remove(category) {
            Some(checkpoint) => checkpoint,
            None => {
                let checkpoint = Checkpoint::new(self.job.id.clone(), category.clone());
                store.upsert(&checkpoint)?;
                checkpoint
            },
        };
        if checkpoint.completed {
            debug!(category = %category, "Category already completed");
            self.result.add_summary("Already completed", category.as_str());
            return Ok(Flow::Continue);
        }
        checkpoint.failed = false;

        let service = &mut self.services[idx];
        let mut ctx = ServiceContext::new(
            &mut *self.result,
            self.archive,
            self.token,
            checkpoint,
            store,
            self.budget,
        );
        if ctx.update_checkpoint()? {
            debug!(category = %category, "Stop requested before service start");
            return Ok(if self.token.is_cancelled() {
                Flow::Cancelled
            } else {
                Flow::OutOfTime
            });
        }

        debug!(category = %category, "Running service");
        let outcome = match self.job.kind {
            JobKind::Export => service.export_data(&mut ctx, self.job, self.request),
            JobKind::Import => service.import_data(&mut ctx, self.job, self.request),
        };
        let stopped = ctx.stop_requested();
        let mut checkpoint = ctx.into_checkpoint();
        self.result.executed.push(category.clone());
        let direction = self.job.kind.as_str();

        match outcome {
            Ok(()) => {
                checkpoint.completed = !stopped;
                checkpoint.touch();
                store.upsert(&checkpoint)?;
                metrics::counter!(
                    "porter_service_runs_total",
                    "direction" => direction,
                    "status" => "success"
                )
                .increment(1);

                let cancelled = self.token.is_cancelled();
                if checkpoint.completed {
                    info!(category = %category, "Category finished");
                    self.result
                        .add_summary(self.job.kind.completed_label(), category.as_str());
                    Ok(if cancelled { Flow::Cancelled } else { Flow::Continue })
                } else {
                    info!(category = %category, "Category interrupted");
                    self.result.add_summary("Interrupted", category.as_str());
                    Ok(if cancelled {
                        Flow::Cancelled
                    } else {
                        Flow::OutOfTime
                    })
                }
            },
            Err(e) => {
                checkpoint.failed = true;
                checkpoint.touch();
                store.upsert(&checkpoint)?;
                metrics::counter!(
                    "porter_service_runs_total",
                    "direction" => direction,
                    "status" => "error"
                )
                .increment(1);

                warn!(category = %category, error = %e, "Service failed");
                self.result.add_summary("Failed", category.as_str());
                self.result.add_note(format!("{category} failed: {e}"));
                self.failed.insert(category.clone());
                Ok(match self.orchestrator.failure_policy {
                    FailurePolicy::FailFast => Flow::Failed,
                    FailurePolicy::Isolate => Flow::Continue,
                })
            },
        }
    }
}

fn record_job(job: &Job, started: Instant) {
    metrics::counter!(
        "porter_jobs_total",
        "direction" => job.kind.as_str(),
        "status" => job.status.as_str()
    )
    .increment(1);
    metrics::histogram!("porter_job_duration_ms", "direction" => job.kind.as_str())
        .record(started.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportRequest, JobId};

    fn orchestrator(dir: &Path) -> Orchestrator {
        let store = Arc::new(SqliteStateStore::in_memory().unwrap());
        let jobs: Arc<dyn JobStore> = store.clone();
        Orchestrator::new(ServiceRegistry::new(), jobs, store, dir)
    }

    #[test]
    fn test_empty_export_selection_fails_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let mut job = Job::export(&ExportRequest::new(Vec::<String>::new())).unwrap();

        let result = orchestrator.run(&mut job).unwrap();
        assert_eq!(result.status, JobStatus::DoneFailure);
        assert!(result.notes[0].contains("selects no categories"));
        assert!(job.completed_at.is_some());
        assert!(!orchestrator.archive_path(&job.archive_base()).exists());
    }

    #[test]
    fn test_import_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let mut job = Job::import(&ImportRequest::new("../outside.db")).unwrap();

        let result = orchestrator.run(&mut job).unwrap();
        assert_eq!(result.status, JobStatus::DoneFailure);
        assert!(result.notes[0].contains("plain file name"));
    }

    #[test]
    fn test_export_without_services_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let mut job = Job::export(&ExportRequest::new(["users"]))
            .unwrap()
            .with_id(JobId::new("empty"));

        let result = orchestrator.run(&mut job).unwrap();
        assert_eq!(result.status, JobStatus::DoneSuccess);
        assert!(result.archive_size.is_some_and(|size| size > 0));
        assert!(dir.path().join("export-empty.porter.db").is_file());

        let saved = orchestrator.jobs().load(&job.id).unwrap().unwrap();
        assert_eq!(saved.status, JobStatus::DoneSuccess);
        assert!(!orchestrator.cancellations().is_registered(&job.cancellation_key()));
    }
}
