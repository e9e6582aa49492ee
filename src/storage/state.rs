//! `SQLite`-backed job and checkpoint store.

use super::sqlite::{acquire_lock, configure_connection, open_connection};
use super::traits::{CheckpointStore, JobStore};
use crate::models::{CategoryName, Checkpoint, Job, JobId, JobKind, JobStatus};
use crate::observability::record_storage_operation;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// Job and checkpoint store sharing one `SQLite` database.
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`;
/// WAL mode and `busy_timeout` let separate processes share the file.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStateStore {
    /// Opens (creating if needed) the store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::operation("open_sqlite_in_memory", e))?;
        configure_connection(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS checkpoints (
                job_id TEXT NOT NULL,
                category_key TEXT NOT NULL,
                category TEXT NOT NULL,
                progress TEXT NOT NULL,
                stage INTEGER NOT NULL,
                total_items INTEGER NOT NULL,
                processed_items INTEGER NOT NULL,
                completed INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (job_id, category_key)
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);",
        )
        .map_err(|e| Error::operation("create_state_tables", e))
    }

    fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn build_job((id, kind, payload, status, created_at, completed_at): JobRow) -> Result<Job> {
        let kind = JobKind::parse(&kind)
            .ok_or_else(|| Error::operation("decode_job", format!("unknown job kind '{kind}'")))?;
        let status = JobStatus::parse(&status)
            .ok_or_else(|| Error::operation("decode_job", format!("unknown job status '{status}'")))?;
        Ok(Job {
            id: JobId::new(id),
            kind,
            payload,
            status,
            created_at: to_u64(created_at),
            completed_at: completed_at.map(to_u64),
        })
    }
}

/// Raw `jobs` row: id, kind, payload, status, `created_at`, `completed_at`.
type JobRow = (String, String, String, String, i64, Option<i64>);

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn finish<T>(operation: &'static str, start: Instant, result: Result<T>) -> Result<T> {
    let status = if result.is_ok() { "success" } else { "error" };
    record_storage_operation("state", operation, start, status);
    result
}

impl JobStore for SqliteStateStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status))]
    fn save(&self, job: &Job) -> Result<()> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = conn
            .execute(
                "INSERT INTO jobs (id, kind, payload, status, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    payload = excluded.payload,
                    status = excluded.status,
                    completed_at = excluded.completed_at",
                params![
                    job.id.as_str(),
                    job.kind.as_str(),
                    job.payload,
                    job.status.as_str(),
                    to_i64(job.created_at),
                    job.completed_at.map(to_i64),
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::operation("save_job", e));
        finish("save_job", start, result)
    }

    fn load(&self, id: &JobId) -> Result<Option<Job>> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = conn
            .query_row(
                "SELECT id, kind, payload, status, created_at, completed_at FROM jobs WHERE id = ?1",
                params![id.as_str()],
                Self::job_from_row,
            )
            .optional()
            .map_err(|e| Error::operation("load_job", e))
            .and_then(|row| row.map(Self::build_job).transpose());
        finish("load_job", start, result)
    }

    fn list(&self) -> Result<Vec<Job>> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        finish("list_jobs", start, list_jobs(&conn))
    }
}

fn list_jobs(conn: &Connection) -> Result<Vec<Job>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, payload, status, created_at, completed_at
             FROM jobs ORDER BY created_at ASC, rowid ASC",
        )
        .map_err(|e| Error::operation("list_jobs", e))?;
    let rows = stmt
        .query_map([], SqliteStateStore::job_from_row)
        .map_err(|e| Error::operation("list_jobs", e))?;
    let mut jobs = Vec::new();
    for row in rows {
        let row = row.map_err(|e| Error::operation("list_jobs", e))?;
        jobs.push(SqliteStateStore::build_job(row)?);
    }
    Ok(jobs)
}

fn load_checkpoints(conn: &Connection, job_id: &JobId) -> Result<Vec<Checkpoint>> {
    let mut stmt = conn
        .prepare(
            "SELECT category, progress, stage, total_items, processed_items,
                    completed, failed, updated_at
             FROM checkpoints WHERE job_id = ?1 ORDER BY rowid ASC",
        )
        .map_err(|e| Error::operation("load_checkpoints", e))?;
    let rows = stmt
        .query_map(params![job_id.as_str()], |row| {
            Ok(Checkpoint {
                job_id: job_id.clone(),
                category: CategoryName::new(row.get::<_, String>(0)?),
                progress: row.get(1)?,
                stage: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                total_items: to_u64(row.get(3)?),
                processed_items: to_u64(row.get(4)?),
                completed: row.get(5)?,
                failed: row.get(6)?,
                updated_at: to_u64(row.get(7)?),
            })
        })
        .map_err(|e| Error::operation("load_checkpoints", e))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::operation("load_checkpoints", e))
}

impl CheckpointStore for SqliteStateStore {
    fn checkpoints(&self, job_id: &JobId) -> Result<Vec<Checkpoint>> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        finish("load_checkpoints", start, load_checkpoints(&conn, job_id))
    }

    #[instrument(skip(self, checkpoint), fields(job_id = %checkpoint.job_id, category = %checkpoint.category))]
    fn upsert(&self, checkpoint: &Checkpoint) -> Result<()> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = conn
            .execute(
                "INSERT INTO checkpoints (job_id, category_key, category, progress, stage,
                    total_items, processed_items, completed, failed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(job_id, category_key) DO UPDATE SET
                    progress = excluded.progress,
                    stage = excluded.stage,
                    total_items = excluded.total_items,
                    processed_items = excluded.processed_items,
                    completed = excluded.completed,
                    failed = excluded.failed,
                    updated_at = excluded.updated_at",
                params![
                    checkpoint.job_id.as_str(),
                    checkpoint.category.key(),
                    checkpoint.category.as_str(),
                    checkpoint.progress,
                    i64::from(checkpoint.stage),
                    to_i64(checkpoint.total_items),
                    to_i64(checkpoint.processed_items),
                    checkpoint.completed,
                    checkpoint.failed,
                    to_i64(checkpoint.updated_at),
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::operation("upsert_checkpoint", e));
        finish("upsert_checkpoint", start, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_roundtrip() {
        let store = SqliteStateStore::in_memory().unwrap();
        let mut job = Job::new(JobId::new("job-1"), JobKind::Export, r#"{"categories":["pages"]}"#);
        store.save(&job).unwrap();

        job.finish(JobStatus::DoneSuccess);
        store.save(&job).unwrap();

        let loaded = store.load(&job.id).unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(store.load(&JobId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn test_pending_excludes_terminal_jobs() {
        let store = SqliteStateStore::in_memory().unwrap();
        let running = Job::new(JobId::new("a"), JobKind::Export, "{}");
        let mut done = Job::new(JobId::new("b"), JobKind::Import, "{}");
        done.finish(JobStatus::DoneFailure);
        store.save(&running).unwrap();
        store.save(&done).unwrap();

        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, running.id);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_one_checkpoint_per_category_regardless_of_case() {
        let store = SqliteStateStore::in_memory().unwrap();
        let job_id = JobId::new("job");
        store
            .upsert(&Checkpoint::new(job_id.clone(), CategoryName::new("Pages")))
            .unwrap();
        let mut updated =
            Checkpoint::new(job_id.clone(), CategoryName::new("pages")).with_progress("home.html");
        updated.processed_items = 3;
        store.upsert(&updated).unwrap();

        let checkpoints = store.checkpoints(&job_id).unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].progress, "home.html");
        assert_eq!(checkpoints[0].processed_items, 3);

        let by_category = store.load_checkpoints(&job_id).unwrap();
        assert!(by_category.contains_key(&CategoryName::new("PAGES")));
    }

    #[test]
    fn test_final_sigma_spellings_share_one_checkpoint() {
        let store = SqliteStateStore::in_memory().unwrap();
        let job_id = JobId::new("job");
        let upper = CategoryName::new("ΑΣ");
        let lower = CategoryName::new("ασ");
        assert_eq!(upper, lower);

        store.upsert(&Checkpoint::new(job_id.clone(), upper)).unwrap();
        store
            .upsert(&Checkpoint::new(job_id.clone(), lower).with_progress("done"))
            .unwrap();

        let checkpoints = store.checkpoints(&job_id).unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].progress, "done");
        assert_eq!(store.load_checkpoints(&job_id).unwrap().len(), 1);
    }

    #[test]
    fn test_checkpoints_are_scoped_per_job() {
        let store = SqliteStateStore::in_memory().unwrap();
        store
            .upsert(&Checkpoint::new(JobId::new("a"), CategoryName::new("users")))
            .unwrap();
        assert!(store.checkpoints(&JobId::new("b")).unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = SqliteStateStore::new(&path).unwrap();
            store
                .save(&Job::new(JobId::new("persisted"), JobKind::Import, "{}"))
                .unwrap();
        }
        let store = SqliteStateStore::new(&path).unwrap();
        assert!(store.load(&JobId::new("persisted")).unwrap().is_some());
        assert_eq!(store.db_path(), Some(path.as_path()));
    }
}
