//! Portable archive repository.
//!
//! An archive is a single `SQLite` file holding:
//!
//! - one *single item* metadata record (schema version, included categories,
//!   the originating export request)
//! - any number of category-scoped records written by services
//!
//! The handle is opened for the lifetime of one orchestrator run and closed
//! deterministically; [`ArchiveRepository::close`] does not return until the
//! finished file is durable and its size can be reported.

use super::sqlite::{acquire_lock, open_connection, open_existing_connection};
use crate::models::{CategoryName, ExportRequest};
use crate::observability::record_storage_operation;
use crate::{Error, Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, instrument};

const METADATA_KEY: &str = "metadata";

/// Metadata describing an archive as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Schema version of the engine that wrote the archive.
    pub schema_version: String,
    /// Categories included in the export.
    pub categories: Vec<CategoryName>,
    /// The export request the archive was produced from.
    pub request: Option<ExportRequest>,
    /// Export timestamp (Unix epoch seconds).
    pub exported_at: u64,
}

impl ArchiveMetadata {
    /// Creates metadata stamped with the current time.
    #[must_use]
    pub fn new(schema_version: impl Into<String>, categories: Vec<CategoryName>) -> Self {
        Self {
            schema_version: schema_version.into(),
            categories,
            request: None,
            exported_at: current_timestamp(),
        }
    }

    /// Attaches the originating export request.
    #[must_use]
    pub fn with_request(mut self, request: ExportRequest) -> Self {
        self.request = Some(request);
        self
    }
}

/// A category-scoped record stored in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// Owning category.
    pub category: CategoryName,
    /// Record key, unique within the category.
    pub key: String,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// Open handle on an archive file.
pub struct ArchiveRepository {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl ArchiveRepository {
    /// Creates a fresh archive, deleting any existing file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the old file cannot be removed or the new one created.
    #[instrument(fields(path = %path.display()))]
    pub fn create(path: &Path) -> Result<Self> {
        for stale in [path.to_path_buf(), sidecar(path, "-wal"), sidecar(path, "-shm")] {
            if stale.exists() {
                debug!(file = %stale.display(), "Removing previous archive file");
                std::fs::remove_file(&stale).map_err(|e| Error::operation("remove_archive", e))?;
            }
        }
        Self::open(path)
    }

    /// Opens an archive, creating it if missing and preserving existing content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_export_dir", e))?;
        }
        Self::initialize(open_connection(path)?, path)
    }

    /// Opens an archive that must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist.
    pub fn open_existing(path: &Path) -> Result<Self> {
        Self::initialize(open_existing_connection(path)?, path)
    }

    fn initialize(conn: Connection, path: &Path) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS single_item (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS records (
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                payload BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (category, key)
            );",
        )
        .map_err(|e| Error::operation("create_archive_tables", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Returns the archive file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the single metadata record, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn put_metadata(&self, metadata: &ArchiveMetadata) -> Result<()> {
        let value =
            serde_json::to_string(metadata).map_err(|e| Error::operation("encode_metadata", e))?;
        let start = Instant::now();
        let result = acquire_lock(&self.conn)
            .execute(
                "INSERT INTO single_item (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![METADATA_KEY, value],
            )
            .map(|_| ())
            .map_err(|e| Error::operation("put_metadata", e));
        record("put_metadata", start, &result);
        result
    }

    /// Reads the metadata record, if written.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record is corrupt.
    pub fn metadata(&self) -> Result<Option<ArchiveMetadata>> {
        let value: Option<String> = acquire_lock(&self.conn)
            .query_row(
                "SELECT value FROM single_item WHERE key = ?1",
                params![METADATA_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::operation("read_metadata", e))?;
        value
            .map(|v| serde_json::from_str(&v).map_err(|e| Error::operation("decode_metadata", e)))
            .transpose()
    }

    /// Stores a record under `(category, key)`, replacing an existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn put_record(&self, category: &CategoryName, key: &str, payload: &[u8]) -> Result<()> {
        let start = Instant::now();
        let result = acquire_lock(&self.conn)
            .execute(
                "INSERT INTO records (category, key, payload, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(category, key) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![
                    category.key(),
                    key,
                    payload,
                    i64::try_from(current_timestamp()).unwrap_or(i64::MAX)
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::operation("put_record", e));
        record("put_record", start, &result);
        result
    }

    /// Reads one record's payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn record(&self, category: &CategoryName, key: &str) -> Result<Option<Vec<u8>>> {
        acquire_lock(&self.conn)
            .query_row(
                "SELECT payload FROM records WHERE category = ?1 AND key = ?2",
                params![category.key(), key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::operation("get_record", e))
    }

    /// Lists the keys stored for a category in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn record_keys(&self, category: &CategoryName) -> Result<Vec<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT key FROM records WHERE category = ?1 ORDER BY key ASC")
            .map_err(|e| Error::operation("list_records", e))?;
        let keys = stmt
            .query_map(params![category.key()], |row| row.get(0))
            .map_err(|e| Error::operation("list_records", e))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| Error::operation("list_records", e))?;
        Ok(keys)
    }

    /// Returns all records of a category in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn records(&self, category: &CategoryName) -> Result<Vec<ArchiveRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT key, payload FROM records WHERE category = ?1 ORDER BY key ASC")
            .map_err(|e| Error::operation("list_records", e))?;
        let records = stmt
            .query_map(params![category.key()], |row| {
                Ok(ArchiveRecord {
                    category: category.clone(),
                    key: row.get(0)?,
                    payload: row.get(1)?,
                })
            })
            .map_err(|e| Error::operation("list_records", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("list_records", e))?;
        Ok(records)
    }

    /// Counts the records of a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn record_count(&self, category: &CategoryName) -> Result<u64> {
        let count: i64 = acquire_lock(&self.conn)
            .query_row(
                "SELECT COUNT(*) FROM records WHERE category = ?1",
                params![category.key()],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("count_records", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Closes the archive and returns its final size in bytes.
    ///
    /// Folds the write-ahead log into the main file, closes the connection and
    /// syncs the file, so the archive is complete and visible on return.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint, close or sync fails.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn close(self) -> Result<u64> {
        let start = Instant::now();
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .map_err(|e| Error::operation("checkpoint_archive", e))?;
        conn.close()
            .map_err(|(_, e)| Error::operation("close_archive", e))?;

        let file = File::open(&self.path).map_err(|e| Error::operation("sync_archive", e))?;
        file.sync_all()
            .map_err(|e| Error::operation("sync_archive", e))?;
        let size = file
            .metadata()
            .map_err(|e| Error::operation("stat_archive", e))?
            .len();

        record_storage_operation("archive", "close", start, "success");
        debug!(size, "Archive closed");
        Ok(size)
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn record<T>(operation: &'static str, start: Instant, result: &Result<T>) {
    let status = if result.is_ok() { "success" } else { "error" };
    record_storage_operation("archive", operation, start, status);
}
