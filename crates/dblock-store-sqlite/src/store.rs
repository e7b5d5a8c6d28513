// crates/dblock-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Transactional Resource
// Description: One rusqlite connection per worker with manual transactions.
// Purpose: Run lock strategies against a real SQLite database file.
// Dependencies: dblock-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteResource`] keeps its connection outside autocommit: the first
//! statement after a commit or rollback issues `BEGIN` in the configured
//! [`SqliteBeginMode`]. `SQLite` result codes are mapped to
//! [`StoreError`] variants here; message text is never inspected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use dblock_core::ResourceFactory;
use dblock_core::SqlDialect;
use dblock_core::StoreError;
use dblock_core::TransactionalResource;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::ffi;
use rusqlite::params_from_iter;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default database file.
const DEFAULT_DATABASE_PATH: &str = "dblock.sqlite";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode; readers do not block the writer.
    #[default]
    Wal,
    /// Delete journal mode (rollback journal).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Lock mode of the implicit `BEGIN`.
///
/// # Invariants
/// - Values map 1:1 to `BEGIN DEFERRED | IMMEDIATE | EXCLUSIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteBeginMode {
    /// Take the write lock on the first write.
    Deferred,
    /// Take the write lock at `BEGIN`, waiting up to the busy timeout.
    #[default]
    Immediate,
    /// Take an exclusive lock at `BEGIN`.
    Exclusive,
}

impl SqliteBeginMode {
    /// Returns the `BEGIN` statement for the mode.
    #[must_use]
    pub const fn begin_statement(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED",
            Self::Immediate => "BEGIN IMMEDIATE",
            Self::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Configuration for `SQLite` lock resources.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteResourceConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// `BEGIN` lock mode.
    #[serde(default)]
    pub begin_mode: SqliteBeginMode,
}

impl SqliteResourceConfig {
    /// Creates a config for `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the path is unsafe.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_database_path(&self.path)
    }
}

impl Default for SqliteResourceConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            begin_mode: SqliteBeginMode::default(),
        }
    }
}

/// Returns the default database path.
fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a rusqlite error to a [`StoreError`] from its result codes.
fn map_sqlite_error(error: &rusqlite::Error) -> StoreError {
    let rusqlite::Error::SqliteFailure(failure, _) = error else {
        return StoreError::Store(error.to_string());
    };
    match failure.code {
        ErrorCode::ConstraintViolation
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::UniqueViolation(error.to_string())
        }
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Busy(error.to_string()),
        ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::DiskFull => {
            StoreError::Io(error.to_string())
        }
        _ => StoreError::Store(error.to_string()),
    }
}

// ============================================================================
// SECTION: Resource
// ============================================================================

/// One `SQLite` connection driven with explicit transactions.
pub struct SqliteResource {
    /// Underlying connection.
    connection: Connection,
    /// Lock mode of implicit transactions.
    begin_mode: SqliteBeginMode,
}

impl SqliteResource {
    /// Opens a connection with the configured pragmas.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid or the database
    /// cannot be opened.
    pub fn open(config: &SqliteResourceConfig) -> Result<Self, SqliteStoreError> {
        validate_database_path(&config.path)?;
        let connection = open_connection(config)?;
        Ok(Self {
            connection,
            begin_mode: config.begin_mode,
        })
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }

    /// Opens a transaction unless one is already active.
    fn begin_if_needed(&mut self) -> Result<(), StoreError> {
        if self.connection.is_autocommit() {
            self.connection
                .execute_batch(self.begin_mode.begin_statement())
                .map_err(|err| map_sqlite_error(&err))?;
        }
        Ok(())
    }
}

impl TransactionalResource for SqliteResource {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError> {
        self.begin_if_needed()?;
        self.connection.execute_batch(sql).map_err(|err| map_sqlite_error(&err))
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64, StoreError> {
        self.begin_if_needed()?;
        let mut statement =
            self.connection.prepare_cached(sql).map_err(|err| map_sqlite_error(&err))?;
        let rows =
            statement.execute(params_from_iter(params.iter())).map_err(|err| map_sqlite_error(&err))?;
        u64::try_from(rows).map_err(|_| StoreError::Invalid("row count overflow".to_string()))
    }

    fn query_i64(&mut self, sql: &str, params: &[i64]) -> Result<Option<i64>, StoreError> {
        self.begin_if_needed()?;
        let mut statement =
            self.connection.prepare_cached(sql).map_err(|err| map_sqlite_error(&err))?;
        statement
            .query_row(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))
            .optional()
            .map_err(|err| map_sqlite_error(&err))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection.execute_batch("COMMIT").map_err(|err| map_sqlite_error(&err))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection.execute_batch("ROLLBACK").map_err(|err| map_sqlite_error(&err))
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Opens one [`SqliteResource`] per worker on the same database file.
#[derive(Debug, Clone)]
pub struct SqliteResourceFactory {
    /// Shared connection settings.
    config: SqliteResourceConfig,
}

impl SqliteResourceFactory {
    /// Validates the config and prepares the database directory.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is unsafe or its parent
    /// directory cannot be created.
    pub fn new(config: SqliteResourceConfig) -> Result<Self, SqliteStoreError> {
        validate_database_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        Ok(Self {
            config,
        })
    }

    /// Returns the connection settings.
    #[must_use]
    pub const fn config(&self) -> &SqliteResourceConfig {
        &self.config
    }
}

impl ResourceFactory for SqliteResourceFactory {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn open(&self) -> Result<Box<dyn TransactionalResource>, StoreError> {
        let resource = SqliteResource::open(&self.config)?;
        Ok(Box::new(resource))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the directory that will hold the lock database.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| SqliteStoreError::Io(format!("{}: {err}", parent.display()))),
        Some(_) => Ok(()),
        None => Err(SqliteStoreError::Io(format!(
            "lock database {} has no parent directory",
            path.display()
        ))),
    }
}

/// Checks the lock database path before any connection opens it.
fn validate_database_path(path: &Path) -> Result<(), SqliteStoreError> {
    let invalid = |reason: &str| -> Result<(), SqliteStoreError> {
        Err(SqliteStoreError::Invalid(format!("lock database path {reason}")))
    };
    if path.as_os_str().is_empty() {
        return invalid("is empty");
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return invalid(&format!("is longer than {MAX_TOTAL_PATH_LENGTH} bytes"));
    }
    if path.components().any(|part| part.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return invalid(&format!("has a component longer than {MAX_PATH_COMPONENT_LENGTH} bytes"));
    }
    if path.is_dir() {
        return invalid(&format!("{} is a directory", path.display()));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteResourceConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas; the busy timeout goes first so the journal
/// switch itself waits on peers.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteResourceConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
