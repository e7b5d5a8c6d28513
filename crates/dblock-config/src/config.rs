// crates/dblock-config/src/config.rs
// ============================================================================
// Module: dblock Configuration
// Description: Configuration loading and validation for lock runs.
// Purpose: Provide strict, fail-closed config parsing for dblock.toml.
// Dependencies: dblock-core, dblock-store-sqlite, dblock-store-postgres, serde, toml
// ============================================================================

//! ## Overview
//! The config file is resolved from an explicit path, then the
//! `DBLOCK_CONFIG` environment variable, then `./dblock.toml`. Every section
//! has defaults, so an empty file describes the default run: the insert
//! lock, eight workers, ten cycles each, on a local `SQLite` file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use dblock_core::EventLevel;
use dblock_core::HarnessConfig;
use dblock_core::LockTable;
use dblock_core::LockVariant;
use dblock_core::SqlDialect;
use dblock_core::runtime::DEFAULT_QUOTA;
use dblock_core::runtime::DEFAULT_WORKERS;
use dblock_store_postgres::PostgresResourceConfig;
use dblock_store_sqlite::SqliteResourceConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "dblock.toml";
/// Environment variable overriding the config path.
pub const CONFIG_ENV_VAR: &str = "DBLOCK_CONFIG";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum number of workers per run.
pub const MAX_WORKERS: u32 = 256;
/// Maximum cycles per worker.
pub const MAX_QUOTA: u32 = 1_000_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root configuration for dblock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DblockConfig {
    /// Run shape.
    #[serde(default)]
    pub run: RunConfig,
    /// Lock table naming.
    #[serde(default)]
    pub lock: LockConfig,
    /// Store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Event logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Run shape: which lock, how many workers, how many cycles each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Lock strategy under test.
    pub variant: LockVariant,
    /// Number of concurrent workers.
    pub workers: u32,
    /// Released cycles per worker.
    pub quota: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            variant: LockVariant::default(),
            workers: DEFAULT_WORKERS,
            quota: DEFAULT_QUOTA,
        }
    }
}

/// Lock table naming; unset parts fall back to backend and variant defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Schema holding the lock table.
    pub schema: Option<String>,
    /// Lock table name.
    pub table: Option<String>,
}

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// `SQLite` database file.
    Sqlite(SqliteResourceConfig),
    /// `PostgreSQL` server.
    Postgres(PostgresResourceConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite(SqliteResourceConfig::default())
    }
}

impl StoreConfig {
    /// Returns the SQL dialect of the backend.
    #[must_use]
    pub const fn dialect(&self) -> SqlDialect {
        match self {
            Self::Sqlite(_) => SqlDialect::Sqlite,
            Self::Postgres(_) => SqlDialect::Postgres,
        }
    }

    /// Validates backend settings without connecting.
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Sqlite(config) => {
                config.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))
            }
            Self::Postgres(config) => config
                .client_config()
                .map(|_| ())
                .map_err(|err| ConfigError::Invalid(format!("store: {err}"))),
        }
    }
}

/// Event log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSink {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `logging.path`.
    File,
    /// Discard events.
    None,
}

/// Event logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Destination.
    pub sink: LogSink,
    /// Minimum level written.
    pub level: EventLevel,
    /// Log file for the `file` sink.
    pub path: Option<PathBuf>,
}

impl LoggingConfig {
    /// Validates sink settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSink::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (LogSink::File, Some(path)) => validate_path_string("logging.path", path),
            (LogSink::Stderr | LogSink::None, _) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Loading and Validation
// ============================================================================

impl DblockConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Loads configuration like [`Self::load`], falling back to defaults
    /// when no path is given, the environment variable is unset, and no
    /// `dblock.toml` exists in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if path.is_none()
            && env::var_os(CONFIG_ENV_VAR).is_none()
            && !Path::new(DEFAULT_CONFIG_NAME).exists()
        {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Parses and validates TOML content.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.workers == 0 || self.run.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "run.workers must be between 1 and {MAX_WORKERS}"
            )));
        }
        if self.run.quota == 0 || self.run.quota > MAX_QUOTA {
            return Err(ConfigError::Invalid(format!("run.quota must be between 1 and {MAX_QUOTA}")));
        }
        self.lock_table()?;
        self.store.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Returns the validated lock table for the configured backend and variant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the schema or table is not a
    /// plain identifier, or names a `SQLite` schema other than `main`.
    pub fn lock_table(&self) -> Result<LockTable, ConfigError> {
        let dialect = self.store.dialect();
        let schema = self.lock.schema.as_deref().unwrap_or(dialect.default_schema());
        // temp is private to one connection; workers would never share the table.
        if dialect == SqlDialect::Sqlite && schema != "main" {
            return Err(ConfigError::Invalid(format!(
                "lock.schema {schema} is not shared across sqlite connections (use main)"
            )));
        }
        let table = self.lock.table.as_deref().unwrap_or(self.run.variant.default_table());
        LockTable::new(schema, table).map_err(|err| ConfigError::Invalid(format!("lock: {err}")))
    }

    /// Returns the harness run shape.
    #[must_use]
    pub const fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            workers: self.run.workers,
            quota: self.run.quota,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured file path.
fn validate_path_string(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
