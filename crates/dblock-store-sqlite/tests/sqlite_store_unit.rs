// crates/dblock-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Resource Unit Tests
// Description: Path safety, transaction control, and error code mapping.
// Purpose: Ensure SQLite failures reach the engine with the right category.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` resource invariants:
//! - Path safety checks (empty/component/directory rejection)
//! - Implicit transactions and commit visibility across connections
//! - Result-code mapping for unique violations, busy locks, and defects

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;

use dblock_core::StoreError;
use dblock_core::TransactionalResource;
use dblock_store_sqlite::SqliteBeginMode;
use dblock_store_sqlite::SqliteJournalMode;
use dblock_store_sqlite::SqliteResource;
use dblock_store_sqlite::SqliteResourceConfig;
use dblock_store_sqlite::SqliteResourceFactory;
use dblock_store_sqlite::SqliteStoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config_for(path: &Path) -> SqliteResourceConfig {
    SqliteResourceConfig::new(path)
}

fn resource_with_table(path: &Path) -> SqliteResource {
    let mut resource = SqliteResource::open(&config_for(path)).unwrap();
    resource.execute_batch("CREATE TABLE locks (id INTEGER NOT NULL PRIMARY KEY)").unwrap();
    resource.commit().unwrap();
    resource
}

// ============================================================================
// SECTION: Config
// ============================================================================

#[test]
fn sqlite_config_defaults_from_minimal_json() {
    let config: SqliteResourceConfig = serde_json::from_str(r#"{"path": "locks.db"}"#).unwrap();
    assert_eq!(config.path, Path::new("locks.db"));
    assert_eq!(config.busy_timeout_ms, 5_000);
    assert_eq!(config.journal_mode, SqliteJournalMode::Wal);
    assert_eq!(config.begin_mode, SqliteBeginMode::Immediate);
}

#[test]
fn sqlite_config_rejects_unknown_fields() {
    let result: Result<SqliteResourceConfig, _> =
        serde_json::from_str(r#"{"path": "locks.db", "pool": 4}"#);
    assert!(result.is_err());
}

#[test]
fn sqlite_store_rejects_directory_path() {
    let dir = tempfile::tempdir().unwrap();
    let result = SqliteResourceFactory::new(config_for(dir.path()));
    let Err(SqliteStoreError::Invalid(message)) = result else {
        panic!("directory accepted as lock database");
    };
    assert!(message.starts_with("lock database path"));
    assert!(message.ends_with("is a directory"));
}

#[test]
fn sqlite_store_rejects_empty_path() {
    let result = SqliteResourceFactory::new(config_for(Path::new("")));
    let Err(SqliteStoreError::Invalid(message)) = result else {
        panic!("empty lock database path accepted");
    };
    assert_eq!(message, "lock database path is empty");
}

#[test]
fn sqlite_store_rejects_overlong_component() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a".repeat(300));
    let result = SqliteResource::open(&config_for(&path));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_factory_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("locks.db");
    let factory = SqliteResourceFactory::new(config_for(&path)).unwrap();
    assert!(path.parent().unwrap().is_dir());
    assert_eq!(factory.config().path, path);
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

#[test]
fn sqlite_writes_stay_private_until_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks.db");
    let mut writer = resource_with_table(&path);
    let mut reader_config = config_for(&path);
    reader_config.begin_mode = SqliteBeginMode::Deferred;
    let mut reader = SqliteResource::open(&reader_config).unwrap();

    assert_eq!(writer.execute("INSERT INTO locks (id) VALUES (?1)", &[1]).unwrap(), 1);
    assert!(writer.in_transaction());
    assert_eq!(reader.query_i64("SELECT COUNT(*) FROM locks", &[]).unwrap(), Some(0));
    reader.rollback().unwrap();

    writer.commit().unwrap();
    assert!(!writer.in_transaction());
    assert_eq!(reader.query_i64("SELECT COUNT(*) FROM locks", &[]).unwrap(), Some(1));
    reader.rollback().unwrap();
}

#[test]
fn sqlite_rollback_discards_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks.db");
    let mut resource = resource_with_table(&path);

    resource.execute("INSERT INTO locks (id) VALUES (?1)", &[7]).unwrap();
    resource.rollback().unwrap();

    assert_eq!(resource.query_i64("SELECT COUNT(*) FROM locks", &[]).unwrap(), Some(0));
    assert_eq!(resource.query_i64("SELECT id FROM locks WHERE id = ?1", &[7]).unwrap(), None);
}

#[test]
fn sqlite_commit_and_rollback_without_transaction_are_noops() {
    let dir = tempfile::tempdir().unwrap();
    let mut resource = SqliteResource::open(&config_for(&dir.path().join("locks.db"))).unwrap();
    resource.commit().unwrap();
    resource.rollback().unwrap();
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

#[test]
fn sqlite_duplicate_key_maps_to_unique_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut resource = resource_with_table(&dir.path().join("locks.db"));
    resource.execute("INSERT INTO locks (id) VALUES (?1)", &[1]).unwrap();
    resource.commit().unwrap();

    let error = resource.execute("INSERT INTO locks (id) VALUES (?1)", &[1]).unwrap_err();

    assert!(matches!(error, StoreError::UniqueViolation(_)));
    assert!(error.is_expected_contention());
}

#[test]
fn sqlite_not_null_violation_is_not_contention() {
    let dir = tempfile::tempdir().unwrap();
    let mut resource = SqliteResource::open(&config_for(&dir.path().join("locks.db"))).unwrap();
    resource.execute_batch("CREATE TABLE flags (id INTEGER PRIMARY KEY, state INTEGER NOT NULL)").unwrap();
    resource.commit().unwrap();

    let error = resource.execute("INSERT INTO flags (id, state) VALUES (?1, NULL)", &[1]).unwrap_err();

    assert!(matches!(error, StoreError::Store(_)));
    assert!(!error.is_expected_contention());
}

#[test]
fn sqlite_missing_table_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut resource = SqliteResource::open(&config_for(&dir.path().join("locks.db"))).unwrap();

    let error = resource.execute("INSERT INTO missing (id) VALUES (?1)", &[1]).unwrap_err();

    assert!(matches!(error, StoreError::Store(_)));
}

#[test]
fn sqlite_held_write_lock_maps_to_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks.db");
    let mut holder = resource_with_table(&path);
    holder.execute("INSERT INTO locks (id) VALUES (?1)", &[1]).unwrap();

    let mut config = config_for(&path);
    config.busy_timeout_ms = 0;
    let mut waiter = SqliteResource::open(&config).unwrap();
    let error = waiter.execute("INSERT INTO locks (id) VALUES (?1)", &[2]).unwrap_err();

    assert!(matches!(error, StoreError::Busy(_)));
    assert!(error.is_expected_contention());
    holder.rollback().unwrap();
}
