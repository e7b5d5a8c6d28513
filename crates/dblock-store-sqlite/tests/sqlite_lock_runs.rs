// crates/dblock-store-sqlite/tests/sqlite_lock_runs.rs
// ============================================================================
// Module: SQLite Lock Run Tests
// Description: Concurrent harness runs of every lock variant on SQLite.
// Purpose: Validate that correct SQL lock patterns serialize real workers.
// ============================================================================

//! ## Overview
//! Full harness runs against a temp-file database: eight workers, ten
//! cycles each, one independent connection per worker.

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

use dblock_core::HarnessConfig;
use dblock_core::LockError;
use dblock_core::LockTable;
use dblock_core::LockToken;
use dblock_core::LockVariant;
use dblock_core::NoopEventSink;
use dblock_core::ResourceFactory;
use dblock_core::RunReport;
use dblock_core::SqlDialect;
use dblock_core::StoreError;
use dblock_core::TestHarness;
use dblock_core::WorkerId;
use dblock_store_sqlite::SqliteBeginMode;
use dblock_store_sqlite::SqliteResourceConfig;
use dblock_store_sqlite::SqliteResourceFactory;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn run_variant(path: &Path, variant: LockVariant, begin_mode: SqliteBeginMode) -> RunReport {
    let mut config = SqliteResourceConfig::new(path);
    config.begin_mode = begin_mode;
    let factory = SqliteResourceFactory::new(config).unwrap();
    let table = LockTable::new("main", variant.default_table()).unwrap();
    let lock = variant.build(table, factory.dialect());
    let harness_config = HarnessConfig {
        workers: 8,
        quota: 10,
    };
    TestHarness::new(harness_config, &factory, lock.as_ref(), &NoopEventSink).run().unwrap()
}

fn assert_clean(report: &RunReport) {
    assert_eq!(report.total_cycles(), 80);
    assert_eq!(report.total_violations(), 0, "{report:?}");
    assert_eq!(report.total_unlock_failures(), 0, "{report:?}");
    assert_eq!(report.residual_holders, 0);
    assert!(report.domains.iter().all(|domain| domain.final_holders == 0));
    assert!(report.domains.iter().all(|domain| domain.peak_holders == 1));
    assert!(report.is_clean());
}

// ============================================================================
// SECTION: Variants
// ============================================================================

#[test]
fn insert_lock_serializes_eight_workers() {
    let dir = tempfile::tempdir().unwrap();
    let report =
        run_variant(&dir.path().join("locks.db"), LockVariant::Insert, SqliteBeginMode::Immediate);
    assert_clean(&report);
    assert_eq!(report.table, "main.insert_lock");
    assert_eq!(report.variant, "insert");
}

#[test]
fn partitioned_insert_lock_serializes_each_parity() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_variant(
        &dir.path().join("locks.db"),
        LockVariant::PartitionedInsert,
        SqliteBeginMode::Immediate,
    );
    assert_clean(&report);
    assert_eq!(report.domains.len(), 2);
    assert!(report.domains.iter().all(|domain| domain.entries == 40));
}

#[test]
fn conditional_update_lock_serializes_eight_workers() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_variant(
        &dir.path().join("locks.db"),
        LockVariant::ConditionalUpdate,
        SqliteBeginMode::Immediate,
    );
    assert_clean(&report);
}

#[test]
fn deferred_transactions_surface_contention_without_violations() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_variant(
        &dir.path().join("locks.db"),
        LockVariant::ConditionalUpdate,
        SqliteBeginMode::Deferred,
    );
    assert_clean(&report);
}

#[test]
fn repeated_runs_reuse_the_same_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks.db");
    for variant in [LockVariant::Insert, LockVariant::ConditionalUpdate, LockVariant::Insert] {
        assert_clean(&run_variant(&path, variant, SqliteBeginMode::Immediate));
    }
}

// ============================================================================
// SECTION: Failures
// ============================================================================

#[test]
fn leftover_insert_row_is_cleared_by_setup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks.db");
    let factory = SqliteResourceFactory::new(SqliteResourceConfig::new(&path)).unwrap();
    let lock =
        LockVariant::Insert.build(LockTable::new("main", "insert_lock").unwrap(), SqlDialect::Sqlite);
    let mut resource = factory.open().unwrap();
    lock.setup(resource.as_mut()).unwrap();
    let mut token = LockToken::empty();
    lock.try_acquire(resource.as_mut(), WorkerId::new(0), &mut token).unwrap();
    assert_eq!(lock.residual_holders(resource.as_mut()).unwrap(), 1);
    drop(resource);

    assert_clean(&run_variant(&path, LockVariant::Insert, SqliteBeginMode::Immediate));
}

#[test]
fn acquire_against_missing_table_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let factory =
        SqliteResourceFactory::new(SqliteResourceConfig::new(dir.path().join("locks.db"))).unwrap();
    let lock =
        LockVariant::Insert.build(LockTable::new("main", "insert_lock").unwrap(), SqlDialect::Sqlite);
    let mut resource = factory.open().unwrap();
    let mut token = LockToken::empty();

    let error = lock.try_acquire(resource.as_mut(), WorkerId::new(0), &mut token).unwrap_err();

    assert!(matches!(error, LockError::Store(StoreError::Store(_))));
    assert_eq!(token.get(), None);
}
