// crates/dblock-config/tests/config_validation.rs
// ============================================================================
// Module: Config Validation Tests
// Description: Defaults, limits, and cross-section validation.
// Purpose: Ensure invalid run shapes are rejected before any worker starts.
// ============================================================================

//! Config validation tests for dblock-config.

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

use dblock_config::ConfigError;
use dblock_config::DblockConfig;
use dblock_config::LogSink;
use dblock_config::MAX_QUOTA;
use dblock_config::MAX_WORKERS;
use dblock_config::StoreConfig;
use dblock_core::EventLevel;
use dblock_core::LockVariant;
use dblock_core::SqlDialect;

fn invalid(content: &str) -> String {
    match DblockConfig::from_toml_str(content) {
        Err(ConfigError::Invalid(message)) => message,
        Err(other) => panic!("expected invalid config, got {other}"),
        Ok(config) => panic!("expected invalid config, got {config:?}"),
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn empty_file_is_the_default_run() {
    let config = DblockConfig::from_toml_str("").unwrap();
    assert_eq!(config, DblockConfig::default());
    assert_eq!(config.run.variant, LockVariant::Insert);
    assert_eq!(config.harness_config().workers, 8);
    assert_eq!(config.harness_config().quota, 10);
    assert_eq!(config.store.dialect(), SqlDialect::Sqlite);
    assert_eq!(config.logging.sink, LogSink::Stderr);
    assert_eq!(config.logging.level, EventLevel::Info);
    assert_eq!(config.lock_table().unwrap().qualified(), "main.insert_lock");
}

#[test]
fn postgres_store_uses_lock_schema() {
    let config = DblockConfig::from_toml_str(
        r#"
[run]
variant = "partitioned_insert"

[store]
type = "postgres"
connection = "host=localhost user=dblock dbname=dblock"
isolation = "repeatable_read"
"#,
    )
    .unwrap();
    assert!(matches!(config.store, StoreConfig::Postgres(_)));
    assert_eq!(config.lock_table().unwrap().qualified(), "db_locks.multi_insert_lock");
}

#[test]
fn explicit_lock_names_override_defaults() {
    let config = DblockConfig::from_toml_str(
        r#"
[lock]
table = "orders_lock"

[store]
type = "postgres"

[lock_extra]
"#,
    );
    assert!(matches!(config, Err(ConfigError::Parse(_))));

    let config = DblockConfig::from_toml_str(
        r#"
[lock]
schema = "locks"
table = "orders_lock"

[store]
type = "postgres"
"#,
    )
    .unwrap();
    assert_eq!(config.lock_table().unwrap().qualified(), "locks.orders_lock");
}

// ============================================================================
// SECTION: Limits
// ============================================================================

#[test]
fn worker_count_is_bounded() {
    assert!(invalid("[run]\nworkers = 0").contains("run.workers"));
    assert!(invalid(&format!("[run]\nworkers = {}", MAX_WORKERS + 1)).contains("run.workers"));
    DblockConfig::from_toml_str(&format!("[run]\nworkers = {MAX_WORKERS}")).unwrap();
}

#[test]
fn quota_is_bounded() {
    assert!(invalid("[run]\nquota = 0").contains("run.quota"));
    assert!(invalid(&format!("[run]\nquota = {}", MAX_QUOTA + 1)).contains("run.quota"));
}

#[test]
fn unknown_variant_is_a_parse_error() {
    let result = DblockConfig::from_toml_str("[run]\nvariant = \"advisory\"");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

// ============================================================================
// SECTION: Cross-Section Validation
// ============================================================================

#[test]
fn lock_identifiers_must_be_plain() {
    assert!(invalid("[lock]\ntable = \"locks; DROP TABLE x\"").contains("lock"));
    assert!(invalid("[lock]\ntable = \"9lock\"").contains("lock"));
}

#[test]
fn sqlite_rejects_foreign_schema() {
    assert!(invalid("[lock]\nschema = \"db_locks\"").contains("sqlite"));
}

#[test]
fn sqlite_rejects_connection_private_temp_schema() {
    let message = invalid("[lock]\nschema = \"temp\"");
    assert!(message.contains("lock.schema temp"));
    DblockConfig::from_toml_str("[lock]\nschema = \"main\"").unwrap();
}

#[test]
fn file_sink_requires_path() {
    assert!(invalid("[logging]\nsink = \"file\"").contains("logging.path"));
    let config =
        DblockConfig::from_toml_str("[logging]\nsink = \"file\"\npath = \"dblock-events.jsonl\"\nlevel = \"debug\"")
            .unwrap();
    assert_eq!(config.logging.level, EventLevel::Debug);
}

#[test]
fn invalid_postgres_connection_is_rejected() {
    let message = invalid("[store]\ntype = \"postgres\"\nconnection = \"host=db port=not-a-port\"");
    assert!(message.starts_with("store:"));
}

#[test]
fn unknown_store_type_is_a_parse_error() {
    let result = DblockConfig::from_toml_str("[store]\ntype = \"oracle\"");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
