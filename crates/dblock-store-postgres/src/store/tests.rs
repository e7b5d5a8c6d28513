// crates/dblock-store-postgres/src/store/tests.rs
// ============================================================================
// Module: Postgres Resource Unit Tests
// Description: SQLSTATE classification and parameter conversion.
// Purpose: Validate error mapping without a live DB.
// ============================================================================

#![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

use dblock_core::StoreError;
use postgres::error::SqlState;

use super::int4_params;
use super::map_sql_state;

#[test]
fn postgres_unique_violation_is_contention() {
    let error = map_sql_state(&SqlState::UNIQUE_VIOLATION, "duplicate key".to_string(), false);
    assert!(matches!(error, StoreError::UniqueViolation(_)));
    assert!(error.is_expected_contention());
}

#[test]
fn postgres_aborted_transaction_follows_its_cause() {
    let after_unique =
        map_sql_state(&SqlState::IN_FAILED_SQL_TRANSACTION, "aborted".to_string(), true);
    assert!(after_unique.is_expected_contention());

    let after_defect =
        map_sql_state(&SqlState::IN_FAILED_SQL_TRANSACTION, "aborted".to_string(), false);
    assert!(!after_defect.is_expected_contention());
}

#[test]
fn postgres_lock_conflicts_are_busy() {
    for code in [
        SqlState::T_R_SERIALIZATION_FAILURE,
        SqlState::T_R_DEADLOCK_DETECTED,
        SqlState::LOCK_NOT_AVAILABLE,
    ] {
        let error = map_sql_state(&code, "conflict".to_string(), false);
        assert!(matches!(error, StoreError::Busy(_)), "{}", code.code());
    }
}

#[test]
fn postgres_schema_errors_are_fatal() {
    for code in [SqlState::UNDEFINED_TABLE, SqlState::SYNTAX_ERROR, SqlState::QUERY_CANCELED] {
        let error = map_sql_state(&code, "defect".to_string(), true);
        assert!(matches!(error, StoreError::Store(_)), "{}", code.code());
        assert!(!error.is_expected_contention());
    }
}

#[test]
fn postgres_params_bind_as_integer() {
    assert_eq!(int4_params(&[1, 2]).expect("in range"), vec![1, 2]);
    assert!(matches!(int4_params(&[i64::MAX]), Err(StoreError::Invalid(_))));
}
