// crates/dblock-core/src/runtime/strategy.rs
// ============================================================================
// Module: dblock Lock Strategy Contract
// Description: Variant contract for SQL-only lock patterns.
// Purpose: Separate expected contention from fatal store failures.
// Dependencies: crate::core, crate::interfaces, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`LockStrategy`] turns a schema shape into `try_acquire`/`release`
//! operations. Every call runs through the calling worker's own
//! [`TransactionalResource`]. Strategies report contention as data
//! ([`AcquireOutcome::Contended`], [`ReleaseOutcome::Contended`]) and reserve
//! `Err` for fatal failures.
//!
//! Ordering contract: the acquire transaction commits before the runner
//! enters the counter, and `release` exits the counter before its commit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::DomainIndex;
use crate::core::LockTable;
use crate::core::LockToken;
use crate::core::ViolationCounter;
use crate::core::WorkerId;
use crate::interfaces::SqlDialect;
use crate::interfaces::StoreError;
use crate::interfaces::TransactionalResource;
use crate::runtime::insert::InsertLock;
use crate::runtime::insert::PartitionedInsertLock;
use crate::runtime::update::ConditionalUpdateLock;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of one acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The acquire transaction committed; the worker holds the lock.
    Acquired,
    /// Another worker holds the lock (or won the race); retry.
    Contended,
}

/// Result of one release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The release transaction committed; the counter was exited before it.
    Released,
    /// The lock representation was not held by this worker; rolled back.
    NotHeld,
    /// Transient store contention; the worker still holds the lock.
    Contended,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal lock errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Store failure not classified as contention.
    #[error("lock store failure: {0}")]
    Store(#[from] StoreError),
    /// Invalid strategy wiring or unexpected store state.
    #[error("invalid lock state: {0}")]
    Invalid(String),
    /// A peer worker failed and the run is shutting down.
    #[error("run aborted after a peer worker failed")]
    Aborted,
}

/// Classification of a store error during acquire or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The lock is held elsewhere (or was not held); recover locally.
    ExpectedContention,
    /// Abort the worker and the run.
    Fatal,
}

/// Classifies a store error from its structured category.
#[must_use]
pub const fn classify(error: &StoreError) -> ErrorClass {
    if error.is_expected_contention() {
        ErrorClass::ExpectedContention
    } else {
        ErrorClass::Fatal
    }
}

// ============================================================================
// SECTION: Strategy Contract
// ============================================================================

/// SQL-only lock pattern under test.
///
/// Implementations are shared by every worker of a run and must keep all
/// per-worker state in the supplied [`LockToken`].
pub trait LockStrategy: Send + Sync {
    /// Returns the variant implemented by this strategy.
    fn variant(&self) -> LockVariant;

    /// Returns the table backing the lock domains.
    fn table(&self) -> &LockTable;

    /// Returns the number of independent lock domains.
    fn domain_count(&self) -> usize {
        1
    }

    /// Returns the domain (and counter) a worker contends on.
    fn domain_for(&self, _worker: WorkerId) -> DomainIndex {
        DomainIndex::PRIMARY
    }

    /// Creates or resets the schema and seeds rows, then commits.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when any setup statement fails.
    fn setup(&self, resource: &mut dyn TransactionalResource) -> Result<(), LockError>;

    /// Attempts to acquire the worker's lock domain.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] for failures not classified as contention.
    fn try_acquire(
        &self,
        resource: &mut dyn TransactionalResource,
        worker: WorkerId,
        token: &mut LockToken,
    ) -> Result<AcquireOutcome, LockError>;

    /// Releases the lock remembered in `token`, exiting `counter` just
    /// before the release commit.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] for failures not classified as contention.
    fn release(
        &self,
        resource: &mut dyn TransactionalResource,
        token: &mut LockToken,
        counter: &ViolationCounter,
    ) -> Result<ReleaseOutcome, LockError>;

    /// Counts lock representations still present (orphaned locks).
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the check query fails.
    fn residual_holders(&self, resource: &mut dyn TransactionalResource) -> Result<i64, LockError>;
}

// ============================================================================
// SECTION: Variants
// ============================================================================

/// Closed set of lock strategies selectable for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockVariant {
    /// Single fixed-token insert into a uniqueness table.
    #[default]
    Insert,
    /// Insert lock with two domains selected by worker parity.
    PartitionedInsert,
    /// Conditional `state` flip on one shared row.
    ConditionalUpdate,
}

impl LockVariant {
    /// Returns a stable label for the variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::PartitionedInsert => "partitioned_insert",
            Self::ConditionalUpdate => "conditional_update",
        }
    }

    /// Returns the default table name for the variant.
    #[must_use]
    pub const fn default_table(self) -> &'static str {
        match self {
            Self::Insert => "insert_lock",
            Self::PartitionedInsert => "multi_insert_lock",
            Self::ConditionalUpdate => "update_lock",
        }
    }

    /// Builds the strategy for `table` in `dialect`.
    #[must_use]
    pub fn build(self, table: LockTable, dialect: SqlDialect) -> Box<dyn LockStrategy> {
        match self {
            Self::Insert => Box::new(InsertLock::new(table, dialect)),
            Self::PartitionedInsert => Box::new(PartitionedInsertLock::new(table, dialect)),
            Self::ConditionalUpdate => Box::new(ConditionalUpdateLock::new(table, dialect)),
        }
    }
}

impl fmt::Display for LockVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Rolls back, ignoring failures; the caller already has a more relevant outcome.
pub(crate) fn rollback_quietly(resource: &mut dyn TransactionalResource) {
    let _ = resource.rollback();
}

/// Rolls back after an acquire failure and classifies it.
pub(crate) fn acquire_failed(
    resource: &mut dyn TransactionalResource,
    error: StoreError,
) -> Result<AcquireOutcome, LockError> {
    rollback_quietly(resource);
    match classify(&error) {
        ErrorClass::ExpectedContention => Ok(AcquireOutcome::Contended),
        ErrorClass::Fatal => Err(LockError::Store(error)),
    }
}

/// Rolls back after a release failure and classifies it.
pub(crate) fn release_failed(
    resource: &mut dyn TransactionalResource,
    error: StoreError,
) -> Result<ReleaseOutcome, LockError> {
    rollback_quietly(resource);
    match classify(&error) {
        ErrorClass::ExpectedContention => Ok(ReleaseOutcome::Contended),
        ErrorClass::Fatal => Err(LockError::Store(error)),
    }
}

/// Finishes a release whose statement removed exactly one lock representation.
///
/// The counter is exited before the commit so no peer can observe the lock
/// free while this worker is still counted. A commit that fails with
/// contention restores the holder, since the lock is still in place.
pub(crate) fn commit_release(
    resource: &mut dyn TransactionalResource,
    token: &mut LockToken,
    counter: &ViolationCounter,
) -> Result<ReleaseOutcome, LockError> {
    counter.exit();
    match resource.commit() {
        Ok(()) => {
            token.clear();
            Ok(ReleaseOutcome::Released)
        }
        Err(error) => {
            counter.restore();
            release_failed(resource, error)
        }
    }
}

/// Runs a setup statement sequence and commits, rolling back on failure.
pub(crate) fn run_setup(
    resource: &mut dyn TransactionalResource,
    statements: &[String],
) -> Result<(), LockError> {
    for statement in statements {
        if let Err(error) = resource.execute_batch(statement) {
            rollback_quietly(resource);
            return Err(LockError::Store(error));
        }
    }
    if let Err(error) = resource.commit() {
        rollback_quietly(resource);
        return Err(LockError::Store(error));
    }
    Ok(())
}

/// Runs a counting query and ends the read transaction.
pub(crate) fn count_rows(
    resource: &mut dyn TransactionalResource,
    sql: &str,
) -> Result<i64, LockError> {
    let counted = resource.query_i64(sql, &[]);
    rollback_quietly(resource);
    Ok(counted?.unwrap_or(0))
}
