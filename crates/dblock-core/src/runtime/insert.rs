// crates/dblock-core/src/runtime/insert.rs
// ============================================================================
// Module: dblock Insert Locks
// Description: Unique-insert lock patterns (single and parity-partitioned).
// Purpose: Hold a lock by owning a committed row under a primary key.
// Dependencies: crate::core, crate::interfaces, crate::runtime::strategy
// ============================================================================

//! ## Overview
//! Acquiring inserts a fixed key into a primary-key table and commits; only
//! one committed row per key can exist, so a unique violation means another
//! worker holds the lock. Releasing deletes the row. The partitioned variant
//! keys the row and the counter by worker parity, giving two independent
//! domains in one table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::DomainIndex;
use crate::core::LockTable;
use crate::core::LockToken;
use crate::core::ViolationCounter;
use crate::core::WorkerId;
use crate::interfaces::SqlDialect;
use crate::interfaces::TransactionalResource;
use crate::runtime::strategy::AcquireOutcome;
use crate::runtime::strategy::LockError;
use crate::runtime::strategy::LockStrategy;
use crate::runtime::strategy::LockVariant;
use crate::runtime::strategy::ReleaseOutcome;
use crate::runtime::strategy::acquire_failed;
use crate::runtime::strategy::commit_release;
use crate::runtime::strategy::count_rows;
use crate::runtime::strategy::release_failed;
use crate::runtime::strategy::rollback_quietly;
use crate::runtime::strategy::run_setup;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Row key of the single-token lock.
const SINGLE_TOKEN_KEY: i64 = 1;

// ============================================================================
// SECTION: Shared Mechanics
// ============================================================================

/// Prepared statements shared by both insert variants.
#[derive(Debug, Clone)]
struct InsertRows {
    /// Lock table.
    table: LockTable,
    /// Schema and table creation plus reset statements.
    setup: Vec<String>,
    /// Lock row insert.
    insert: String,
    /// Lock row delete.
    delete: String,
    /// Residual row count.
    residual: String,
}

impl InsertRows {
    /// Builds the statements for `table`.
    fn new(table: LockTable, dialect: SqlDialect) -> Self {
        let qualified = table.qualified();
        let mut setup: Vec<String> = dialect.create_schema(table.schema()).into_iter().collect();
        setup.push(format!(
            "CREATE TABLE IF NOT EXISTS {qualified} (id INTEGER NOT NULL PRIMARY KEY)"
        ));
        setup.push(format!("DELETE FROM {qualified}"));
        Self {
            insert: format!("INSERT INTO {qualified} (id) VALUES ({})", dialect.placeholder(1)),
            delete: format!("DELETE FROM {qualified} WHERE id = {}", dialect.placeholder(1)),
            residual: format!("SELECT COUNT(*) FROM {qualified}"),
            setup,
            table,
        }
    }

    /// Inserts `key` and commits.
    fn acquire(
        &self,
        resource: &mut dyn TransactionalResource,
        key: i64,
        token: &mut LockToken,
    ) -> Result<AcquireOutcome, LockError> {
        let inserted = match resource.execute(&self.insert, &[key]) {
            Ok(rows) => rows,
            Err(error) => return acquire_failed(resource, error),
        };
        if inserted == 0 {
            rollback_quietly(resource);
            return Ok(AcquireOutcome::Contended);
        }
        if let Err(error) = resource.commit() {
            return acquire_failed(resource, error);
        }
        token.set(key);
        Ok(AcquireOutcome::Acquired)
    }

    /// Deletes the remembered key, exiting `counter` before the commit.
    fn release(
        &self,
        resource: &mut dyn TransactionalResource,
        token: &mut LockToken,
        counter: &ViolationCounter,
    ) -> Result<ReleaseOutcome, LockError> {
        let Some(key) = token.get() else {
            return Ok(ReleaseOutcome::NotHeld);
        };
        let deleted = match resource.execute(&self.delete, &[key]) {
            Ok(rows) => rows,
            Err(error) => return release_failed(resource, error),
        };
        match deleted {
            1 => commit_release(resource, token, counter),
            0 => {
                rollback_quietly(resource);
                token.clear();
                Ok(ReleaseOutcome::NotHeld)
            }
            rows => {
                rollback_quietly(resource);
                Err(LockError::Invalid(format!("release of key {key} removed {rows} rows")))
            }
        }
    }
}

// ============================================================================
// SECTION: Single-Token Insert Lock
// ============================================================================

/// Every worker contends for the same row key in one domain.
#[derive(Debug, Clone)]
pub struct InsertLock {
    /// Shared insert mechanics.
    rows: InsertRows,
}

impl InsertLock {
    /// Creates the strategy for `table`.
    #[must_use]
    pub fn new(table: LockTable, dialect: SqlDialect) -> Self {
        Self {
            rows: InsertRows::new(table, dialect),
        }
    }
}

impl LockStrategy for InsertLock {
    fn variant(&self) -> LockVariant {
        LockVariant::Insert
    }

    fn table(&self) -> &LockTable {
        &self.rows.table
    }

    fn setup(&self, resource: &mut dyn TransactionalResource) -> Result<(), LockError> {
        run_setup(resource, &self.rows.setup)
    }

    fn try_acquire(
        &self,
        resource: &mut dyn TransactionalResource,
        _worker: WorkerId,
        token: &mut LockToken,
    ) -> Result<AcquireOutcome, LockError> {
        self.rows.acquire(resource, SINGLE_TOKEN_KEY, token)
    }

    fn release(
        &self,
        resource: &mut dyn TransactionalResource,
        token: &mut LockToken,
        counter: &ViolationCounter,
    ) -> Result<ReleaseOutcome, LockError> {
        self.rows.release(resource, token, counter)
    }

    fn residual_holders(&self, resource: &mut dyn TransactionalResource) -> Result<i64, LockError> {
        count_rows(resource, &self.rows.residual)
    }
}

// ============================================================================
// SECTION: Partitioned Insert Lock
// ============================================================================

/// Two domains in one table: even workers lock key 1, odd workers key 2.
#[derive(Debug, Clone)]
pub struct PartitionedInsertLock {
    /// Shared insert mechanics.
    rows: InsertRows,
}

impl PartitionedInsertLock {
    /// Number of parity domains.
    const DOMAINS: usize = 2;

    /// Creates the strategy for `table`.
    #[must_use]
    pub fn new(table: LockTable, dialect: SqlDialect) -> Self {
        Self {
            rows: InsertRows::new(table, dialect),
        }
    }

    /// Returns the row key for a worker's parity.
    fn key_for(worker: WorkerId) -> i64 {
        if worker.is_even() { 1 } else { 2 }
    }
}

impl LockStrategy for PartitionedInsertLock {
    fn variant(&self) -> LockVariant {
        LockVariant::PartitionedInsert
    }

    fn table(&self) -> &LockTable {
        &self.rows.table
    }

    fn domain_count(&self) -> usize {
        Self::DOMAINS
    }

    fn domain_for(&self, worker: WorkerId) -> DomainIndex {
        if worker.is_even() { DomainIndex::new(0) } else { DomainIndex::new(1) }
    }

    fn setup(&self, resource: &mut dyn TransactionalResource) -> Result<(), LockError> {
        run_setup(resource, &self.rows.setup)
    }

    fn try_acquire(
        &self,
        resource: &mut dyn TransactionalResource,
        worker: WorkerId,
        token: &mut LockToken,
    ) -> Result<AcquireOutcome, LockError> {
        self.rows.acquire(resource, Self::key_for(worker), token)
    }

    fn release(
        &self,
        resource: &mut dyn TransactionalResource,
        token: &mut LockToken,
        counter: &ViolationCounter,
    ) -> Result<ReleaseOutcome, LockError> {
        self.rows.release(resource, token, counter)
    }

    fn residual_holders(&self, resource: &mut dyn TransactionalResource) -> Result<i64, LockError> {
        count_rows(resource, &self.rows.residual)
    }
}
