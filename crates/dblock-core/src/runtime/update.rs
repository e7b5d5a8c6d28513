// crates/dblock-core/src/runtime/update.rs
// ============================================================================
// Module: dblock Conditional-Update Lock
// Description: State-flag lock on a shared pre-seeded row.
// Purpose: Hold a lock by flipping `state` from 0 to 1 with a guarded update.
// Dependencies: crate::core, crate::interfaces, crate::runtime::strategy
// ============================================================================

//! ## Overview
//! Acquiring selects the first free row, remembers its id, and flips its
//! flag with `WHERE id = ? AND state = 0`. A zero-row update means a peer
//! won the race between the select and the update. Releasing flips the flag
//! back, guarded by `state = 1`.

// ============================================================================
// SECTION: Imports
// ============================================================================

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
// SECTION: Strategy
// ============================================================================

/// Lock held while the seeded row's `state` is 1.
#[derive(Debug, Clone)]
pub struct ConditionalUpdateLock {
    /// Lock table.
    table: LockTable,
    /// Drop, create, and seed statements.
    setup: Vec<String>,
    /// First free row lookup.
    select_free: String,
    /// Guarded 0 -> 1 flip.
    lock: String,
    /// Guarded 1 -> 0 flip.
    unlock: String,
    /// Count of rows left in the locked state.
    residual: String,
}

impl ConditionalUpdateLock {
    /// Creates the strategy for `table`.
    #[must_use]
    pub fn new(table: LockTable, dialect: SqlDialect) -> Self {
        let qualified = table.qualified();
        let id = dialect.placeholder(1);
        let mut setup: Vec<String> = dialect.create_schema(table.schema()).into_iter().collect();
        setup.push(format!("DROP TABLE IF EXISTS {qualified}"));
        setup.push(format!(
            "CREATE TABLE {qualified} (id INTEGER NOT NULL PRIMARY KEY, state INTEGER NOT NULL \
             DEFAULT 0)"
        ));
        setup.push(format!("INSERT INTO {qualified} (id) VALUES (1)"));
        Self {
            select_free: format!("SELECT id FROM {qualified} WHERE state = 0 ORDER BY id LIMIT 1"),
            lock: format!("UPDATE {qualified} SET state = 1 WHERE id = {id} AND state = 0"),
            unlock: format!("UPDATE {qualified} SET state = 0 WHERE id = {id} AND state = 1"),
            residual: format!("SELECT COUNT(*) FROM {qualified} WHERE state <> 0"),
            setup,
            table,
        }
    }
}

impl LockStrategy for ConditionalUpdateLock {
    fn variant(&self) -> LockVariant {
        LockVariant::ConditionalUpdate
    }

    fn table(&self) -> &LockTable {
        &self.table
    }

    fn setup(&self, resource: &mut dyn TransactionalResource) -> Result<(), LockError> {
        run_setup(resource, &self.setup)
    }

    fn try_acquire(
        &self,
        resource: &mut dyn TransactionalResource,
        _worker: WorkerId,
        token: &mut LockToken,
    ) -> Result<AcquireOutcome, LockError> {
        let selected = match resource.query_i64(&self.select_free, &[]) {
            Ok(selected) => selected,
            Err(error) => return acquire_failed(resource, error),
        };
        let Some(id) = selected else {
            rollback_quietly(resource);
            return Ok(AcquireOutcome::Contended);
        };
        token.set(id);
        let updated = match resource.execute(&self.lock, &[id]) {
            Ok(rows) => rows,
            Err(error) => {
                token.clear();
                return acquire_failed(resource, error);
            }
        };
        if updated == 0 {
            rollback_quietly(resource);
            token.clear();
            return Ok(AcquireOutcome::Contended);
        }
        if let Err(error) = resource.commit() {
            token.clear();
            return acquire_failed(resource, error);
        }
        Ok(AcquireOutcome::Acquired)
    }

    fn release(
        &self,
        resource: &mut dyn TransactionalResource,
        token: &mut LockToken,
        counter: &ViolationCounter,
    ) -> Result<ReleaseOutcome, LockError> {
        let Some(id) = token.get() else {
            return Ok(ReleaseOutcome::NotHeld);
        };
        let updated = match resource.execute(&self.unlock, &[id]) {
            Ok(rows) => rows,
            Err(error) => return release_failed(resource, error),
        };
        match updated {
            1 => commit_release(resource, token, counter),
            0 => {
                rollback_quietly(resource);
                token.clear();
                Ok(ReleaseOutcome::NotHeld)
            }
            rows => {
                rollback_quietly(resource);
                Err(LockError::Invalid(format!("release of row {id} updated {rows} rows")))
            }
        }
    }

    fn residual_holders(&self, resource: &mut dyn TransactionalResource) -> Result<i64, LockError> {
        count_rows(resource, &self.residual)
    }
}
