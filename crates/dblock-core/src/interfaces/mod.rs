// crates/dblock-core/src/interfaces/mod.rs
// ============================================================================
// Module: dblock Interfaces
// Description: Backend-agnostic store contracts.
// Purpose: Define the transactional resource every worker drives.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The relational store is opaque to the engine. Backends implement
//! [`TransactionalResource`] for a single autocommit-disabled connection and
//! [`ResourceFactory`] to open one per worker. Backends must translate their
//! native error codes into [`StoreError`] variants; the engine never inspects
//! error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Dialect
// ============================================================================

/// SQL dialect spoken by a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// `SQLite` (schema is always `main`).
    Sqlite,
    /// `PostgreSQL`.
    Postgres,
}

impl SqlDialect {
    /// Returns the positional parameter placeholder for a 1-based index.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Returns the default schema for lock tables.
    #[must_use]
    pub const fn default_schema(self) -> &'static str {
        match self {
            Self::Sqlite => "main",
            Self::Postgres => "db_locks",
        }
    }

    /// Returns the statement that creates `schema`, when the dialect has schemas to create.
    #[must_use]
    pub fn create_schema(self, schema: &str) -> Option<String> {
        match self {
            Self::Sqlite => None,
            Self::Postgres => Some(format!("CREATE SCHEMA IF NOT EXISTS {schema}")),
        }
    }

    /// Returns a stable label for the dialect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store errors, classified from backend error codes.
///
/// # Invariants
/// - `UniqueViolation`, `Busy`, and `TransactionAborted` after a constraint
///   failure describe contention, every other variant a defect or outage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness or primary-key constraint rejected a write.
    #[error("store unique violation: {0}")]
    UniqueViolation(String),
    /// The transaction rejects statements until it is rolled back.
    #[error("store transaction aborted: {message}")]
    TransactionAborted {
        /// Backend message.
        message: String,
        /// Whether a unique violation poisoned the transaction.
        after_constraint: bool,
    },
    /// Another transaction holds a conflicting store lock or snapshot.
    #[error("store busy: {0}")]
    Busy(String),
    /// Connectivity or file-system failure.
    #[error("store io error: {0}")]
    Io(String),
    /// Any other statement failure (malformed SQL, schema mismatch).
    #[error("store error: {0}")]
    Store(String),
    /// Invalid configuration or parameter.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Returns true when the error signals that another worker holds the lock.
    #[must_use]
    pub const fn is_expected_contention(&self) -> bool {
        match self {
            Self::UniqueViolation(_) | Self::Busy(_) => true,
            Self::TransactionAborted {
                after_constraint, ..
            } => *after_constraint,
            Self::Io(_) | Self::Store(_) | Self::Invalid(_) => false,
        }
    }
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// One autocommit-disabled connection owned by exactly one worker.
///
/// The first statement after a commit or rollback implicitly opens a new
/// transaction; nothing is visible to peers until [`Self::commit`].
pub trait TransactionalResource: Send {
    /// Returns the SQL dialect of the backend.
    fn dialect(&self) -> SqlDialect;

    /// Executes one or more statements without parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any statement fails.
    fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError>;

    /// Executes a parameterized statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the statement fails.
    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64, StoreError>;

    /// Runs a query and returns the first column of its first row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query_i64(&mut self, sql: &str, params: &[i64]) -> Result<Option<i64>, StoreError>;

    /// Commits the open transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Rolls back the open transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the rollback fails.
    fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Opens independent resources, one per worker.
pub trait ResourceFactory: Send + Sync {
    /// Returns the SQL dialect of resources this factory opens.
    fn dialect(&self) -> SqlDialect;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the connection cannot be established.
    fn open(&self) -> Result<Box<dyn TransactionalResource>, StoreError>;
}
