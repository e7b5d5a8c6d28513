// crates/dblock-core/src/core/identifiers.rs
// ============================================================================
// Module: dblock Identifiers
// Description: Worker, domain, token, and table identifiers.
// Purpose: Provide strongly typed identities with stable display forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Workers are numbered `0..N`. Lock domains are indexes into the run's
//! [`CounterSet`](crate::core::CounterSet). Table identifiers are validated
//! once at construction so SQL text built from them never needs quoting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifier length accepted for schema and table names.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

// ============================================================================
// SECTION: Worker Identity
// ============================================================================

/// Stable identity of a concurrent worker within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    /// Creates a worker identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw worker number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true when the worker number is even.
    #[must_use]
    pub const fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Index of an independent lock domain (and its counter) within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainIndex(usize);

impl DomainIndex {
    /// The only domain of single-domain strategies.
    pub const PRIMARY: Self = Self(0);

    /// Creates a domain index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for DomainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Row identity a worker believes it owns during the current cycle.
///
/// Insert strategies fill it with their fixed key; the conditional-update
/// strategy discovers it from the free row it selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockToken(Option<i64>);

impl LockToken {
    /// Returns an empty token.
    #[must_use]
    pub const fn empty() -> Self {
        Self(None)
    }

    /// Records the row id the worker is about to lock.
    pub const fn set(&mut self, id: i64) {
        self.0 = Some(id);
    }

    /// Forgets the remembered row id.
    pub const fn clear(&mut self) {
        self.0 = None;
    }

    /// Returns the remembered row id.
    #[must_use]
    pub const fn get(self) -> Option<i64> {
        self.0
    }
}

// ============================================================================
// SECTION: Table Identity
// ============================================================================

/// Identifier validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier is empty.
    #[error("{0} identifier must not be empty")]
    Empty(&'static str),
    /// Identifier exceeds [`MAX_IDENTIFIER_LENGTH`].
    #[error("{kind} identifier exceeds {MAX_IDENTIFIER_LENGTH} characters: {value}")]
    TooLong {
        /// Identifier role (schema or table).
        kind: &'static str,
        /// Offending value.
        value: String,
    },
    /// Identifier contains characters outside `[A-Za-z0-9_]` or starts with a digit.
    #[error("{kind} identifier contains invalid characters: {value}")]
    InvalidCharacters {
        /// Identifier role (schema or table).
        kind: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Schema-qualified table backing a lock domain.
///
/// # Invariants
/// - Both parts match `[A-Za-z_][A-Za-z0-9_]*` and are at most
///   [`MAX_IDENTIFIER_LENGTH`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockTable {
    /// Schema name.
    schema: String,
    /// Table name.
    table: String,
}

impl LockTable {
    /// Creates a validated table identity.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when either part is not a plain SQL identifier.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self, IdentifierError> {
        let schema = schema.into();
        let table = table.into();
        validate_identifier("schema", &schema)?;
        validate_identifier("table", &table)?;
        Ok(Self {
            schema,
            table,
        })
    }

    /// Returns the schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns `schema.table`.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Validates a single SQL identifier.
fn validate_identifier(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(IdentifierError::Empty(kind));
    };
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong {
            kind,
            value: value.to_string(),
        });
    }
    let valid_first = first.is_ascii_alphabetic() || first == '_';
    if !valid_first || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(IdentifierError::InvalidCharacters {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}
