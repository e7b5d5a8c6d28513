// crates/dblock-store-postgres/src/lib.rs
// ============================================================================
// Module: dblock Postgres Store
// Description: PostgreSQL-backed transactional resources for lock runs.
// Purpose: Run lock strategies against a server with row-level locking.
// Dependencies: dblock-core, postgres, serde, thiserror
// ============================================================================

//! ## Overview
//! Each worker opens its own blocking [`postgres::Client`]. Lock tables live
//! in the `db_locks` schema unless configured otherwise.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::PostgresIsolation;
pub use store::PostgresResource;
pub use store::PostgresResourceConfig;
pub use store::PostgresResourceFactory;
pub use store::PostgresStoreError;
