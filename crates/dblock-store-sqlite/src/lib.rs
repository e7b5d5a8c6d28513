// crates/dblock-store-sqlite/src/lib.rs
// ============================================================================
// Module: dblock SQLite Store
// Description: SQLite-backed transactional resources for lock runs.
// Purpose: Provide file-based connections with explicit transaction control.
// Dependencies: dblock-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! Each worker opens its own [`SqliteResource`] on a shared database file.
//! Writers serialize on the database lock, so `busy_timeout_ms` and
//! `begin_mode` shape how contention surfaces: as blocking, or as
//! [`dblock_core::StoreError::Busy`] the strategies treat as contention.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteBeginMode;
pub use store::SqliteJournalMode;
pub use store::SqliteResource;
pub use store::SqliteResourceConfig;
pub use store::SqliteResourceFactory;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
