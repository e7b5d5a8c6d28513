// crates/dblock-config/src/lib.rs
// ============================================================================
// Module: dblock Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for dblock.toml semantics.
// Dependencies: dblock-core, dblock-store-sqlite, dblock-store-postgres, serde, toml
// ============================================================================

//! ## Overview
//! `dblock-config` defines the run, lock, store, and logging sections of
//! `dblock.toml` and validates them fail-closed before a run starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
