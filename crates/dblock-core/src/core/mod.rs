// crates/dblock-core/src/core/mod.rs
// ============================================================================
// Module: dblock Core Types
// Description: Identifiers, violation counters, and run reports.
// Purpose: Group the data model shared by the runtime and store backends.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Core types are plain data: worker and table identifiers, the atomic
//! violation witness, and the serializable reports a run produces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod counter;
pub mod identifiers;
pub mod report;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use counter::CounterSet;
pub use counter::ViolationCounter;
pub use identifiers::DomainIndex;
pub use identifiers::IdentifierError;
pub use identifiers::LockTable;
pub use identifiers::LockToken;
pub use identifiers::WorkerId;
pub use report::DomainReport;
pub use report::RunReport;
pub use report::WorkerReport;
