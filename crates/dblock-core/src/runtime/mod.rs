// crates/dblock-core/src/runtime/mod.rs
// ============================================================================
// Module: dblock Runtime
// Description: Lock strategies, job runner, harness, and event sinks.
// Purpose: Drive lock patterns under concurrency and record findings.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime components execute a [`LockStrategy`] with many [`JobRunner`]s,
//! coordinated by a [`TestHarness`], and emit [`HarnessEvent`]s.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod events;
pub mod harness;
pub mod insert;
pub mod runner;
pub mod strategy;
pub mod update;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use events::EventLevel;
pub use events::FileEventSink;
pub use events::HarnessEvent;
pub use events::HarnessEventKind;
pub use events::HarnessEventSink;
pub use events::NoopEventSink;
pub use events::StderrEventSink;
pub use harness::DEFAULT_QUOTA;
pub use harness::DEFAULT_WORKERS;
pub use harness::HarnessConfig;
pub use harness::HarnessError;
pub use harness::TestHarness;
pub use insert::InsertLock;
pub use insert::PartitionedInsertLock;
pub use runner::JobRunner;
pub use runner::JobState;
pub use strategy::AcquireOutcome;
pub use strategy::ErrorClass;
pub use strategy::LockError;
pub use strategy::LockStrategy;
pub use strategy::LockVariant;
pub use strategy::ReleaseOutcome;
pub use strategy::classify;
pub use update::ConditionalUpdateLock;
