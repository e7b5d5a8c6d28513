// crates/dblock-core/src/lib.rs
// ============================================================================
// Module: dblock Core Library
// Description: Public API surface for the lock-correctness engine.
// Purpose: Expose core types, store interfaces, and runtime harness.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! dblock core drives row-level mutual-exclusion patterns written purely in
//! SQL under genuine concurrency and witnesses whether they serialize access.
//! It is backend-agnostic: stores plug in through [`TransactionalResource`]
//! and [`ResourceFactory`], and lock patterns through [`LockStrategy`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ResourceFactory;
pub use interfaces::SqlDialect;
pub use interfaces::StoreError;
pub use interfaces::TransactionalResource;
pub use runtime::AcquireOutcome;
pub use runtime::ConditionalUpdateLock;
pub use runtime::DEFAULT_QUOTA;
pub use runtime::DEFAULT_WORKERS;
pub use runtime::ErrorClass;
pub use runtime::EventLevel;
pub use runtime::FileEventSink;
pub use runtime::HarnessConfig;
pub use runtime::HarnessError;
pub use runtime::HarnessEvent;
pub use runtime::HarnessEventKind;
pub use runtime::HarnessEventSink;
pub use runtime::InsertLock;
pub use runtime::JobRunner;
pub use runtime::JobState;
pub use runtime::LockError;
pub use runtime::LockStrategy;
pub use runtime::LockVariant;
pub use runtime::NoopEventSink;
pub use runtime::PartitionedInsertLock;
pub use runtime::ReleaseOutcome;
pub use runtime::StderrEventSink;
pub use runtime::TestHarness;
pub use runtime::classify;
