// crates/dblock-core/src/core/report.rs
// ============================================================================
// Module: dblock Run Reports
// Description: Per-worker, per-domain, and per-run result records.
// Purpose: Carry findings (violations, unlock anomalies, orphans) out of a run.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Reports are the output of a run. Violations and unlock anomalies are
//! findings, not failures: they never abort a run and always end up here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::identifiers::DomainIndex;
use crate::core::identifiers::WorkerId;

// ============================================================================
// SECTION: Worker Report
// ============================================================================

/// Outcome of one worker's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Worker identity.
    pub worker: WorkerId,
    /// Lock domain the worker contended on.
    pub domain: DomainIndex,
    /// Completed acquire/release cycles.
    pub cycles: u32,
    /// Acquire attempts, successful or not.
    pub acquire_attempts: u64,
    /// Acquire attempts classified as expected contention.
    pub contended_acquires: u64,
    /// Entries that observed more than one holder.
    pub violations: u64,
    /// Highest holder count this worker observed on entry.
    pub max_holders_observed: i64,
    /// Releases that found the lock not held.
    pub unlock_failures: u64,
    /// Releases retried after transient store contention.
    pub release_retries: u64,
}

impl WorkerReport {
    /// Creates an empty report for a worker.
    #[must_use]
    pub const fn new(worker: WorkerId, domain: DomainIndex) -> Self {
        Self {
            worker,
            domain,
            cycles: 0,
            acquire_attempts: 0,
            contended_acquires: 0,
            violations: 0,
            max_holders_observed: 0,
            unlock_failures: 0,
            release_retries: 0,
        }
    }
}

// ============================================================================
// SECTION: Domain Report
// ============================================================================

/// Final counter state of one lock domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainReport {
    /// Domain index.
    pub domain: DomainIndex,
    /// Highest holder count observed.
    pub peak_holders: i64,
    /// Holder count after every worker joined.
    pub final_holders: i64,
    /// Total entries into the domain.
    pub entries: u64,
}

// ============================================================================
// SECTION: Run Report
// ============================================================================

/// Aggregate outcome of a harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Strategy label.
    pub variant: String,
    /// Schema-qualified lock table.
    pub table: String,
    /// Number of workers.
    pub workers: u32,
    /// Required cycles per worker.
    pub quota: u32,
    /// Wall-clock time from worker spawn to final join.
    pub elapsed_ms: u64,
    /// Lock representations still present after the run.
    pub residual_holders: i64,
    /// Per-worker reports ordered by worker id.
    pub worker_reports: Vec<WorkerReport>,
    /// Per-domain counter summaries.
    pub domains: Vec<DomainReport>,
}

impl RunReport {
    /// Returns the number of completed cycles across workers.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.worker_reports.iter().map(|report| u64::from(report.cycles)).sum()
    }

    /// Returns the number of detected violations across workers.
    #[must_use]
    pub fn total_violations(&self) -> u64 {
        self.worker_reports.iter().map(|report| report.violations).sum()
    }

    /// Returns the number of unlock anomalies across workers.
    #[must_use]
    pub fn total_unlock_failures(&self) -> u64 {
        self.worker_reports.iter().map(|report| report.unlock_failures).sum()
    }

    /// Returns true when the run produced no findings.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total_violations() == 0
            && self.total_unlock_failures() == 0
            && self.residual_holders == 0
            && self.domains.iter().all(|domain| domain.final_holders == 0)
    }
}
