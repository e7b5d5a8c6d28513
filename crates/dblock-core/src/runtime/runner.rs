// crates/dblock-core/src/runtime/runner.rs
// ============================================================================
// Module: dblock Job Runner
// Description: Per-worker acquire/hold/release state machine.
// Purpose: Drive a strategy to quota while witnessing concurrent holders.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! A [`JobRunner`] cycles `Acquiring -> Holding -> Releasing` until the
//! worker completed its quota of released cycles. Contended acquires are
//! retried immediately; there is no backoff. Entering `Holding` increments
//! the domain counter, and a post-increment value above one is recorded as a
//! violation without stopping the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::core::DomainIndex;
use crate::core::LockToken;
use crate::core::ViolationCounter;
use crate::core::WorkerId;
use crate::core::WorkerReport;
use crate::interfaces::TransactionalResource;
use crate::runtime::events::HarnessEvent;
use crate::runtime::events::HarnessEventKind;
use crate::runtime::events::HarnessEventSink;
use crate::runtime::strategy::AcquireOutcome;
use crate::runtime::strategy::LockError;
use crate::runtime::strategy::LockStrategy;
use crate::runtime::strategy::ReleaseOutcome;

// ============================================================================
// SECTION: State
// ============================================================================

/// Job runner states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Retrying `try_acquire` until it succeeds.
    Acquiring,
    /// Acquire committed; the counter has not been entered yet.
    Holding,
    /// Counter entered; releasing the lock.
    Releasing,
    /// Quota reached.
    Done,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Drives one worker's cycles against its own resource.
pub struct JobRunner<'a> {
    /// Worker identity.
    worker: WorkerId,
    /// Domain the worker contends on.
    domain: DomainIndex,
    /// Released cycles required.
    quota: u32,
    /// Strategy under test.
    strategy: &'a dyn LockStrategy,
    /// Counter of the worker's domain.
    counter: &'a ViolationCounter,
    /// Event sink.
    sink: &'a dyn HarnessEventSink,
    /// Current state.
    state: JobState,
    /// Row the worker believes it holds.
    token: LockToken,
    /// Accumulated results.
    report: WorkerReport,
}

impl<'a> JobRunner<'a> {
    /// Creates a runner for `worker` contending on `counter`.
    #[must_use]
    pub fn new(
        worker: WorkerId,
        quota: u32,
        strategy: &'a dyn LockStrategy,
        counter: &'a ViolationCounter,
        sink: &'a dyn HarnessEventSink,
    ) -> Self {
        let domain = strategy.domain_for(worker);
        Self {
            worker,
            domain,
            quota,
            strategy,
            counter,
            sink,
            state: if quota == 0 { JobState::Done } else { JobState::Acquiring },
            token: LockToken::empty(),
            report: WorkerReport::new(worker, domain),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Returns the results accumulated so far.
    #[must_use]
    pub const fn report(&self) -> &WorkerReport {
        &self.report
    }

    /// Runs until the quota is met, a fatal error occurs, or `abort` is raised.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] on fatal store failures, or
    /// [`LockError::Aborted`] when a peer failed.
    pub fn run(
        mut self,
        resource: &mut dyn TransactionalResource,
        abort: &AtomicBool,
    ) -> Result<WorkerReport, LockError> {
        while self.state != JobState::Done {
            if abort.load(Ordering::SeqCst) {
                return Err(LockError::Aborted);
            }
            self.step(resource)?;
        }
        Ok(self.report)
    }

    /// Performs one state transition and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] on fatal store failures.
    pub fn step(&mut self, resource: &mut dyn TransactionalResource) -> Result<JobState, LockError> {
        self.state = match self.state {
            JobState::Acquiring => self.acquire(resource)?,
            JobState::Holding => self.hold(),
            JobState::Releasing => self.release(resource)?,
            JobState::Done => JobState::Done,
        };
        Ok(self.state)
    }

    /// `Acquiring` transition.
    fn acquire(&mut self, resource: &mut dyn TransactionalResource) -> Result<JobState, LockError> {
        self.report.acquire_attempts += 1;
        match self.strategy.try_acquire(resource, self.worker, &mut self.token)? {
            AcquireOutcome::Acquired => {
                self.emit(HarnessEventKind::LockAcquired, None, None);
                Ok(JobState::Holding)
            }
            AcquireOutcome::Contended => {
                self.report.contended_acquires += 1;
                Ok(JobState::Acquiring)
            }
        }
    }

    /// `Holding` transition: enter the witness counter.
    fn hold(&mut self) -> JobState {
        let holders = self.counter.enter();
        self.report.max_holders_observed = self.report.max_holders_observed.max(holders);
        if holders > 1 {
            self.report.violations += 1;
            self.emit(
                HarnessEventKind::ViolationDetected,
                Some(holders),
                Some(format!("locked by {holders} workers at once")),
            );
        }
        JobState::Releasing
    }

    /// `Releasing` transition.
    fn release(&mut self, resource: &mut dyn TransactionalResource) -> Result<JobState, LockError> {
        match self.strategy.release(resource, &mut self.token, self.counter)? {
            ReleaseOutcome::Released => {
                self.report.cycles += 1;
                self.emit(HarnessEventKind::LockReleased, None, None);
                if self.report.cycles >= self.quota {
                    Ok(JobState::Done)
                } else {
                    Ok(JobState::Acquiring)
                }
            }
            ReleaseOutcome::NotHeld => {
                // The worker no longer believes it holds the lock.
                let holders = self.counter.exit();
                self.token.clear();
                self.report.unlock_failures += 1;
                self.emit(
                    HarnessEventKind::UnlockFailed,
                    Some(holders),
                    Some("release found the lock not held".to_string()),
                );
                Ok(JobState::Acquiring)
            }
            ReleaseOutcome::Contended => {
                self.report.release_retries += 1;
                Ok(JobState::Releasing)
            }
        }
    }

    /// Emits a worker-scoped event.
    fn emit(&self, kind: HarnessEventKind, holders: Option<i64>, message: Option<String>) {
        let mut event = HarnessEvent::new(kind).with_worker(self.worker, self.domain);
        if let Some(holders) = holders {
            event = event.with_holders(holders);
        }
        if let Some(message) = message {
            event = event.with_message(message);
        }
        self.sink.record(&event);
    }
}
