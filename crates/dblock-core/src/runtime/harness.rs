// crates/dblock-core/src/runtime/harness.rs
// ============================================================================
// Module: dblock Test Harness
// Description: Barrier-synchronized multi-worker run of one lock strategy.
// Purpose: Maximize contention on independent connections and report findings.
// Dependencies: crate::core, crate::interfaces, crate::runtime, thiserror
// ============================================================================

//! ## Overview
//! [`TestHarness::run`] sets up the schema on one resource, spawns one named
//! thread per worker, holds every worker at a start gate until all of them
//! opened their own resource, then lets them contend. It joins every worker,
//! checks for orphaned locks, and returns a [`RunReport`].
//!
//! A fatal worker error raises a run-wide abort flag so peers stop instead
//! of spinning on a lock that a dead worker still holds. The flag never
//! orders SQL work between live workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Instant;

use thiserror::Error;

use crate::core::CounterSet;
use crate::core::DomainReport;
use crate::core::RunReport;
use crate::core::WorkerId;
use crate::core::WorkerReport;
use crate::interfaces::ResourceFactory;
use crate::interfaces::StoreError;
use crate::runtime::events::HarnessEvent;
use crate::runtime::events::HarnessEventKind;
use crate::runtime::events::HarnessEventSink;
use crate::runtime::runner::JobRunner;
use crate::runtime::strategy::LockError;
use crate::runtime::strategy::LockStrategy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: u32 = 8;
/// Default released cycles per worker.
pub const DEFAULT_QUOTA: u32 = 10;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Harness run shape.
///
/// # Invariants
/// - `workers` must be greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Number of concurrent workers.
    pub workers: u32,
    /// Released cycles each worker must complete.
    pub quota: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            quota: DEFAULT_QUOTA,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal run failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// Invalid harness configuration.
    #[error("invalid harness config: {0}")]
    Invalid(String),
    /// Schema setup failed.
    #[error("setup failed: {0}")]
    Setup(LockError),
    /// A worker could not open its resource.
    #[error("worker {worker} failed to connect: {error}")]
    Connect {
        /// Worker identity.
        worker: WorkerId,
        /// Connection failure.
        error: StoreError,
    },
    /// A worker stopped on a fatal error.
    #[error("worker {worker} failed: {error}")]
    Worker {
        /// Worker identity.
        worker: WorkerId,
        /// Fatal error.
        error: LockError,
    },
    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    Panicked(WorkerId),
    /// A worker thread could not be spawned.
    #[error("worker {worker} could not be spawned: {message}")]
    Spawn {
        /// Worker identity.
        worker: WorkerId,
        /// OS error message.
        message: String,
    },
    /// The post-run orphaned lock check failed.
    #[error("residual lock check failed: {0}")]
    Residual(LockError),
}

impl HarnessError {
    /// Returns true when the error only reports shutdown after a peer failed.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(
            self,
            Self::Worker {
                error: LockError::Aborted,
                ..
            }
        )
    }
}

// ============================================================================
// SECTION: Start Gate
// ============================================================================

/// Releases every worker once all of them arrived, or when forced open.
///
/// Unlike [`std::sync::Barrier`] the gate can be opened early, so a worker
/// that was never spawned or panicked before arriving cannot wedge its peers.
struct StartGate {
    /// Arrivals still expected and whether the gate is open.
    state: Mutex<GateState>,
    /// Signalled when the gate opens.
    opened: Condvar,
}

/// Mutable start gate state.
struct GateState {
    /// Workers that have not arrived yet.
    pending: usize,
    /// Whether workers may proceed.
    open: bool,
}

impl StartGate {
    /// Creates a gate expecting `participants` arrivals.
    const fn new(participants: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                pending: participants,
                open: false,
            }),
            opened: Condvar::new(),
        }
    }

    /// Registers an arrival and blocks until the gate opens.
    fn arrive_and_wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            state.open = true;
            self.opened.notify_all();
        }
        while !state.open {
            state = self.opened.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Opens the gate regardless of pending arrivals.
    fn force_open(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open = true;
        self.opened.notify_all();
    }
}

/// Shared per-run coordination state borrowed by every worker.
struct RunShared<'r> {
    /// Per-domain witness counters.
    counters: &'r CounterSet,
    /// Start gate.
    gate: &'r StartGate,
    /// Raised when any worker fails fatally.
    abort: &'r AtomicBool,
}

/// Raises the abort flag and opens the gate if the worker thread unwinds.
struct PanicGuard<'r> {
    /// Run abort flag.
    abort: &'r AtomicBool,
    /// Start gate.
    gate: &'r StartGate,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.abort.store(true, Ordering::SeqCst);
            self.gate.force_open();
        }
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Runs one lock strategy with N workers on N independent resources.
pub struct TestHarness<'a> {
    /// Run shape.
    config: HarnessConfig,
    /// Resource factory; one resource per worker plus one for setup.
    factory: &'a dyn ResourceFactory,
    /// Strategy under test.
    strategy: &'a dyn LockStrategy,
    /// Event sink.
    sink: &'a dyn HarnessEventSink,
}

impl<'a> TestHarness<'a> {
    /// Creates a harness.
    #[must_use]
    pub fn new(
        config: HarnessConfig,
        factory: &'a dyn ResourceFactory,
        strategy: &'a dyn LockStrategy,
        sink: &'a dyn HarnessEventSink,
    ) -> Self {
        Self {
            config,
            factory,
            strategy,
            sink,
        }
    }

    /// Executes the run.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when setup fails or any worker fails fatally.
    /// Violations and unlock anomalies are findings in the report, not errors.
    pub fn run(&self) -> Result<RunReport, HarnessError> {
        if self.config.workers == 0 {
            return Err(HarnessError::Invalid("workers must be greater than zero".to_string()));
        }
        let participants = usize::try_from(self.config.workers)
            .map_err(|_| HarnessError::Invalid("workers exceeds platform limits".to_string()))?;
        self.sink.record(&HarnessEvent::new(HarnessEventKind::RunStarted).with_message(format!(
            "variant={} table={} workers={} quota={}",
            self.strategy.variant(),
            self.strategy.table(),
            self.config.workers,
            self.config.quota
        )));

        let mut control =
            self.factory.open().map_err(|error| HarnessError::Setup(LockError::Store(error)))?;
        self.strategy.setup(control.as_mut()).map_err(HarnessError::Setup)?;
        self.sink.record(&HarnessEvent::new(HarnessEventKind::SetupComplete));

        let counters = CounterSet::new(self.strategy.domain_count());
        let gate = StartGate::new(participants);
        let abort = AtomicBool::new(false);
        let shared = RunShared {
            counters: &counters,
            gate: &gate,
            abort: &abort,
        };

        let start = Instant::now();
        let outcomes = self.run_workers(&shared);
        let elapsed = start.elapsed();

        let mut worker_reports = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(report) => worker_reports.push(report),
                Err(error) => failures.push(error),
            }
        }
        if let Some(error) = root_cause(failures) {
            return Err(error);
        }

        let residual_holders =
            self.strategy.residual_holders(control.as_mut()).map_err(HarnessError::Residual)?;
        let domains = counters
            .iter()
            .map(|(domain, counter)| DomainReport {
                domain,
                peak_holders: counter.peak(),
                final_holders: counter.holders(),
                entries: counter.entries(),
            })
            .collect();
        let report = RunReport {
            variant: self.strategy.variant().to_string(),
            table: self.strategy.table().to_string(),
            workers: self.config.workers,
            quota: self.config.quota,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            residual_holders,
            worker_reports,
            domains,
        };
        self.sink.record(&HarnessEvent::new(HarnessEventKind::RunFinished).with_message(format!(
            "elapsed_ms={} cycles={} violations={} unlock_failures={} residual={}",
            report.elapsed_ms,
            report.total_cycles(),
            report.total_violations(),
            report.total_unlock_failures(),
            report.residual_holders
        )));
        Ok(report)
    }

    /// Spawns every worker and joins them all, in worker order.
    fn run_workers(&self, shared: &RunShared<'_>) -> Vec<Result<WorkerReport, HarnessError>> {
        thread::scope(|scope| {
            let mut handles = Vec::new();
            let mut outcomes = Vec::new();
            for id in 0 .. self.config.workers {
                let worker = WorkerId::new(id);
                let spawned = thread::Builder::new()
                    .name(format!("lock-worker-{id}"))
                    .spawn_scoped(scope, move || self.run_worker(worker, shared));
                match spawned {
                    Ok(handle) => handles.push((worker, handle)),
                    Err(err) => {
                        shared.abort.store(true, Ordering::SeqCst);
                        shared.gate.force_open();
                        outcomes.push(Err(HarnessError::Spawn {
                            worker,
                            message: err.to_string(),
                        }));
                        break;
                    }
                }
            }
            let mut joined: Vec<Result<WorkerReport, HarnessError>> = handles
                .into_iter()
                .map(|(worker, handle)| {
                    handle.join().unwrap_or(Err(HarnessError::Panicked(worker)))
                })
                .collect();
            joined.append(&mut outcomes);
            joined
        })
    }

    /// Body of one worker thread.
    fn run_worker(
        &self,
        worker: WorkerId,
        shared: &RunShared<'_>,
    ) -> Result<WorkerReport, HarnessError> {
        let _guard = PanicGuard {
            abort: shared.abort,
            gate: shared.gate,
        };
        let opened = self.factory.open();
        shared.gate.arrive_and_wait();
        let mut resource = match opened {
            Ok(resource) => resource,
            Err(error) => {
                shared.abort.store(true, Ordering::SeqCst);
                self.report_failure(worker, &error.to_string());
                return Err(HarnessError::Connect {
                    worker,
                    error,
                });
            }
        };
        let domain = self.strategy.domain_for(worker);
        let Some(counter) = shared.counters.get(domain) else {
            shared.abort.store(true, Ordering::SeqCst);
            return Err(HarnessError::Worker {
                worker,
                error: LockError::Invalid(format!("no counter for domain {domain}")),
            });
        };
        let runner = JobRunner::new(worker, self.config.quota, self.strategy, counter, self.sink);
        match runner.run(resource.as_mut(), shared.abort) {
            Ok(report) => Ok(report),
            Err(error) => {
                if error != LockError::Aborted {
                    shared.abort.store(true, Ordering::SeqCst);
                    self.report_failure(worker, &error.to_string());
                }
                let _ = resource.rollback();
                Err(HarnessError::Worker {
                    worker,
                    error,
                })
            }
        }
    }

    /// Emits a worker failure event.
    fn report_failure(&self, worker: WorkerId, message: &str) {
        self.sink.record(
            &HarnessEvent::new(HarnessEventKind::WorkerFailed)
                .with_worker(worker, self.strategy.domain_for(worker))
                .with_message(message),
        );
    }
}

/// Picks the failure that caused the run to stop, preferring non-abort errors.
fn root_cause(failures: Vec<HarnessError>) -> Option<HarnessError> {
    let mut first_abort = None;
    for failure in failures {
        if !failure.is_abort() {
            return Some(failure);
        }
        if first_abort.is_none() {
            first_abort = Some(failure);
        }
    }
    first_abort
}
