// crates/dblock-core/src/runtime/events.rs
// ============================================================================
// Module: dblock Harness Events
// Description: Structured run events and JSON-lines sinks.
// Purpose: Log findings per occurrence without a hard logging dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The harness and job runners emit [`HarnessEvent`] records through a
//! [`HarnessEventSink`]. Built-in sinks write one JSON object per line to
//! stderr or to an append-only file, filtered by [`EventLevel`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

use crate::core::DomainIndex;
use crate::core::WorkerId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Per-cycle lock traffic.
    Debug,
    /// Run lifecycle.
    #[default]
    Info,
    /// Findings and failures.
    Warn,
}

/// Harness event classification.
///
/// # Invariants
/// - Variants are stable for log labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessEventKind {
    /// A run began.
    RunStarted,
    /// Schema setup committed.
    SetupComplete,
    /// A worker committed its acquire transaction.
    LockAcquired,
    /// A worker committed its release transaction.
    LockReleased,
    /// A worker observed more than one holder on entry.
    ViolationDetected,
    /// A release found the lock not held.
    UnlockFailed,
    /// A worker stopped on a fatal error.
    WorkerFailed,
    /// Every worker joined and the run report is ready.
    RunFinished,
}

impl HarnessEventKind {
    /// Returns the severity of the event kind.
    #[must_use]
    pub const fn level(self) -> EventLevel {
        match self {
            Self::LockAcquired | Self::LockReleased => EventLevel::Debug,
            Self::RunStarted | Self::SetupComplete | Self::RunFinished => EventLevel::Info,
            Self::ViolationDetected | Self::UnlockFailed | Self::WorkerFailed => EventLevel::Warn,
        }
    }
}

/// Harness event payload.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessEvent {
    /// Event kind.
    pub event: HarnessEventKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event severity.
    pub level: EventLevel,
    /// Worker identity when the event is worker-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerId>,
    /// Lock domain when the event is domain-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainIndex>,
    /// Holder count observed by the worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holders: Option<i64>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HarnessEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(event: HarnessEventKind) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            level: event.level(),
            worker: None,
            domain: None,
            holders: None,
            message: None,
        }
    }

    /// Scopes the event to a worker and its domain.
    #[must_use]
    pub fn with_worker(mut self, worker: WorkerId, domain: DomainIndex) -> Self {
        self.worker = Some(worker);
        self.domain = Some(domain);
        self
    }

    /// Attaches the observed holder count.
    #[must_use]
    pub fn with_holders(mut self, holders: i64) -> Self {
        self.holders = Some(holders);
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for harness events; shared by every worker thread.
pub trait HarnessEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &HarnessEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink {
    /// Minimum level written.
    min_level: EventLevel,
}

impl StderrEventSink {
    /// Creates a stderr sink writing events at or above `min_level`.
    #[must_use]
    pub const fn new(min_level: EventLevel) -> Self {
        Self {
            min_level,
        }
    }
}

impl HarnessEventSink for StderrEventSink {
    fn record(&self, event: &HarnessEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that logs JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
    /// Minimum level written.
    min_level: EventLevel,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path, min_level: EventLevel) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            min_level,
        })
    }
}

impl HarnessEventSink for FileEventSink {
    fn record(&self, event: &HarnessEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
pub struct NoopEventSink;

impl HarnessEventSink for NoopEventSink {
    fn record(&self, _event: &HarnessEvent) {}
}
