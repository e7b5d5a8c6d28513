// crates/dblock-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Scripted and in-memory resources plus a recording sink.
// Purpose: Exercise strategies, runners, and the harness without a database.
// Dependencies: dblock-core
// ============================================================================

//! ## Overview
//! [`ScriptedResource`] replays queued replies and records every statement.
//! [`MemoryFactory`] opens resources over one shared in-memory key table
//! that emulates row-lock semantics of the insert strategies.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Shared test helpers are not used by every test crate."
)]

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dblock_core::HarnessEvent;
use dblock_core::HarnessEventKind;
use dblock_core::HarnessEventSink;
use dblock_core::ResourceFactory;
use dblock_core::SqlDialect;
use dblock_core::StoreError;
use dblock_core::TransactionalResource;
use dblock_core::ViolationCounter;

// ============================================================================
// SECTION: Scripted Resource
// ============================================================================

/// Resource replaying queued replies; unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedResource {
    pub execute_replies: VecDeque<Result<u64, StoreError>>,
    pub query_replies: VecDeque<Result<Option<i64>, StoreError>>,
    pub commit_replies: VecDeque<Result<(), StoreError>>,
    pub batch_replies: VecDeque<Result<(), StoreError>>,
    pub statements: Vec<(String, Vec<i64>)>,
    pub commits: usize,
    pub rollbacks: usize,
    /// Counter sampled on every commit attempt.
    pub observe: Option<Arc<ViolationCounter>>,
    pub holders_at_commit: Vec<i64>,
}

impl ScriptedResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_execute(mut self, reply: Result<u64, StoreError>) -> Self {
        self.execute_replies.push_back(reply);
        self
    }

    pub fn on_query(mut self, reply: Result<Option<i64>, StoreError>) -> Self {
        self.query_replies.push_back(reply);
        self
    }

    pub fn on_commit(mut self, reply: Result<(), StoreError>) -> Self {
        self.commit_replies.push_back(reply);
        self
    }

    pub fn on_batch(mut self, reply: Result<(), StoreError>) -> Self {
        self.batch_replies.push_back(reply);
        self
    }

    pub fn observing(mut self, counter: Arc<ViolationCounter>) -> Self {
        self.observe = Some(counter);
        self
    }
}

impl TransactionalResource for ScriptedResource {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError> {
        self.statements.push((sql.to_string(), Vec::new()));
        self.batch_replies.pop_front().unwrap_or(Ok(()))
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64, StoreError> {
        self.statements.push((sql.to_string(), params.to_vec()));
        self.execute_replies.pop_front().unwrap_or(Ok(1))
    }

    fn query_i64(&mut self, sql: &str, params: &[i64]) -> Result<Option<i64>, StoreError> {
        self.statements.push((sql.to_string(), params.to_vec()));
        self.query_replies.pop_front().unwrap_or(Ok(None))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits += 1;
        if let Some(counter) = &self.observe {
            self.holders_at_commit.push(counter.holders());
        }
        self.commit_replies.pop_front().unwrap_or(Ok(()))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.rollbacks += 1;
        Ok(())
    }
}

// ============================================================================
// SECTION: In-Memory Key Table
// ============================================================================

/// Pending change of an open memory transaction.
enum Pending {
    Inserted(i64),
    Deleted(i64),
}

/// Keys visible to every memory resource; claimed keys block peers.
#[derive(Default)]
pub struct MemoryTable {
    keys: Mutex<BTreeSet<i64>>,
}

impl MemoryTable {
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}

/// Resource over a [`MemoryTable`].
///
/// Inserts claim the key immediately (a peer's insert fails as a unique
/// violation) and deletes only free the key at commit, like row locks held
/// to the end of a transaction.
pub struct MemoryResource {
    table: Arc<MemoryTable>,
    pending: Vec<Pending>,
}

impl TransactionalResource for MemoryResource {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError> {
        if sql.starts_with("DELETE FROM") {
            self.table.keys.lock().unwrap().clear();
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64, StoreError> {
        let key = params[0];
        let mut keys = self.table.keys.lock().unwrap();
        if sql.starts_with("INSERT") {
            if !keys.insert(key) {
                return Err(StoreError::UniqueViolation(format!("key {key} exists")));
            }
            self.pending.push(Pending::Inserted(key));
            return Ok(1);
        }
        if sql.starts_with("DELETE") {
            let held = self.pending.iter().any(|p| matches!(p, Pending::Deleted(k) if *k == key));
            if keys.contains(&key) && !held {
                self.pending.push(Pending::Deleted(key));
                return Ok(1);
            }
            return Ok(0);
        }
        Err(StoreError::Store(format!("unsupported statement: {sql}")))
    }

    fn query_i64(&mut self, _sql: &str, _params: &[i64]) -> Result<Option<i64>, StoreError> {
        let keys = self.table.keys.lock().unwrap();
        Ok(Some(i64::try_from(keys.len()).unwrap()))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut keys = self.table.keys.lock().unwrap();
        for change in self.pending.drain(..) {
            if let Pending::Deleted(key) = change {
                keys.remove(&key);
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let mut keys = self.table.keys.lock().unwrap();
        for change in self.pending.drain(..) {
            if let Pending::Inserted(key) = change {
                keys.remove(&key);
            }
        }
        Ok(())
    }
}

/// Factory over one shared [`MemoryTable`], optionally failing the Nth open.
#[derive(Default)]
pub struct MemoryFactory {
    pub table: Arc<MemoryTable>,
    pub opens: AtomicUsize,
    pub fail_open_at: Option<usize>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open_at(index: usize) -> Self {
        Self {
            fail_open_at: Some(index),
            ..Self::default()
        }
    }
}

impl ResourceFactory for MemoryFactory {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn open(&self) -> Result<Box<dyn TransactionalResource>, StoreError> {
        let index = self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open_at == Some(index) {
            return Err(StoreError::Io("connection refused".to_string()));
        }
        Ok(Box::new(MemoryResource {
            table: Arc::clone(&self.table),
            pending: Vec::new(),
        }))
    }
}

/// Factory whose resources fail every parameterized statement fatally.
pub struct BrokenFactory;

impl ResourceFactory for BrokenFactory {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn open(&self) -> Result<Box<dyn TransactionalResource>, StoreError> {
        let mut resource = ScriptedResource::new();
        for _ in 0 .. 64 {
            resource
                .execute_replies
                .push_back(Err(StoreError::Store("no such table: main.insert_lock".to_string())));
        }
        Ok(Box::new(resource))
    }
}

// ============================================================================
// SECTION: Recording Sink
// ============================================================================

/// Sink keeping every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<HarnessEvent>>,
}

impl RecordingSink {
    pub fn count(&self, kind: HarnessEventKind) -> usize {
        self.events.lock().unwrap().iter().filter(|event| event.event == kind).count()
    }
}

impl HarnessEventSink for RecordingSink {
    fn record(&self, event: &HarnessEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
