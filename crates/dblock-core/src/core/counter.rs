// crates/dblock-core/src/core/counter.rs
// ============================================================================
// Module: dblock Violation Counter
// Description: Lock-free witness of concurrent lock holders per domain.
// Purpose: Detect two workers believing they hold the same lock at once.
// Dependencies: std::sync::atomic
// ============================================================================

//! ## Overview
//! A [`ViolationCounter`] is incremented right after a worker's acquire
//! transaction commits and decremented right before its release transaction
//! commits. Any post-increment value above one is a violation of the SQL
//! pattern under test. Counters are plain atomics: a mutex here would
//! serialize the very window being measured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::identifiers::DomainIndex;

// ============================================================================
// SECTION: Counter
// ============================================================================

/// Atomic count of workers currently believing they hold one lock domain.
///
/// # Invariants
/// - `holders` returns to zero once every holder released.
/// - `peak` is the maximum post-increment value ever observed.
#[derive(Debug, Default)]
pub struct ViolationCounter {
    /// Current number of believed holders.
    holders: AtomicI64,
    /// Highest holder count observed on entry.
    peak: AtomicI64,
    /// Total number of entries since creation.
    entries: AtomicU64,
}

impl ViolationCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            holders: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            entries: AtomicU64::new(0),
        }
    }

    /// Registers a new holder and returns the post-increment holder count.
    pub fn enter(&self) -> i64 {
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(holders, Ordering::SeqCst);
        self.entries.fetch_add(1, Ordering::SeqCst);
        holders
    }

    /// Removes a holder and returns the post-decrement holder count.
    pub fn exit(&self) -> i64 {
        self.holders.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Re-registers a holder whose release did not become visible.
    ///
    /// Unlike [`Self::enter`] this is not a new entry: peak and entry totals
    /// are left untouched.
    pub fn restore(&self) -> i64 {
        self.holders.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current holder count.
    #[must_use]
    pub fn holders(&self) -> i64 {
        self.holders.load(Ordering::SeqCst)
    }

    /// Returns the highest post-increment holder count observed.
    #[must_use]
    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::SeqCst)
    }

    /// Returns the number of times a holder entered.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Counter Set
// ============================================================================

/// One [`ViolationCounter`] per independent lock domain of a run.
#[derive(Debug)]
pub struct CounterSet {
    /// Counters indexed by [`DomainIndex`].
    counters: Vec<ViolationCounter>,
}

impl CounterSet {
    /// Creates `domains` counters (at least one).
    #[must_use]
    pub fn new(domains: usize) -> Self {
        Self {
            counters: (0 .. domains.max(1)).map(|_| ViolationCounter::new()).collect(),
        }
    }

    /// Returns the counter for a domain.
    #[must_use]
    pub fn get(&self, domain: DomainIndex) -> Option<&ViolationCounter> {
        self.counters.get(domain.get())
    }

    /// Returns the number of domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Returns true when the set has no domains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Iterates domains with their counters.
    pub fn iter(&self) -> impl Iterator<Item = (DomainIndex, &ViolationCounter)> {
        self.counters.iter().enumerate().map(|(index, counter)| (DomainIndex::new(index), counter))
    }
}
