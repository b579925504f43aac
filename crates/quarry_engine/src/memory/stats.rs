//! Engine counters.
//!
//! Tests use these to check how many engine resources the access layer
//! actually consumed, e.g. that concurrent callers share one transaction.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a [`MemoryEngine`](super::MemoryEngine).
#[derive(Debug, Default)]
pub struct EngineStats {
    opens: AtomicU64,
    upgrades: AtomicU64,
    transactions_created: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    requests: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction(&self) {
        self.transactions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful opens.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Upgrades that ran to completion.
    pub fn upgrades(&self) -> u64 {
        self.upgrades.load(Ordering::Relaxed)
    }

    /// Transactions created through a handle.
    pub fn transactions_created(&self) -> u64 {
        self.transactions_created.load(Ordering::Relaxed)
    }

    /// Transactions that committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Transactions that rolled back.
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Requests accepted at issuance.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opens: self.opens(),
            upgrades: self.upgrades(),
            transactions_created: self.transactions_created(),
            transactions_committed: self.transactions_committed(),
            transactions_aborted: self.transactions_aborted(),
            requests: self.requests(),
        }
    }
}

/// A copy of [`EngineStats`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful opens.
    pub opens: u64,
    /// Completed upgrades.
    pub upgrades: u64,
    /// Transactions created.
    pub transactions_created: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back.
    pub transactions_aborted: u64,
    /// Requests accepted.
    pub requests: u64,
}

impl StatsSnapshot {
    /// Transactions neither committed nor rolled back yet.
    pub fn live_transactions(&self) -> u64 {
        self.transactions_created
            .saturating_sub(self.transactions_committed + self.transactions_aborted)
    }
}
