//! Pool counters.
//!
//! Counters are atomics with `Relaxed` ordering: they feed logs, metrics and
//! `/pool/stats`, never pool decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of cumulative pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections successfully created.
    pub created: u64,
    /// Connections closed (discarded, evicted, over `max_idle`, pool closed).
    pub destroyed: u64,
    /// Successful `acquire` calls.
    pub acquisitions: u64,
    /// Acquisitions served from the idle set.
    pub reused: u64,
    /// `acquire` calls that timed out.
    pub exhausted: u64,
    /// Connection attempts that failed.
    pub create_failures: u64,
    /// Idle connections that failed a liveness check.
    pub validation_failures: u64,
}

impl PoolStats {
    /// Connections currently alive according to the counters.
    pub fn live(&self) -> u64 {
        self.created.saturating_sub(self.destroyed)
    }
}

/// Point-in-time occupancy of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    /// Slots reserved for connections being created or checked.
    pub pending: usize,
    pub max_total: usize,
    pub max_idle: usize,
    pub closed: bool,
}

impl PoolStatus {
    /// Slots held by idle, in-use and pending connections.
    pub fn total(&self) -> usize {
        self.idle + self.in_use + self.pending
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicPoolStats {
    created: AtomicU64,
    destroyed: AtomicU64,
    acquisitions: AtomicU64,
    reused: AtomicU64,
    exhausted: AtomicU64,
    create_failures: AtomicU64,
    validation_failures: AtomicU64,
}

impl AtomicPoolStats {
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroyed(&self, count: u64) {
        self.destroyed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_acquisition(&self, reused: bool) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if reused {
            self.reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create_failure(&self) {
        self.create_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
        }
    }
}
