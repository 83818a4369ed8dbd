//! Background pool maintenance.
//!
//! # Responsibilities
//! - Close idle connections past `idle_timeout`
//! - Check idle connections and evict the ones that fail
//! - Top idle connections back up toward `min_idle`
//!
//! # Design Decisions
//! - Expiry needs no I/O and runs under the lock in one step
//! - Only one idle connection is out for probing at a time, and only when
//!   an `acquire` could still get another idle connection or a free slot;
//!   otherwise the check is deferred to `test_on_borrow`
//! - The connection being checked counts as pending, so `max_total` holds
//! - The task holds only a weak reference and stops when the pool closes
//!   or is dropped

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::pool::connection_pool::{ConnectionPool, IdleConnection, SlotReservation};
use crate::pool::connector::Connector;

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Idle connections that passed their liveness check.
    pub kept: usize,
    /// Idle connections closed because the check failed or idle was full.
    pub evicted: usize,
    /// Idle connections closed for exceeding the idle timeout.
    pub expired: usize,
    /// Idle connections left unchecked because callers needed them.
    pub deferred: usize,
    /// Connections created to reach `min_idle`.
    pub created: usize,
}

impl<C: Connector> ConnectionPool<C> {
    /// Run one expiry, liveness check and top-up pass.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        let shared = &self.shared;

        let expired = {
            let mut state = shared.lock();
            if state.closed {
                return report;
            }
            match shared.config.idle_timeout() {
                Some(timeout) => {
                    let (expired, fresh): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.idle)
                        .into_iter()
                        .partition(|idle| idle.idle_since.elapsed() >= timeout);
                    state.idle = fresh;
                    expired
                }
                None => VecDeque::new(),
            }
        };
        if !expired.is_empty() {
            report.expired = expired.len();
            for idle in &expired {
                tracing::debug!(connection_id = %idle.id, "Idle connection expired");
            }
            drop(expired);
            shared.stats.record_destroyed(report.expired as u64);
            shared.notify_all();
        }

        let mut checked = HashSet::new();
        loop {
            let (mut idle, reservation) = {
                let mut state = shared.lock();
                if state.closed {
                    break;
                }
                let Some(pos) = state.idle.iter().position(|idle| !checked.contains(&idle.id)) else {
                    break;
                };
                let spare = state.idle.len() > 1 || state.total() < shared.config.max_total;
                if !spare {
                    report.deferred = state
                        .idle
                        .iter()
                        .filter(|idle| !checked.contains(&idle.id))
                        .count();
                    break;
                }
                let Some(idle) = state.idle.remove(pos) else {
                    break;
                };
                state.pending += 1;
                (idle, SlotReservation::adopt(shared))
            };
            checked.insert(idle.id);

            if !shared.connector.is_valid(&mut idle.conn).await {
                let id = idle.id;
                drop(idle);
                drop(reservation);
                shared.stats.record_validation_failure();
                shared.stats.record_destroyed(1);
                report.evicted += 1;
                tracing::warn!(connection_id = %id, "Evicting idle connection that failed liveness check");
                continue;
            }
            match reservation.restore_idle(idle) {
                Ok(()) => report.kept += 1,
                Err(_conn) => {
                    shared.stats.record_destroyed(1);
                    report.evicted += 1;
                }
            }
        }

        loop {
            let reservation = {
                let mut state = shared.lock();
                if state.closed
                    || state.idle.len() >= shared.config.min_idle
                    || state.total() >= shared.config.max_total
                {
                    break;
                }
                state.pending += 1;
                SlotReservation::adopt(shared)
            };

            match shared.connector.connect().await {
                Ok(conn) => {
                    let id = shared.next_id();
                    shared.stats.record_created();
                    match reservation.commit_idle(IdleConnection::new(id, conn)) {
                        Ok(()) => report.created += 1,
                        Err(_conn) => {
                            shared.stats.record_destroyed(1);
                            break;
                        }
                    }
                }
                Err(e) => {
                    drop(reservation);
                    shared.stats.record_create_failure();
                    tracing::warn!(
                        endpoint = %shared.connector.endpoint(),
                        error = %e,
                        "Failed to pre-warm idle connection"
                    );
                    break;
                }
            }
        }

        report
    }

    /// Spawn the periodic maintenance task.
    ///
    /// Returns `None` when `maintenance_interval_ms` is 0. Must be called
    /// from within a Tokio runtime.
    pub fn spawn_maintenance(&self) -> Option<JoinHandle<()>> {
        let interval = self.shared.config.maintenance_interval()?;
        let pool = Arc::downgrade(&self.shared);
        let mut closed = self.shared.closed_tx.subscribe();

        tracing::info!(interval_ms = interval.as_millis() as u64, "Pool maintenance starting");

        Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(shared) = pool.upgrade() else { break };
                        let report = ConnectionPool { shared }.run_maintenance().await;
                        if report != MaintenanceReport::default() {
                            tracing::debug!(?report, "Pool maintenance pass");
                        }
                    }
                    _ = async { let _ = closed.wait_for(|closed| *closed).await; } => {
                        break;
                    }
                }
            }
            tracing::info!("Pool maintenance stopped");
        }))
    }
}
