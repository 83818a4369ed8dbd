//! Bounded connection pool.
//!
//! # Responsibilities
//! - Lazily create connections through a [`Connector`], up to `max_total`
//! - Reuse idle connections (most recently returned first), probing them first
//! - Make callers wait at most `max_wait` when the pool is saturated
//! - Keep at most `max_idle` connections once they are returned
//!
//! # Design Decisions
//! - One `std::sync::Mutex` guards idle/in-use/pending bookkeeping; it is
//!   never held across an `.await`, so `release` never blocks on I/O
//! - Every slot is accounted for as idle, in use or pending:
//!   `idle + in_use + pending <= max_total`
//! - Waiters park on a `Notify` registered before the state is inspected,
//!   so a release between the check and the wait is not lost
//! - Reservations are RAII guards: dropping an `acquire` future at any
//!   await point hands its slot back
//! - `close` does not reach into outstanding leases. Their connections stay
//!   open while the holder keeps them and are destroyed when released or
//!   dropped; holders can poll `PooledConnection::is_pool_closed`

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{watch, Notify};
use tokio::time;

use crate::config::PoolConfig;
use crate::observability::metrics;
use crate::pool::connector::Connector;
use crate::pool::error::PoolError;
use crate::pool::lease::{ConnectionId, PooledConnection};
use crate::pool::stats::{AtomicPoolStats, PoolStats, PoolStatus};

pub(super) struct IdleConnection<T> {
    pub id: ConnectionId,
    pub conn: T,
    pub idle_since: Instant,
}

impl<T> IdleConnection<T> {
    pub fn new(id: ConnectionId, conn: T) -> Self {
        Self {
            id,
            conn,
            idle_since: Instant::now(),
        }
    }
}

pub(super) struct PoolState<T> {
    pub idle: VecDeque<IdleConnection<T>>,
    pub in_use: HashSet<ConnectionId>,
    pub pending: usize,
    pub closed: bool,
}

impl<T> PoolState<T> {
    pub fn total(&self) -> usize {
        self.idle.len() + self.in_use.len() + self.pending
    }
}

/// State shared between the pool handle, its leases and the maintenance task.
pub(crate) struct PoolShared<C: Connector> {
    pub(super) config: PoolConfig,
    pub(super) connector: C,
    state: Mutex<PoolState<C::Connection>>,
    available: Notify,
    next_id: AtomicU64,
    pub(super) stats: AtomicPoolStats,
    pub(super) closed_tx: watch::Sender<bool>,
}

impl<C: Connector> PoolShared<C> {
    pub(super) fn lock(&self) -> MutexGuard<'_, PoolState<C::Connection>> {
        // Critical sections never panic halfway through an update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn status_of(&self, state: &PoolState<C::Connection>) -> PoolStatus {
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            pending: state.pending,
            max_total: self.config.max_total,
            max_idle: self.config.max_idle,
            closed: state.closed,
        }
    }

    /// Return a leased connection, keeping it idle if there is room.
    pub(crate) fn put_back(&self, id: ConnectionId, mut conn: C::Connection) -> Result<(), PoolError> {
        let broken = self.connector.has_broken(&mut conn);

        let mut state = self.lock();
        if !state.in_use.remove(&id) {
            return Err(PoolError::DoubleRelease { id });
        }
        let keep = !state.closed && !broken && state.idle.len() < self.config.max_idle;
        let leftover = if keep {
            state.idle.push_back(IdleConnection::new(id, conn));
            None
        } else {
            Some(conn)
        };
        let status = self.status_of(&state);
        drop(state);

        if let Some(conn) = leftover {
            drop(conn);
            self.stats.record_destroyed(1);
            tracing::debug!(
                connection_id = %id,
                broken,
                closed = status.closed,
                idle = status.idle,
                "Connection closed on release"
            );
        }
        self.available.notify_one();
        metrics::record_pool_status(&status);
        Ok(())
    }

    /// Destroy a leased connection instead of returning it.
    pub(crate) fn destroy_leased(&self, id: ConnectionId, conn: C::Connection) {
        let status = {
            let mut state = self.lock();
            state.in_use.remove(&id);
            self.status_of(&state)
        };
        drop(conn);
        self.stats.record_destroyed(1);
        self.available.notify_one();
        metrics::record_pool_status(&status);
        tracing::debug!(connection_id = %id, "Connection discarded");
    }

    /// Wake every waiter after several slots were freed at once.
    pub(super) fn notify_all(&self) {
        self.available.notify_waiters();
    }

    fn release_pending(&self) {
        {
            let mut state = self.lock();
            state.pending = state.pending.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

/// A slot counted in `pending`. Dropping it without committing frees the slot.
pub(super) struct SlotReservation<'a, C: Connector> {
    shared: &'a PoolShared<C>,
    armed: bool,
}

impl<'a, C: Connector> SlotReservation<'a, C> {
    /// Wrap a slot the caller has already added to `pending`.
    pub fn adopt(shared: &'a PoolShared<C>) -> Self {
        Self { shared, armed: true }
    }

    /// Turn the slot into an in-use connection.
    pub fn commit_in_use(mut self, id: ConnectionId) -> Result<(), PoolError> {
        self.armed = false;
        let mut state = self.shared.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.closed {
            drop(state);
            self.shared.available.notify_one();
            return Err(PoolError::Closed);
        }
        state.in_use.insert(id);
        Ok(())
    }

    /// Turn the slot into an idle connection, or hand the connection back
    /// if the pool closed or the idle set is full.
    pub fn commit_idle(
        mut self,
        idle: IdleConnection<C::Connection>,
    ) -> Result<(), C::Connection> {
        self.armed = false;
        let mut state = self.shared.lock();
        state.pending = state.pending.saturating_sub(1);
        let result = if !state.closed && state.idle.len() < self.shared.config.max_idle {
            state.idle.push_back(idle);
            Ok(())
        } else {
            Err(idle.conn)
        };
        drop(state);
        self.shared.available.notify_one();
        result
    }

    /// Put a checked idle connection back at the old end of the idle set,
    /// keeping its idle age.
    pub fn restore_idle(
        mut self,
        idle: IdleConnection<C::Connection>,
    ) -> Result<(), C::Connection> {
        self.armed = false;
        let mut state = self.shared.lock();
        state.pending = state.pending.saturating_sub(1);
        let result = if !state.closed && state.idle.len() < self.shared.config.max_idle {
            state.idle.push_front(idle);
            Ok(())
        } else {
            Err(idle.conn)
        };
        drop(state);
        self.shared.available.notify_one();
        result
    }
}

impl<C: Connector> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release_pending();
        }
    }
}

enum Step<T> {
    Reuse(IdleConnection<T>),
    Create,
    Wait,
}

/// Handle to a bounded pool of backend connections.
///
/// Cloning is cheap; every clone refers to the same pool.
pub struct ConnectionPool<C: Connector> {
    pub(super) shared: Arc<PoolShared<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.shared.connector.endpoint())
            .field("status", &self.status())
            .finish()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an empty pool. Connections are opened on demand.
    pub fn new(config: PoolConfig, connector: C) -> Self {
        tracing::info!(
            endpoint = %connector.endpoint(),
            max_total = config.max_total,
            max_idle = config.max_idle,
            min_idle = config.min_idle,
            max_wait_ms = config.max_wait_ms,
            "Connection pool created"
        );
        let (closed_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(PoolShared {
                config,
                connector,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    in_use: HashSet::new(),
                    pending: 0,
                    closed: false,
                }),
                available: Notify::new(),
                next_id: AtomicU64::new(1),
                stats: AtomicPoolStats::default(),
                closed_tx,
            }),
        }
    }

    /// Check out a connection, waiting up to `max_wait` for a free slot.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        let shared = &self.shared;
        let started = Instant::now();
        let deadline = time::Instant::from_std(started + shared.config.max_wait());

        loop {
            let notified = shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = {
                let mut state = shared.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                if let Some(idle) = state.idle.pop_back() {
                    state.in_use.insert(idle.id);
                    Step::Reuse(idle)
                } else if state.total() < shared.config.max_total {
                    state.pending += 1;
                    Step::Create
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Reuse(idle) => {
                    let mut lease = PooledConnection::new(idle.id, idle.conn, shared.clone(), true);
                    if shared.config.test_on_borrow && !shared.connector.is_valid(&mut *lease).await {
                        shared.stats.record_validation_failure();
                        tracing::warn!(connection_id = %lease.id(), "Idle connection failed liveness check; discarding");
                        lease.discard();
                        continue;
                    }
                    self.record_acquired(started, true);
                    return Ok(lease);
                }
                Step::Create => {
                    let reservation = SlotReservation::adopt(shared);
                    match shared.connector.connect().await {
                        Ok(conn) => {
                            let id = shared.next_id();
                            shared.stats.record_created();
                            if let Err(e) = reservation.commit_in_use(id) {
                                drop(conn);
                                shared.stats.record_destroyed(1);
                                tracing::debug!(connection_id = %id, "Pool closed while connecting; connection dropped");
                                return Err(e);
                            }
                            tracing::debug!(connection_id = %id, "Connection created");
                            self.record_acquired(started, false);
                            return Ok(PooledConnection::new(id, conn, shared.clone(), false));
                        }
                        Err(e) => {
                            drop(reservation);
                            shared.stats.record_create_failure();
                            metrics::record_pool_acquire("create_error", started.elapsed());
                            tracing::warn!(
                                endpoint = %shared.connector.endpoint(),
                                error = %e,
                                "Failed to create backend connection"
                            );
                            return Err(PoolError::Create(e));
                        }
                    }
                }
                Step::Wait => {
                    if time::timeout_at(deadline, notified).await.is_err() {
                        let waited = started.elapsed();
                        shared.stats.record_exhausted();
                        metrics::record_pool_acquire("exhausted", waited);
                        tracing::warn!(
                            waited_ms = waited.as_millis() as u64,
                            max_total = shared.config.max_total,
                            "Connection pool exhausted"
                        );
                        return Err(PoolError::Exhausted { waited });
                    }
                }
            }
        }
    }

    /// Return a lease to this pool.
    ///
    /// A lease from a different pool is refused with
    /// [`PoolError::DoubleRelease`] and goes back to its own pool instead.
    pub fn release(&self, lease: PooledConnection<C>) -> Result<(), PoolError> {
        if !lease.belongs_to(&self.shared) {
            return Err(PoolError::DoubleRelease { id: lease.id() });
        }
        match lease.take() {
            (id, Some(conn)) => self.shared.put_back(id, conn),
            (id, None) => Err(PoolError::DoubleRelease { id }),
        }
    }

    /// Close the pool. Idempotent.
    ///
    /// Idle connections are closed now; leased ones are closed when released
    /// or dropped, never returned to idle.
    /// Waiting and future `acquire` calls fail with [`PoolError::Closed`].
    pub fn close(&self) {
        let (drained, in_use) = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (std::mem::take(&mut state.idle), state.in_use.len())
        };
        let closed_idle = drained.len();
        drop(drained);
        self.shared.stats.record_destroyed(closed_idle as u64);
        self.shared.closed_tx.send_replace(true);
        self.shared.available.notify_waiters();
        metrics::record_pool_status(&self.status());
        tracing::info!(closed_idle, in_use, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        self.shared.status_of(&state)
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    fn record_acquired(&self, started: Instant, reused: bool) {
        self.shared.stats.record_acquisition(reused);
        metrics::record_pool_acquire(if reused { "reused" } else { "created" }, started.elapsed());
        metrics::record_pool_status(&self.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::testing::MockConnector;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn config(max_total: usize, max_idle: usize, max_wait_ms: u64) -> PoolConfig {
        PoolConfig {
            max_total,
            max_idle,
            min_idle: 0,
            max_wait_ms,
            maintenance_interval_ms: 0,
            ..PoolConfig::default()
        }
    }

    fn assert_bounded(pool: &ConnectionPool<MockConnector>) {
        let status = pool.status();
        assert!(
            status.idle + status.in_use <= status.max_total,
            "bounds violated: {status:?}"
        );
        assert!(status.total() <= status.max_total, "bounds violated: {status:?}");
    }

    #[tokio::test]
    async fn saturated_pool_hands_released_connection_to_waiter() {
        let pool = ConnectionPool::new(config(2, 1, 50), MockConnector::new());

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.status().in_use, 2);
        assert_bounded(&pool);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        let a_id = a.id();
        pool.release(a).unwrap();
        let c = waiter.await.unwrap().unwrap();
        assert_eq!(c.id(), a_id);
        assert!(c.is_reused());
        assert_bounded(&pool);

        pool.release(b).unwrap();
        assert_eq!(pool.status().idle, 1);
        pool.release(c).unwrap();

        let status = pool.status();
        assert_eq!(status.idle, 1);
        assert_eq!(status.in_use, 0);
        assert_eq!(pool.stats().created, 2);
        assert_eq!(pool.stats().destroyed, 1);
    }

    #[tokio::test]
    async fn acquire_times_out_when_saturated_without_leaking() {
        let pool = ConnectionPool::new(config(1, 1, 50), MockConnector::new());
        let held = pool.acquire().await.unwrap();

        let started = Instant::now();
        let err = pool.acquire().await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, PoolError::Exhausted { .. }), "{err}");
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");

        let status = pool.status();
        assert_eq!((status.in_use, status.pending), (1, 0));
        assert_eq!(pool.stats().exhausted, 1);

        drop(held);
        let again = pool.acquire().await.unwrap();
        assert!(again.is_reused());
    }

    #[tokio::test]
    async fn release_into_foreign_pool_is_rejected() {
        let pool_a = ConnectionPool::new(config(2, 2, 50), MockConnector::new());
        let pool_b = ConnectionPool::new(config(2, 2, 50), MockConnector::new());

        let lease = pool_a.acquire().await.unwrap();
        let id = lease.id();
        let err = pool_b.release(lease).unwrap_err();
        assert!(matches!(err, PoolError::DoubleRelease { id: bad } if bad == id));

        // The lease went home; neither pool's counters are corrupted.
        assert_eq!(pool_a.status().idle, 1);
        assert_eq!(pool_a.status().in_use, 0);
        assert_eq!(pool_b.status().total(), 0);
    }

    #[tokio::test]
    async fn untracked_id_is_double_release() {
        let pool = ConnectionPool::new(config(2, 2, 50), MockConnector::new());
        let lease = pool.acquire().await.unwrap();
        let (id, conn) = lease.take();
        let conn = conn.unwrap();

        assert!(pool.shared.put_back(id, conn.clone()).is_ok());
        let err = pool.shared.put_back(id, conn).unwrap_err();
        assert!(matches!(err, PoolError::DoubleRelease { .. }));
        let status = pool.status();
        assert_eq!((status.idle, status.in_use), (1, 0));
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquire_and_drops_returns() {
        let pool = ConnectionPool::new(config(2, 2, 50), MockConnector::new());
        let idle = pool.acquire().await.unwrap();
        let leased = pool.acquire().await.unwrap();
        drop(idle);
        assert_eq!(pool.status().idle, 1);

        pool.close();
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
        assert_eq!(pool.status().idle, 0);

        pool.release(leased).unwrap();
        let status = pool.status();
        assert_eq!(status.total(), 0);
        assert_eq!(pool.stats().destroyed, 2);
    }

    #[tokio::test]
    async fn lease_outliving_close_is_destroyed_when_dropped() {
        let pool = ConnectionPool::new(config(2, 2, 50), MockConnector::new());
        let lease = pool.acquire().await.unwrap();
        assert!(!lease.is_pool_closed());

        pool.close();
        assert!(lease.is_pool_closed());
        assert_eq!(pool.status().in_use, 1);
        assert_eq!(pool.stats().live(), 1);

        drop(lease);
        assert_eq!(pool.status().total(), 0);
        assert_eq!(pool.stats().live(), 0);
    }

    #[tokio::test]
    async fn close_during_connect_counts_the_dropped_connection() {
        let pool = ConnectionPool::new(
            config(1, 1, 50),
            MockConnector::with_delay(Duration::from_millis(50)),
        );
        let connecting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.status().pending, 1);

        pool.close();
        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(PoolError::Closed)));

        let stats = pool.stats();
        assert_eq!((stats.created, stats.destroyed), (1, 1));
        assert_eq!(stats.live(), 0);
        assert_eq!(pool.status().total(), 0);
    }

    #[tokio::test]
    async fn close_wakes_blocked_waiters() {
        let pool = ConnectionPool::new(config(1, 1, 5_000), MockConnector::new());
        let _held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on close")
            .unwrap();
        assert!(matches!(result, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn create_failure_releases_the_slot() {
        let connector = MockConnector::new();
        let pool = ConnectionPool::new(config(1, 1, 50), connector.clone());

        connector.fail_connects(true);
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Create(_)));
        assert_eq!(pool.status().total(), 0);
        assert_eq!(pool.stats().create_failures, 1);

        connector.fail_connects(false);
        let lease = pool.acquire().await.unwrap();
        assert!(!lease.is_reused());
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_reservation() {
        let pool = ConnectionPool::new(config(1, 1, 5_000), MockConnector::new());
        let held = pool.acquire().await.unwrap();

        let cancelled = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(cancelled.is_err());
        assert_eq!(pool.status().pending, 0);

        drop(held);
        assert!(pool.acquire().await.unwrap().is_reused());
    }

    #[tokio::test]
    async fn cancelled_create_releases_its_slot() {
        let connector = MockConnector::with_delay(Duration::from_millis(200));
        let pool = ConnectionPool::new(config(1, 1, 50), connector);

        let cancelled = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(cancelled.is_err());
        let status = pool.status();
        assert_eq!((status.pending, status.in_use, status.idle), (0, 0, 0));
    }

    #[tokio::test]
    async fn dead_idle_connection_is_replaced_on_borrow() {
        let connector = MockConnector::new();
        let pool = ConnectionPool::new(config(2, 2, 50), connector.clone());

        let first = pool.acquire().await.unwrap();
        let first_id = first.id();
        drop(first);

        connector.invalidate_existing();
        let second = pool.acquire().await.unwrap();
        assert_ne!(second.id(), first_id);
        assert!(!second.is_reused());

        let stats = pool.stats();
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(pool.status().in_use, 1);
    }

    #[tokio::test]
    async fn broken_connection_is_not_kept_idle() {
        let pool = ConnectionPool::new(config(2, 2, 50), MockConnector::new());
        let mut lease = pool.acquire().await.unwrap();
        lease.broken = true;
        pool.release(lease).unwrap();

        assert_eq!(pool.status().total(), 0);
        assert_eq!(pool.stats().destroyed, 1);
    }

    #[tokio::test]
    async fn discard_frees_the_slot() {
        let pool = ConnectionPool::new(config(1, 1, 50), MockConnector::new());
        pool.acquire().await.unwrap().discard();
        assert_eq!(pool.status().total(), 0);
        assert!(!pool.acquire().await.unwrap().is_reused());
    }

    #[tokio::test]
    async fn idle_set_never_exceeds_max_idle() {
        let pool = ConnectionPool::new(config(4, 2, 50), MockConnector::new());
        let mut leases = Vec::new();
        for _ in 0..4 {
            leases.push(pool.acquire().await.unwrap());
        }
        for lease in leases {
            pool.release(lease).unwrap();
            assert!(pool.status().idle <= 2);
        }
        assert_eq!(pool.status().idle, 2);
        assert_eq!(pool.stats().destroyed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_exceed_bounds() {
        let pool = ConnectionPool::new(config(4, 2, 2_000), MockConnector::new());
        let violated = Arc::new(AtomicBool::new(false));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let pool = pool.clone();
                let violated = violated.clone();
                tokio::spawn(async move {
                    let lease = pool.acquire().await?;
                    let status = pool.status();
                    if status.total() > status.max_total {
                        violated.store(true, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    pool.release(lease)?;
                    if pool.status().idle > 2 {
                        violated.store(true, Ordering::SeqCst);
                    }
                    Ok::<_, PoolError>(())
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(!violated.load(Ordering::SeqCst));

        let stats = pool.stats();
        assert_eq!(stats.acquisitions, 32);
        assert!(stats.live() <= 2);
        assert_eq!(pool.status().in_use, 0);
    }
}
