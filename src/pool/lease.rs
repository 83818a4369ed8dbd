//! Connection identity and the RAII lease handed to callers.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pool::connection_pool::PoolShared;
use crate::pool::connector::Connector;

/// Identifier of one pooled connection, unique within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connection checked out of a [`ConnectionPool`](crate::pool::ConnectionPool).
///
/// Dropping the lease returns the connection to its pool, so every exit path
/// (early return, `?`, panic) gives the slot back. Use [`discard`](Self::discard)
/// when the connection is known to be unusable.
pub struct PooledConnection<C: Connector> {
    id: ConnectionId,
    conn: Option<C::Connection>,
    pool: Arc<PoolShared<C>>,
    acquired_at: Instant,
    reused: bool,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(
        id: ConnectionId,
        conn: C::Connection,
        pool: Arc<PoolShared<C>>,
        reused: bool,
    ) -> Self {
        Self {
            id,
            conn: Some(conn),
            pool,
            acquired_at: Instant::now(),
            reused,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True when the connection came from the idle set rather than being created.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// How long this lease has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// True once the owning pool has been closed. The connection is still
    /// usable, but it is destroyed instead of reused when the lease ends.
    pub fn is_pool_closed(&self) -> bool {
        *self.pool.closed_tx.borrow()
    }

    /// Destroy the connection instead of returning it for reuse.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.destroy_leased(self.id, conn);
        }
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<PoolShared<C>>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }

    pub(crate) fn take(mut self) -> (ConnectionId, Option<C::Connection>) {
        (self.id, self.conn.take())
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("BUG: PooledConnection used after return to pool")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("BUG: PooledConnection used after return to pool")
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("reused", &self.reused)
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.pool.put_back(self.id, conn) {
                tracing::error!(connection_id = %self.id, error = %e, "Failed to return connection to pool");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).as_u64(), 7);
        assert_ne!(ConnectionId::new(1), ConnectionId::new(2));
    }
}
