//! Backend connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Handler needs a backend connection:
//!     → connection_pool.rs (reuse idle, create within max_total, or wait ≤ max_wait)
//!     → connector.rs (TCP connect + AUTH/SELECT handshake, PING checks)
//!     → lease.rs (PooledConnection; drop returns it to the pool)
//!
//! Background:
//!     → maintenance.rs (evict expired/dead idle connections, top up min_idle)
//! ```
//!
//! # Design Decisions
//! - Generic over [`Connector`] so the pool is tested without a real backend
//! - Leases are RAII; explicit [`ConnectionPool::release`] exists for callers
//!   that want the `DoubleRelease` check surfaced
//! - Pool errors carry their HTTP mapping (`PoolError::status_code`)

pub mod connection_pool;
pub mod connector;
pub mod error;
pub mod lease;
pub mod maintenance;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use connection_pool::ConnectionPool;
pub use connector::{Connector, Endpoint, KvConnection, TcpConnector};
pub use error::{BackendError, PoolError};
pub use lease::{ConnectionId, PooledConnection};
pub use maintenance::MaintenanceReport;
pub use stats::{PoolStats, PoolStatus};
