//! Pool and backend error types.

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::pool::lease::ConnectionId;

/// Failure talking to the key-value backend over a single connection.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend answered with an error reply (e.g. wrong password).
    #[error("backend rejected command: {0}")]
    Rejected(String),

    #[error("backend closed the connection")]
    Disconnected,

    #[error("unexpected reply from backend: {0}")]
    UnexpectedReply(String),
}

/// Errors returned by [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within `max_wait`.
    #[error("connection pool exhausted after waiting {}ms", .waited.as_millis())]
    Exhausted { waited: Duration },

    /// The pool has been closed.
    #[error("connection pool is closed")]
    Closed,

    /// Creating a new connection failed; the slot was released.
    #[error("failed to create backend connection: {0}")]
    Create(#[from] BackendError),

    /// The lease is not checked out from this pool.
    #[error("{id} is not checked out from this pool")]
    DoubleRelease { id: ConnectionId },
}

impl PoolError {
    /// HTTP status to report when this error reaches the request path.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PoolError::Exhausted { .. } | PoolError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::Create(_) => StatusCode::BAD_GATEWAY,
            PoolError::DoubleRelease { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. } | PoolError::Create(_))
    }
}
