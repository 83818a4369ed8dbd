//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → /health (answered directly, outside the filter chain)
//!     → middleware.rs (copy request into the filter chain)
//!         → Complete: chain response returned as-is
//!         → Forward: handlers below run
//!     → /pool/stats, /backend/ping (use the connection pool)
//! ```

pub mod middleware;
pub mod server;

pub use middleware::filter_chain_middleware;
pub use server::{AppState, HttpServer};
