//! KV gateway library: filter chain, authorization, backend connection pool.

pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod security;

pub use config::GatewayConfig;
pub use filter::{FilterChain, GatewayFilter};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pool::{ConnectionPool, PoolError, TcpConnector};
pub use security::AuthorizationFilter;
