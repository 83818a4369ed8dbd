//! Request filter subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (HTTP adapter copies method/path/query/headers)
//!     → chain.rs (filters in ascending `order`)
//!         → access_log.rs (order i32::MIN, logs outcome)
//!         → security::AuthorizationFilter (order -1 by default)
//!         → ... any other registered filter
//!     → terminal handler (default: Forward)
//!     → GatewayResponse back to the adapter
//! ```
//!
//! # Design Decisions
//! - Filters are synchronous; anything that needs to suspend belongs in the
//!   downstream dispatcher
//! - Filters are registered explicitly through `FilterChainBuilder`
//! - A filter returning without calling `next` short-circuits the chain

pub mod access_log;
pub mod chain;
pub mod exchange;

pub use access_log::AccessLogFilter;
pub use chain::{ChainError, FilterChain, FilterChainBuilder, GatewayFilter, Next, TerminalHandler};
pub use exchange::{Disposition, GatewayRequest, GatewayResponse};
