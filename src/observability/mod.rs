//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Filters, HTTP handlers, pool:
//!     → logging.rs (tracing subscriber: pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (log aggregation)
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through logs via the `x-request-id` header span
//! - Metric calls are no-ops until a recorder is installed, so tests and
//!   library users pay nothing

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
