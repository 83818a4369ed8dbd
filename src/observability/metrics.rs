//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by final status
//! - `gateway_authorization_total` (counter): authorization decisions
//! - `pool_acquire_total` (counter): acquire outcomes
//!   (`reused`, `created`, `exhausted`, `create_error`)
//! - `pool_acquire_wait_seconds` (histogram): time spent in `acquire`
//! - `pool_connections` (gauge): connections by state (`idle`, `in_use`, `pending`)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::pool::PoolStatus;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime. Failures are logged; the
/// gateway keeps running without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16) {
    ::metrics::counter!("gateway_requests_total", "status" => status.to_string()).increment(1);
}

/// `decision` is `allow` or `deny`.
pub fn record_authorization(decision: &'static str) {
    ::metrics::counter!("gateway_authorization_total", "decision" => decision).increment(1);
}

pub fn record_pool_acquire(outcome: &'static str, waited: Duration) {
    ::metrics::counter!("pool_acquire_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("pool_acquire_wait_seconds").record(waited.as_secs_f64());
}

pub fn record_pool_status(status: &PoolStatus) {
    ::metrics::gauge!("pool_connections", "state" => "idle").set(status.idle as f64);
    ::metrics::gauge!("pool_connections", "state" => "in_use").set(status.in_use as f64);
    ::metrics::gauge!("pool_connections", "state" => "pending").set(status.pending as f64);
}
