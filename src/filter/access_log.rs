//! Access logging as the outermost filter.

use std::time::Instant;

use crate::filter::chain::{ChainError, GatewayFilter, Next};
use crate::filter::exchange::{GatewayRequest, GatewayResponse};
use crate::observability::metrics;

/// Logs every exchange with its chain outcome and latency.
///
/// Runs first so it also sees requests that later filters reject.
#[derive(Debug, Default)]
pub struct AccessLogFilter;

impl GatewayFilter for AccessLogFilter {
    fn order(&self) -> i32 {
        i32::MIN
    }

    fn name(&self) -> &str {
        "access_log"
    }

    fn filter(
        &self,
        request: &mut GatewayRequest,
        next: &mut Next<'_>,
    ) -> Result<GatewayResponse, ChainError> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_string();

        let result = next.run(request);
        let elapsed_us = start.elapsed().as_micros() as u64;

        match &result {
            Ok(response) if response.is_forward() => {
                tracing::debug!(%method, %path, elapsed_us, "Request passed filter chain");
            }
            Ok(response) => {
                let status = response.status_code();
                tracing::info!(%method, %path, status = status.as_u16(), elapsed_us, "Request completed in filter chain");
                metrics::record_request(status.as_u16());
            }
            Err(e) => {
                tracing::error!(%method, %path, error = %e, elapsed_us, "Filter chain failed");
                metrics::record_request(e.status_code().as_u16());
            }
        }
        result
    }
}
