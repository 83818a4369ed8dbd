//! Bridges Axum requests into the filter chain.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::filter::{FilterChain, GatewayRequest};
use crate::observability::metrics;

/// Run `chain` for every request routed through this layer.
///
/// Headers rewritten by filters are carried into the downstream request;
/// headers a filter set on a forwarding response are added to the
/// downstream response.
pub async fn filter_chain_middleware(
    State(chain): State<Arc<FilterChain>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let mut exchange = GatewayRequest::new(parts.method.clone(), parts.uri.path())
        .with_query_string(parts.uri.query().unwrap_or_default())
        .with_headers(std::mem::take(&mut parts.headers));

    match chain.run(&mut exchange) {
        Ok(response) if response.is_forward() => {
            parts.headers = exchange.into_headers();
            let extra = response.headers().clone();
            let mut downstream = next.run(Request::from_parts(parts, body)).await;
            downstream.headers_mut().extend(extra);
            metrics::record_request(downstream.status().as_u16());
            downstream
        }
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!(path = %parts.uri.path(), error = %e, "Filter chain aborted request");
            e.into_response()
        }
    }
}
