//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the filter chain from configuration
//! - Create the Axum router with health, pool and backend handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve until shutdown, then close the connection pool

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::filter::{AccessLogFilter, ChainError, FilterChain};
use crate::http::middleware::filter_chain_middleware;
use crate::lifecycle::Shutdown;
use crate::pool::{ConnectionPool, PoolStats, PoolStatus, TcpConnector};
use crate::security::AuthorizationFilter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: ConnectionPool<TcpConnector>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    pool: ConnectionPool<TcpConnector>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and backend pool.
    pub fn new(config: GatewayConfig, pool: ConnectionPool<TcpConnector>) -> Self {
        let chain = Arc::new(Self::build_chain(&config));
        tracing::info!(filters = ?chain.filter_names(), "Filter chain built");

        let state = AppState { pool: pool.clone() };
        let router = Self::build_router(&config, chain, state);
        Self {
            router,
            config,
            pool,
        }
    }

    /// The filters every guarded request passes through.
    pub fn build_chain(config: &GatewayConfig) -> FilterChain {
        FilterChain::builder()
            .filter(AccessLogFilter)
            .filter(AuthorizationFilter::from_config(&config.authorization))
            .build()
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, chain: Arc<FilterChain>, state: AppState) -> Router {
        let guarded = Router::new()
            .route("/pool/stats", get(pool_stats))
            .route("/backend/ping", get(backend_ping))
            .route_layer(from_fn_with_state(chain, filter_chain_middleware))
            .with_state(state);

        Router::new()
            .route("/health", get(health))
            .merge(guarded)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::with_status_code(
                        StatusCode::REQUEST_TIMEOUT,
                        Duration::from_secs(config.listener.request_timeout_secs),
                    )),
            )
    }

    /// Run the server until `shutdown` fires, then close the pool.
    ///
    /// In-flight requests are drained before the pool closes.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        self.pool.close();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[derive(Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct PoolReport {
    status: PoolStatus,
    stats: PoolStats,
}

async fn pool_stats(State(state): State<AppState>) -> Json<PoolReport> {
    Json(PoolReport {
        status: state.pool.status(),
        stats: state.pool.stats(),
    })
}

/// Borrow a backend connection and PING it.
async fn backend_ping(State(state): State<AppState>) -> Response {
    let mut conn = match state.pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "Could not borrow backend connection");
            return ChainError::from(e).into_response();
        }
    };

    match conn.ping().await {
        Ok(()) => (StatusCode::OK, "PONG").into_response(),
        Err(e) => {
            tracing::warn!(connection_id = %conn.id(), error = %e, "Backend ping failed");
            conn.discard();
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
