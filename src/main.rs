//! KV Gateway
//!
//! An HTTP front door to a key-value backend, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ filter chain ──────────▶ handlers ──▶ connection pool ──▶ KV backend
//!                     (request id,    (access log,             (/pool/stats,  (max_total,
//!                      trace,          authorization)            /backend/ping)  max_idle, max_wait)
//!                      timeout)            │
//!                                          └─ Deny ──▶ 401
//!
//!     /health is answered before the filter chain.
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use kv_gateway::config::{load_config, GatewayConfig};
use kv_gateway::lifecycle::{wait_for_signal, Shutdown};
use kv_gateway::observability::{init_logging, init_metrics};
use kv_gateway::pool::{ConnectionPool, TcpConnector};
use kv_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "kv-gateway")]
#[command(about = "HTTP gateway with request filtering and pooled backend connections", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "KV_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("kv-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    match &cli.config {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::warn!("No configuration file given; using defaults"),
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        authorization_mode = ?config.authorization.mode,
        backend = %format!("{}:{}", config.pool.host, config.pool.port),
        max_total = config.pool.max_total,
        "Configuration summary"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pool = ConnectionPool::new(config.pool.clone(), TcpConnector::from_config(&config.pool));
    let maintenance = pool.spawn_maintenance();

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, pool);
    server.run(listener, shutdown).await?;

    if let Some(handle) = maintenance {
        let _ = handle.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
