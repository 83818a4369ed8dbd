//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Authorization filter settings.
    pub authorization: AuthorizationConfig,

    /// Key-value backend connection pool settings.
    pub pool: PoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Whether the authorization filter enforces its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMode {
    /// Evaluate the configured policy for every request.
    #[default]
    Enforce,
    /// Allow every request regardless of credentials.
    PassThrough,
}

/// Where the credential is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Query string parameter.
    #[default]
    Query,
    /// Request header (case-insensitive name).
    Header,
}

/// Authorization filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Enforce the policy or pass every request through.
    pub mode: AuthorizationMode,

    /// Shared secret a request must present.
    pub secret: String,

    /// Name of the query parameter or header carrying the credential.
    pub credential_key: String,

    /// Where to look for the credential.
    pub credential_source: CredentialSource,

    /// Position of the filter in the chain (lower runs first).
    pub order: i32,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            mode: AuthorizationMode::Enforce,
            // WARNING: This is a placeholder! Change this in production.
            secret: "admin".to_string(),
            credential_key: "authorization".to_string(),
            credential_source: CredentialSource::Query,
            order: -1,
        }
    }
}

/// Connection pool configuration for the key-value backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Backend host.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Password sent with `AUTH` after connecting.
    pub password: Option<String>,

    /// Logical database selected after authenticating.
    pub database: u32,

    /// Connection establishment and per-command timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Hard ceiling on connections held by the pool (idle + in use).
    pub max_total: usize,

    /// Ceiling on idle connections retained for reuse.
    pub max_idle: usize,

    /// Idle connections maintenance tries to keep warm.
    pub min_idle: usize,

    /// How long `acquire` may wait for a free slot, in milliseconds.
    pub max_wait_ms: u64,

    /// Check idle connections before handing them out.
    pub test_on_borrow: bool,

    /// Idle connections older than this are evicted by maintenance (0 = never).
    pub idle_timeout_secs: u64,

    /// Background maintenance period in milliseconds (0 = disabled).
    pub maintenance_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            connect_timeout_ms: 1000,
            max_total: 8,
            max_idle: 8,
            min_idle: 0,
            max_wait_ms: 200,
            test_on_borrow: true,
            idle_timeout_secs: 600,
            maintenance_interval_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when idle connections never expire.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// `None` when background maintenance is disabled.
    pub fn maintenance_interval(&self) -> Option<Duration> {
        (self.maintenance_interval_ms > 0)
            .then(|| Duration::from_millis(self.maintenance_interval_ms))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty for development, JSON for log aggregation.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
