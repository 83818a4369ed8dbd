//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, pool bounds ordered)
//! - Refuse an enforcing authorization filter without a secret
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AuthorizationMode, GatewayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check the configuration for values that parse but cannot work.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    let auth = &config.authorization;
    if auth.mode == AuthorizationMode::Enforce && auth.secret.is_empty() {
        errors.push(ValidationError::new(
            "authorization.secret",
            "must not be empty when mode is `enforce`",
        ));
    }
    if auth.credential_key.is_empty() {
        errors.push(ValidationError::new("authorization.credential_key", "must not be empty"));
    }

    let pool = &config.pool;
    if pool.max_total == 0 {
        errors.push(ValidationError::new("pool.max_total", "must be greater than 0"));
    }
    if pool.max_idle > pool.max_total {
        errors.push(ValidationError::new(
            "pool.max_idle",
            format!("{} exceeds max_total {}", pool.max_idle, pool.max_total),
        ));
    }
    if pool.min_idle > pool.max_idle {
        errors.push(ValidationError::new(
            "pool.min_idle",
            format!("{} exceeds max_idle {}", pool.min_idle, pool.max_idle),
        ));
    }
    if pool.max_wait_ms == 0 {
        errors.push(ValidationError::new("pool.max_wait_ms", "must be greater than 0"));
    }
    if pool.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("pool.connect_timeout_ms", "must be greater than 0"));
    }
    if pool.port == 0 {
        errors.push(ValidationError::new("pool.port", "must not be 0"));
    }
    if pool.host.is_empty() {
        errors.push(ValidationError::new("pool.host", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_violation() {
        let mut config = GatewayConfig::default();
        config.authorization.secret.clear();
        config.pool.max_total = 2;
        config.pool.max_idle = 3;
        config.pool.min_idle = 4;
        config.pool.max_wait_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "authorization.secret",
                "pool.max_idle",
                "pool.min_idle",
                "pool.max_wait_ms",
            ]
        );
    }

    #[test]
    fn empty_secret_allowed_in_pass_through() {
        let mut config = GatewayConfig::default();
        config.authorization.mode = AuthorizationMode::PassThrough;
        config.authorization.secret.clear();
        assert!(validate_config(&config).is_ok());
    }
}
