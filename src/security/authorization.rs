//! Authorization filter.
//! Decides whether a request may continue down the chain.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::config::{AuthorizationConfig, AuthorizationMode, CredentialSource};
use crate::filter::{ChainError, GatewayFilter, GatewayRequest, GatewayResponse, Next};
use crate::observability::metrics;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Allow,
    Deny(StatusCode),
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationDecision::Allow)
    }
}

/// Pluggable authorization predicate.
///
/// Implementations must resolve a missing or unreadable credential to a
/// `Deny`; there is no error path that falls back to `Allow`.
pub trait AuthorizationPolicy: Send + Sync {
    fn evaluate(&self, request: &GatewayRequest) -> AuthorizationDecision;
}

/// Exact, case-sensitive match of one named field against a shared secret.
#[derive(Debug, Clone)]
pub struct SharedSecretPolicy {
    secret: String,
    key: String,
    source: CredentialSource,
}

impl SharedSecretPolicy {
    pub fn new(secret: impl Into<String>, key: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            secret: secret.into(),
            key: key.into(),
            source,
        }
    }

    pub fn from_config(config: &AuthorizationConfig) -> Self {
        Self::new(&config.secret, &config.credential_key, config.credential_source)
    }

    fn credential<'r>(&self, request: &'r GatewayRequest) -> Option<&'r str> {
        match self.source {
            CredentialSource::Query => request.query_param(&self.key),
            CredentialSource::Header => request.header(&self.key),
        }
    }
}

impl AuthorizationPolicy for SharedSecretPolicy {
    fn evaluate(&self, request: &GatewayRequest) -> AuthorizationDecision {
        match self.credential(request) {
            Some(value) if !value.is_empty() && value == self.secret => AuthorizationDecision::Allow,
            _ => AuthorizationDecision::Deny(StatusCode::UNAUTHORIZED),
        }
    }
}

/// Filter that enforces an [`AuthorizationPolicy`], or lets everything
/// through in [`AuthorizationMode::PassThrough`].
#[derive(Clone)]
pub struct AuthorizationFilter {
    mode: AuthorizationMode,
    policy: Arc<dyn AuthorizationPolicy>,
    order: i32,
}

impl AuthorizationFilter {
    pub fn new(mode: AuthorizationMode, policy: Arc<dyn AuthorizationPolicy>, order: i32) -> Self {
        if mode == AuthorizationMode::PassThrough {
            tracing::warn!(order, "Authorization filter in pass-through mode; all requests are allowed");
        }
        Self { mode, policy, order }
    }

    /// Build the shared-secret filter described by the configuration.
    pub fn from_config(config: &AuthorizationConfig) -> Self {
        Self::new(
            config.mode,
            Arc::new(SharedSecretPolicy::from_config(config)),
            config.order,
        )
    }

    /// A filter that allows every request.
    pub fn pass_through() -> Self {
        Self::from_config(&AuthorizationConfig {
            mode: AuthorizationMode::PassThrough,
            ..AuthorizationConfig::default()
        })
    }

    pub fn mode(&self) -> AuthorizationMode {
        self.mode
    }

    pub fn evaluate(&self, request: &GatewayRequest) -> AuthorizationDecision {
        match self.mode {
            AuthorizationMode::PassThrough => AuthorizationDecision::Allow,
            AuthorizationMode::Enforce => self.policy.evaluate(request),
        }
    }
}

impl GatewayFilter for AuthorizationFilter {
    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        "authorization"
    }

    fn filter(
        &self,
        request: &mut GatewayRequest,
        next: &mut Next<'_>,
    ) -> Result<GatewayResponse, ChainError> {
        match self.evaluate(request) {
            AuthorizationDecision::Allow => {
                metrics::record_authorization("allow");
                next.run(request)
            }
            AuthorizationDecision::Deny(status) => {
                metrics::record_authorization("deny");
                tracing::warn!(
                    method = %request.method(),
                    path = %request.path(),
                    status = status.as_u16(),
                    "Request rejected by authorization filter"
                );
                Ok(GatewayResponse::status(status))
            }
        }
    }
}
