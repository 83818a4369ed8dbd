//! Ordered, short-circuiting filter chain.
//!
//! # Responsibilities
//! - Hold the filters registered at startup, sorted by `order`
//! - Hand each filter a [`Next`] continuation over the remaining suffix
//! - Detect filters that invoke the continuation more than once
//!
//! # Design Decisions
//! - Lower `order` runs first; equal orders keep registration order
//!   (stable sort at build time)
//! - The chain is immutable once built and shared via `Arc`; every
//!   invocation carries its own request/response, so no locking is needed
//! - Filter errors surface to the caller unchanged

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::filter::exchange::{GatewayRequest, GatewayResponse};
use crate::pool::PoolError;

/// Errors raised while running the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A filter broke the continuation contract.
    #[error("filter `{filter}` invoked next {calls} times")]
    InvalidFilterBehavior { filter: String, calls: u32 },

    /// A backend pool operation failed during dispatch.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A filter failed for its own reasons.
    #[error("filter `{filter}` failed: {source}")]
    Filter {
        filter: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ChainError {
    /// HTTP status reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChainError::Pool(e) => e.status_code(),
            ChainError::InvalidFilterBehavior { .. } | ChainError::Filter { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ChainError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

/// A unit of request processing.
///
/// A filter either calls `next.run(request)` exactly once (optionally
/// post-processing the result) or returns its own response without calling
/// it, which stops every later filter and the terminal handler.
pub trait GatewayFilter: Send + Sync {
    /// Position in the chain; lower runs first.
    fn order(&self) -> i32;

    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn filter(
        &self,
        request: &mut GatewayRequest,
        next: &mut Next<'_>,
    ) -> Result<GatewayResponse, ChainError>;
}

/// Handler invoked once every filter has let the request through.
pub type TerminalHandler =
    Arc<dyn Fn(&mut GatewayRequest) -> Result<GatewayResponse, ChainError> + Send + Sync>;

/// Continuation over the remaining suffix of the chain.
pub struct Next<'a> {
    chain: &'a FilterChain,
    index: usize,
    caller: &'a str,
    calls: u32,
}

impl Next<'_> {
    /// Run the rest of the chain. A second call fails without re-running it.
    pub fn run(&mut self, request: &mut GatewayRequest) -> Result<GatewayResponse, ChainError> {
        self.calls += 1;
        if self.calls > 1 {
            tracing::error!(filter = %self.caller, calls = self.calls, "Filter invoked next more than once");
            return Err(ChainError::InvalidFilterBehavior {
                filter: self.caller.to_string(),
                calls: self.calls,
            });
        }
        self.chain.dispatch(self.index, request)
    }
}

/// Ordered list of filters plus the terminal handler.
#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn GatewayFilter>>,
    terminal: TerminalHandler,
}

impl FilterChain {
    pub fn builder() -> FilterChainBuilder {
        FilterChainBuilder::default()
    }

    /// Run a request through every filter and, if none short-circuits,
    /// the terminal handler.
    pub fn run(&self, request: &mut GatewayRequest) -> Result<GatewayResponse, ChainError> {
        self.dispatch(0, request)
    }

    /// Filter names in execution order.
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn dispatch(
        &self,
        index: usize,
        request: &mut GatewayRequest,
    ) -> Result<GatewayResponse, ChainError> {
        match self.filters.get(index) {
            Some(filter) => {
                let mut next = Next {
                    chain: self,
                    index: index + 1,
                    caller: filter.name(),
                    calls: 0,
                };
                filter.filter(request, &mut next)
            }
            None => (self.terminal)(request),
        }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filter_names())
            .finish_non_exhaustive()
    }
}

/// Collects filters at startup; `build` freezes their order.
pub struct FilterChainBuilder {
    filters: Vec<Arc<dyn GatewayFilter>>,
    terminal: TerminalHandler,
}

impl Default for FilterChainBuilder {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            terminal: Arc::new(|_: &mut GatewayRequest| Ok(GatewayResponse::forward())),
        }
    }
}

impl FilterChainBuilder {
    pub fn filter(mut self, filter: impl GatewayFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn shared_filter(mut self, filter: Arc<dyn GatewayFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replace the default terminal handler, which forwards downstream.
    pub fn terminal<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut GatewayRequest) -> Result<GatewayResponse, ChainError> + Send + Sync + 'static,
    {
        self.terminal = Arc::new(handler);
        self
    }

    pub fn build(mut self) -> FilterChain {
        // sort_by_key is stable: ties stay in registration order
        self.filters.sort_by_key(|f| f.order());
        tracing::debug!(
            filters = ?self.filters.iter().map(|f| (f.name().to_string(), f.order())).collect::<Vec<_>>(),
            "Filter chain built"
        );
        FilterChain {
            filters: self.filters,
            terminal: self.terminal,
        }
    }
}
