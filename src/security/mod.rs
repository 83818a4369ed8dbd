//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (inside the filter chain):
//!     → authorization.rs (evaluate policy: Allow → next, Deny → 401)
//!     → Pass to remaining filters / dispatcher
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing or unreadable credential is a denial
//! - The policy is a trait object so token or role checks can replace the
//!   shared-secret match without touching the chain
//! - Disabling enforcement is an explicit configuration mode

pub mod authorization;

pub use authorization::{
    AuthorizationDecision, AuthorizationFilter, AuthorizationPolicy, SharedSecretPolicy,
};
