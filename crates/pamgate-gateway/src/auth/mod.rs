//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - Network whitelists gating authentication attempts
//! - Identity backend sessions with guaranteed release
//! - PAM backend (requires the `pam` feature)
//! - Role-to-grant mapping
//! - The gateway decision procedure and its outcome types

mod authority;
pub mod backend;
mod config;
mod gateway;
mod outcome;
#[cfg(all(feature = "pam", target_os = "linux"))]
mod pam;
#[cfg(test)]
pub(crate) mod testing;
mod whitelist;

pub use authority::{AuthorityMapper, RoleAuthorityMapper};
pub use backend::{
    BackendError, BackendSession, ExternalIdentity, IdentityBackend, SessionGuard,
    UnavailableBackend,
};
pub use config::{DEFAULT_BACKEND_TIMEOUT, GatewayAuthConfig, GatewayAuthConfigBuilder};
pub use gateway::{AuthGateways, AuthenticationGateway};
pub use outcome::{AuthenticationOutcome, AuthenticationRequest, Denial, DenialKind, Granted};
#[cfg(all(feature = "pam", target_os = "linux"))]
pub use pam::PamBackend;
pub use whitelist::{CidrRange, WhitelistError, WhitelistPolicy};

use thiserror::Error;

/// Errors raised while setting up authentication.
///
/// Per-attempt failures are never errors; they are [`Denial`]s.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed whitelist entry.
    #[error("Whitelist error: {0}")]
    Whitelist(#[from] WhitelistError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}
