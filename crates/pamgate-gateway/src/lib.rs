//! # pamgate gateway
//!
//! Authentication gateway: decides whether a login attempt may proceed from
//! its network origin, checks the credentials against an identity backend,
//! and maps the backend's groups to roles and grants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;

pub use auth::{
    AuthError, AuthGateways, AuthenticationGateway, AuthenticationOutcome, AuthenticationRequest,
    AuthorityMapper, DenialKind, GatewayAuthConfig, IdentityBackend, RoleAuthorityMapper,
    WhitelistPolicy,
};

#[cfg(all(feature = "pam", target_os = "linux"))]
pub use auth::PamBackend;

use std::sync::Arc;

/// Build the standard gateways from the config file's `auth` section.
///
/// Uses the PAM backend when compiled with the `pam` feature, and a backend
/// that is always unavailable otherwise.
///
/// # Errors
///
/// Returns error if the configuration is invalid.
pub fn gateways_from_config(config: &pamgate_core::Config) -> Result<AuthGateways, AuthError> {
    let auth_config = GatewayAuthConfig::from_section(&config.auth)?;
    let backend = default_backend(&auth_config)?;
    Ok(AuthGateways::build(
        &auth_config,
        backend,
        Arc::new(RoleAuthorityMapper::new()),
    ))
}

#[cfg(all(feature = "pam", target_os = "linux"))]
fn default_backend(config: &GatewayAuthConfig) -> Result<Arc<dyn IdentityBackend>, AuthError> {
    Ok(Arc::new(PamBackend::new(config.pam_service.clone())?))
}

#[cfg(not(all(feature = "pam", target_os = "linux")))]
#[allow(clippy::unnecessary_wraps)]
fn default_backend(config: &GatewayAuthConfig) -> Result<Arc<dyn IdentityBackend>, AuthError> {
    tracing::warn!(
        service = %config.pam_service,
        "PAM support not compiled in; every login will report the backend as unavailable"
    );
    Ok(Arc::new(auth::UnavailableBackend::new(
        "PAM support not compiled in",
    )))
}
