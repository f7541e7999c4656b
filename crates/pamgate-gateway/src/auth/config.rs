//! Gateway authentication configuration.

use std::time::Duration;

use pamgate_core::config::{AuthSection, DEFAULT_PAM_SERVICE, LOOPBACK_WHITELIST};

use super::AuthError;
use super::whitelist::WhitelistPolicy;

/// Default upper bound for one backend round trip.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated gateway configuration with parsed whitelists.
#[derive(Debug, Clone)]
pub struct GatewayAuthConfig {
    /// PAM service name.
    pub pam_service: String,
    /// Upper bound for one backend round trip.
    pub backend_timeout: Duration,
    /// Policy for the interactive login.
    pub form_login_whitelist: WhitelistPolicy,
    /// Policy for the key management entry point.
    pub key_management_whitelist: WhitelistPolicy,
}

impl Default for GatewayAuthConfig {
    fn default() -> Self {
        Self {
            pam_service: DEFAULT_PAM_SERVICE.to_string(),
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            form_login_whitelist: WhitelistPolicy::unrestricted(),
            key_management_whitelist: loopback_policy(),
        }
    }
}

fn loopback_policy() -> WhitelistPolicy {
    WhitelistPolicy::from_entries(LOOPBACK_WHITELIST).unwrap_or_default()
}

impl GatewayAuthConfig {
    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> GatewayAuthConfigBuilder {
        GatewayAuthConfigBuilder::default()
    }

    /// Build from the `auth` section of the config file.
    ///
    /// # Errors
    ///
    /// Returns error if a whitelist entry is malformed, the service name is
    /// empty, or the timeout is zero.
    pub fn from_section(section: &AuthSection) -> Result<Self, AuthError> {
        let config = Self::builder()
            .pam_service(section.pam_service.clone())
            .backend_timeout(Duration::from_secs(section.backend_timeout_secs))
            .form_login_whitelist(WhitelistPolicy::from_entries(&section.form_login_whitelist)?)
            .key_management_whitelist(WhitelistPolicy::from_entries(
                &section.key_management_whitelist,
            )?)
            .build()?;

        if config.key_management_whitelist.is_unrestricted() {
            tracing::warn!("Key management whitelist permits every address");
        }

        Ok(config)
    }
}

/// Builder for `GatewayAuthConfig`.
#[derive(Debug, Default)]
pub struct GatewayAuthConfigBuilder {
    config: GatewayAuthConfig,
}

impl GatewayAuthConfigBuilder {
    /// Set the PAM service name.
    #[must_use]
    pub fn pam_service(mut self, service: impl Into<String>) -> Self {
        self.config.pam_service = service.into();
        self
    }

    /// Set the backend timeout.
    #[must_use]
    pub const fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.config.backend_timeout = timeout;
        self
    }

    /// Set the form login whitelist.
    #[must_use]
    pub fn form_login_whitelist(mut self, policy: WhitelistPolicy) -> Self {
        self.config.form_login_whitelist = policy;
        self
    }

    /// Set the key management whitelist.
    #[must_use]
    pub fn key_management_whitelist(mut self, policy: WhitelistPolicy) -> Self {
        self.config.key_management_whitelist = policy;
        self
    }

    /// Build the config.
    ///
    /// # Errors
    ///
    /// Returns error if the service name is empty or the timeout is zero.
    pub fn build(self) -> Result<GatewayAuthConfig, AuthError> {
        if self.config.pam_service.trim().is_empty() {
            return Err(AuthError::Config("PAM service name cannot be empty".to_string()));
        }
        if self.config.backend_timeout.is_zero() {
            return Err(AuthError::Config("Backend timeout cannot be 0".to_string()));
        }
        Ok(self.config)
    }
}
