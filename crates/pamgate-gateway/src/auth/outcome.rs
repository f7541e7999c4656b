//! Authentication requests and outcomes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pamgate_core::{AuthorityGrant, Secret};

/// Authentication request handed in by the web layer.
#[derive(Debug, Clone)]
pub enum AuthenticationRequest {
    /// Username and password.
    UsernamePassword {
        /// Principal as typed by the user.
        principal: String,
        /// Password.
        secret: Secret,
    },
    /// Bearer token from an `Authorization` header.
    BearerToken(Secret),
    /// API key.
    ApiKey(Secret),
}

impl AuthenticationRequest {
    /// Create a username/password request.
    #[must_use]
    pub fn username_password(principal: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self::UsernamePassword {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    /// Request kind for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UsernamePassword { .. } => "username_password",
            Self::BearerToken(_) => "bearer_token",
            Self::ApiKey(_) => "api_key",
        }
    }
}

/// Why an authentication attempt was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// Origin address is outside the configured ranges.
    #[error("Network not whitelisted")]
    NetworkNotWhitelisted,

    /// Identity backend could not be reached, failed, or timed out.
    #[error("Identity backend unavailable")]
    BackendUnavailable,

    /// Identity backend rejected the credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Credentials are valid but grant no role.
    #[error("No authorized roles")]
    NoAuthorizedRoles,

    /// Request is not a username/password request.
    #[error("Unsupported request type")]
    UnsupportedRequestType,
}

impl DenialKind {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NetworkNotWhitelisted => "network_not_whitelisted",
            Self::BackendUnavailable => "backend_unavailable",
            Self::InvalidCredentials => "invalid_credentials",
            Self::NoAuthorizedRoles => "no_authorized_roles",
            Self::UnsupportedRequestType => "unsupported_request_type",
        }
    }

    /// Check if retrying the same request later may succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::BackendUnavailable)
    }
}

/// A denied attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct Denial {
    /// Denial kind.
    pub kind: DenialKind,
    /// Human-readable detail, free of secrets.
    pub detail: String,
}

/// A granted attempt.
#[derive(Debug, Clone)]
pub struct Granted {
    /// Canonical username reported by the backend.
    pub username: String,
    /// The credential that was presented.
    pub credential: Secret,
    /// Capability grants for the session.
    pub grants: BTreeSet<AuthorityGrant>,
}

/// Result of one authentication attempt.
#[derive(Debug, Clone)]
pub enum AuthenticationOutcome {
    /// Access granted.
    Granted(Granted),
    /// Access denied.
    Denied(Denial),
}

impl AuthenticationOutcome {
    /// Create a denial.
    #[must_use]
    pub fn denied(kind: DenialKind, detail: impl Into<String>) -> Self {
        Self::Denied(Denial {
            kind,
            detail: detail.into(),
        })
    }

    /// Check if access was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// Denial kind, if denied.
    #[must_use]
    pub const fn denial_kind(&self) -> Option<DenialKind> {
        match self {
            Self::Granted(_) => None,
            Self::Denied(denial) => Some(denial.kind),
        }
    }

    /// Convert into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the denial if access was denied.
    pub fn into_result(self) -> Result<Granted, Denial> {
        match self {
            Self::Granted(granted) => Ok(granted),
            Self::Denied(denial) => Err(denial),
        }
    }
}
