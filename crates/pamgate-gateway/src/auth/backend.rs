//! Identity backend client.
//!
//! A backend hands out one [`BackendSession`] per authentication attempt.
//! Sessions are blocking, are not shared between attempts and must be
//! released exactly once; [`SessionGuard`] owns a session for the length of
//! one call and releases it when dropped, whichever way the call ends.

use std::collections::BTreeSet;

use thiserror::Error;

use pamgate_core::Secret;

/// Errors reported by an identity backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Backend could not be reached or initialized.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected the principal/secret pair.
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    /// Closing the session failed.
    #[error("Session release failed: {0}")]
    Release(String),
}

/// Identity reported by the backend after a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Canonical username as normalized by the backend.
    pub username: String,
    /// Group memberships reported by the backend.
    pub groups: BTreeSet<String>,
}

impl ExternalIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new<I, S>(username: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// One open handle to the identity backend.
///
/// Sessions are created and used on a single thread, so this trait does not
/// require `Send`.
pub trait BackendSession {
    /// Authenticate a principal/secret pair.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the credentials.
    fn authenticate(&mut self, principal: &str, secret: &Secret)
    -> Result<ExternalIdentity, BackendError>;

    /// Close the session.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to close the handle.
    fn release(&mut self) -> Result<(), BackendError>;
}

/// Source of backend sessions.
pub trait IdentityBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Open a new session.
    ///
    /// No credential is transmitted at this point.
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or misconfigured.
    fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError>;
}

/// Owns a session and releases it on drop.
///
/// There is no public release method: the only way to close the session is
/// to let the guard go out of scope, which happens exactly once.
pub struct SessionGuard {
    backend: String,
    session: Box<dyn BackendSession>,
}

impl SessionGuard {
    /// Open a session on `backend`.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be opened; nothing needs releasing
    /// in that case.
    pub fn acquire(backend: &dyn IdentityBackend) -> Result<Self, BackendError> {
        let session = backend.open_session()?;
        tracing::trace!(backend = backend.name(), "Opened backend session");
        Ok(Self {
            backend: backend.name().to_string(),
            session,
        })
    }

    /// Authenticate within this session.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the credentials.
    pub fn authenticate(
        &mut self,
        principal: &str,
        secret: &Secret,
    ) -> Result<ExternalIdentity, BackendError> {
        self.session.authenticate(principal, secret)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // A failed release never changes the outcome of the attempt.
        match self.session.release() {
            Ok(()) => tracing::trace!(backend = %self.backend, "Released backend session"),
            Err(e) => tracing::warn!(backend = %self.backend, error = %e, "Failed to release backend session"),
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// Why a scoped authentication failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    /// The session could not be opened.
    Unavailable(String),
    /// The session was opened but the credentials were rejected.
    Rejected(String),
}

/// Acquire a session, authenticate, and release the session.
///
/// The failure is classified by the step that failed, not by the error the
/// backend chose to report: anything going wrong after the session is open
/// counts as a rejection.
///
/// # Errors
///
/// Returns [`BackendFailure::Unavailable`] if the session cannot be opened and
/// [`BackendFailure::Rejected`] if authentication fails.
pub fn authenticate_scoped(
    backend: &dyn IdentityBackend,
    principal: &str,
    secret: &Secret,
) -> Result<ExternalIdentity, BackendFailure> {
    let mut session =
        SessionGuard::acquire(backend).map_err(|e| BackendFailure::Unavailable(e.to_string()))?;

    session
        .authenticate(principal, secret)
        .map_err(|e| BackendFailure::Rejected(e.to_string()))
}

/// Backend that is never available.
///
/// Stands in when no real identity backend is compiled in or configured.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    /// Create a backend that always fails with `reason`.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl IdentityBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        Err(BackendError::Unavailable(self.reason.clone()))
    }
}
