//! PAM identity backend.
//!
//! The process must be allowed to read the shadow database (usually by
//! running as a member of the `shadow` group). Group memberships are read
//! from the system user database after PAM accepts the credentials.

use std::ffi::CString;

use nix::unistd::{Group, User, getgrouplist};

use pamgate_core::Secret;

use super::AuthError;
use super::backend::{BackendError, BackendSession, ExternalIdentity, IdentityBackend};

/// Identity backend backed by a PAM service.
#[derive(Debug, Clone)]
pub struct PamBackend {
    service: String,
}

impl PamBackend {
    /// Create a backend for a PAM service name (e.g. `xroad`).
    ///
    /// # Errors
    ///
    /// Returns error if the service name is empty.
    pub fn new(service: impl Into<String>) -> Result<Self, AuthError> {
        let service = service.into();
        if service.trim().is_empty() {
            return Err(AuthError::Config("PAM service name cannot be empty".to_string()));
        }
        Ok(Self { service })
    }

    /// The PAM service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl IdentityBackend for PamBackend {
    fn name(&self) -> &str {
        "pam"
    }

    fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        let authenticator = pam::Authenticator::with_password(&self.service).map_err(|e| {
            BackendError::Unavailable(format!(
                "Could not initialize PAM service '{}': {e}",
                self.service
            ))
        })?;

        Ok(Box::new(PamSession {
            authenticator: Some(authenticator),
        }))
    }
}

struct PamSession {
    authenticator: Option<pam::Authenticator<'static, pam::PasswordConv>>,
}

impl BackendSession for PamSession {
    fn authenticate(
        &mut self,
        principal: &str,
        secret: &Secret,
    ) -> Result<ExternalIdentity, BackendError> {
        let authenticator = self
            .authenticator
            .as_mut()
            .ok_or_else(|| BackendError::Unavailable("PAM handle already closed".to_string()))?;

        authenticator
            .get_handler()
            .set_credentials(principal, secret.expose());
        authenticator
            .authenticate()
            .map_err(|e| BackendError::Rejected(format!("PAM authentication failed: {e}")))?;

        resolve_identity(principal)
    }

    fn release(&mut self) -> Result<(), BackendError> {
        // Dropping the authenticator ends the PAM transaction.
        drop(self.authenticator.take());
        Ok(())
    }
}

/// Look up the canonical user name and every group the user belongs to.
///
/// The lookup uses the principal as typed. A `PAM_USER` rewritten by a PAM
/// module is not consulted; the canonical name is the one stored in the
/// user database entry the principal resolves to.
fn resolve_identity(principal: &str) -> Result<ExternalIdentity, BackendError> {
    let user = User::from_name(principal)
        .map_err(|e| BackendError::Rejected(format!("User lookup failed: {e}")))?
        .ok_or_else(|| BackendError::Rejected(format!("Unknown user: {principal}")))?;

    let name = CString::new(user.name.as_str())
        .map_err(|_| BackendError::Rejected("User name contains a NUL byte".to_string()))?;
    let gids = getgrouplist(&name, user.gid)
        .map_err(|e| BackendError::Rejected(format!("Group lookup failed: {e}")))?;

    let groups = gids
        .into_iter()
        .filter_map(|gid| Group::from_gid(gid).ok().flatten())
        .map(|group| group.name);

    Ok(ExternalIdentity::new(user.name, groups))
}
