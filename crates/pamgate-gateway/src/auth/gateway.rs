//! The authentication decision procedure.
//!
//! One attempt runs through these steps, stopping at the first denial:
//!
//! 1. only username/password requests are handled;
//! 2. the origin address must be permitted by the gateway's whitelist, and
//!    the identity backend is never contacted otherwise;
//! 3. the backend authenticates the credentials inside a scoped session,
//!    bounded by a timeout;
//! 4. the backend's groups are matched against the role table, and at least
//!    one role must match;
//! 5. the matched roles are turned into grants.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use pamgate_core::secrets::{COMMON_SECRET_PATTERNS, scrub_secrets};
use pamgate_core::{Role, RoleGroupTable, Secret};

use super::authority::AuthorityMapper;
use super::backend::{self, BackendFailure, ExternalIdentity, IdentityBackend};
use super::config::{DEFAULT_BACKEND_TIMEOUT, GatewayAuthConfig};
use super::outcome::{AuthenticationOutcome, AuthenticationRequest, DenialKind, Granted};
use super::whitelist::WhitelistPolicy;

/// Authentication gateway bound to one whitelist policy.
///
/// Cloning is cheap; clones share the backend and mapper.
#[derive(Clone)]
pub struct AuthenticationGateway {
    name: &'static str,
    policy: Arc<WhitelistPolicy>,
    table: &'static RoleGroupTable,
    backend: Arc<dyn IdentityBackend>,
    mapper: Arc<dyn AuthorityMapper>,
    backend_timeout: Duration,
}

impl AuthenticationGateway {
    /// Create a gateway with an explicit policy.
    #[must_use]
    pub fn new(
        name: &'static str,
        policy: WhitelistPolicy,
        backend: Arc<dyn IdentityBackend>,
        mapper: Arc<dyn AuthorityMapper>,
    ) -> Self {
        Self {
            name,
            policy: Arc::new(policy),
            table: RoleGroupTable::global(),
            backend,
            mapper,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Gateway for the interactive login: every address may attempt.
    #[must_use]
    pub fn form_login(backend: Arc<dyn IdentityBackend>, mapper: Arc<dyn AuthorityMapper>) -> Self {
        Self::new("form-login", WhitelistPolicy::unrestricted(), backend, mapper)
    }

    /// Gateway for the privileged key management entry point.
    #[must_use]
    pub fn key_management(
        policy: WhitelistPolicy,
        backend: Arc<dyn IdentityBackend>,
        mapper: Arc<dyn AuthorityMapper>,
    ) -> Self {
        Self::new("key-management", policy, backend, mapper)
    }

    /// Set the upper bound for one backend round trip.
    #[must_use]
    pub const fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Gateway name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The whitelist this gateway enforces.
    #[must_use]
    pub fn policy(&self) -> &WhitelistPolicy {
        &self.policy
    }

    /// Decide one authentication attempt.
    pub async fn authenticate(
        &self,
        request: AuthenticationRequest,
        origin: IpAddr,
    ) -> AuthenticationOutcome {
        let (principal, secret) = match request {
            AuthenticationRequest::UsernamePassword { principal, secret } => (principal, secret),
            other => {
                tracing::debug!(gateway = self.name, kind = other.kind(), "Unsupported request type");
                return AuthenticationOutcome::denied(
                    DenialKind::UnsupportedRequestType,
                    format!("{} requests are not supported", other.kind()),
                );
            }
        };

        if !self.policy.permits(origin) {
            tracing::warn!(
                gateway = self.name,
                %origin,
                username = %principal,
                "Authentication attempt from non-whitelisted address"
            );
            return AuthenticationOutcome::denied(
                DenialKind::NetworkNotWhitelisted,
                format!("{origin} is not whitelisted"),
            );
        }

        let identity = match self.authenticate_with_backend(&principal, &secret).await {
            Ok(identity) => identity,
            Err((kind, detail)) => {
                let detail = scrub_secrets(&detail, COMMON_SECRET_PATTERNS);
                if kind.is_transient() {
                    tracing::warn!(gateway = self.name, %origin, username = %principal, %detail, "Identity backend unavailable");
                } else {
                    tracing::debug!(gateway = self.name, %origin, username = %principal, %detail, "Invalid credentials");
                }
                return AuthenticationOutcome::denied(kind, detail);
            }
        };

        let roles = self.match_roles(&identity);
        if roles.is_empty() {
            tracing::warn!(
                gateway = self.name,
                %origin,
                username = %identity.username,
                required = ?self.table.group_names().collect::<BTreeSet<_>>(),
                "User has none of the required groups"
            );
            return AuthenticationOutcome::denied(
                DenialKind::NoAuthorizedRoles,
                format!("user {} has none of the required groups", identity.username),
            );
        }

        let grants = self.mapper.grants_for(&roles);
        tracing::info!(
            gateway = self.name,
            %origin,
            username = %identity.username,
            roles = ?roles,
            "Authentication granted"
        );

        AuthenticationOutcome::Granted(Granted {
            username: identity.username,
            credential: secret,
            grants,
        })
    }

    /// Run the backend step on the blocking pool, bounded by the timeout.
    ///
    /// The session lives entirely inside the blocking task. If the timeout
    /// fires first the task still finishes on its own and releases it.
    async fn authenticate_with_backend(
        &self,
        principal: &str,
        secret: &Secret,
    ) -> Result<ExternalIdentity, (DenialKind, String)> {
        let backend = Arc::clone(&self.backend);
        let principal = principal.to_owned();
        let secret = secret.clone();

        let task = tokio::task::spawn_blocking(move || {
            backend::authenticate_scoped(backend.as_ref(), &principal, &secret)
        });

        match tokio::time::timeout(self.backend_timeout, task).await {
            Ok(Ok(Ok(identity))) => Ok(identity),
            Ok(Ok(Err(BackendFailure::Unavailable(detail)))) => {
                Err((DenialKind::BackendUnavailable, detail))
            }
            Ok(Ok(Err(BackendFailure::Rejected(detail)))) => {
                Err((DenialKind::InvalidCredentials, detail))
            }
            Ok(Err(join_error)) => Err((
                DenialKind::BackendUnavailable,
                format!("Identity backend failed: {join_error}"),
            )),
            Err(_) => Err((
                DenialKind::BackendUnavailable,
                format!(
                    "Identity backend did not answer within {} ms",
                    self.backend_timeout.as_millis()
                ),
            )),
        }
    }

    fn match_roles(&self, identity: &ExternalIdentity) -> BTreeSet<Role> {
        self.table
            .roles_for_groups(identity.groups.iter().map(String::as_str))
    }
}

impl std::fmt::Debug for AuthenticationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGateway")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("backend", &self.backend.name())
            .field("backend_timeout", &self.backend_timeout)
            .finish_non_exhaustive()
    }
}

/// The two standard gateways, sharing one backend and mapper.
#[derive(Debug, Clone)]
pub struct AuthGateways {
    /// Interactive login.
    pub form_login: AuthenticationGateway,
    /// Key management entry point.
    pub key_management: AuthenticationGateway,
}

impl AuthGateways {
    /// Build both gateways from configuration.
    #[must_use]
    pub fn build(
        config: &GatewayAuthConfig,
        backend: Arc<dyn IdentityBackend>,
        mapper: Arc<dyn AuthorityMapper>,
    ) -> Self {
        let form_login = AuthenticationGateway::new(
            "form-login",
            config.form_login_whitelist.clone(),
            Arc::clone(&backend),
            Arc::clone(&mapper),
        )
        .with_backend_timeout(config.backend_timeout);

        let key_management = AuthenticationGateway::key_management(
            config.key_management_whitelist.clone(),
            backend,
            mapper,
        )
        .with_backend_timeout(config.backend_timeout);

        Self {
            form_login,
            key_management,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authority::RoleAuthorityMapper;
    use crate::auth::testing::{Account, ScriptedBackend};
    use pamgate_core::AuthorityGrant;
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn login(principal: &str, secret: &str) -> AuthenticationRequest {
        AuthenticationRequest::username_password(principal, secret)
    }

    fn directory() -> ScriptedBackend {
        ScriptedBackend::new()
            .with_account(Account::new(
                "alice",
                "correct",
                ["xroad-security-officer", "other-group"],
            ))
            .with_account(Account::new("carol", "correct", ["unrelated"]))
            .with_account(Account::new(
                "bob",
                "hunter2",
                ["xroad-system-administrator", "xroad-service-administrator"],
            ))
    }

    fn gateway(policy: WhitelistPolicy, backend: ScriptedBackend) -> AuthenticationGateway {
        AuthenticationGateway::new(
            "test",
            policy,
            Arc::new(backend),
            Arc::new(RoleAuthorityMapper::new()),
        )
    }

    #[tokio::test]
    async fn test_non_whitelisted_origin_never_reaches_backend() {
        let backend = directory();
        let counters = backend.counters();
        let policy = WhitelistPolicy::from_entries(["10.0.0.0/8"]).unwrap();
        let gateway = gateway(policy, backend);

        for request in [login("alice", "correct"), login("alice", "wrong")] {
            let outcome = gateway.authenticate(request, ip("192.168.1.5")).await;
            assert_eq!(outcome.denial_kind(), Some(DenialKind::NetworkNotWhitelisted));
        }

        assert_eq!(counters.opens(), 0);
        assert_eq!(counters.authenticates(), 0);
        assert_eq!(counters.releases(), 0);
    }

    #[tokio::test]
    async fn test_granted_with_mapped_roles() {
        let backend = directory();
        let counters = backend.counters();
        let mapper = RoleAuthorityMapper::new();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(login("alice", "correct"), ip("192.168.1.5"))
            .await;
        let granted = outcome.into_result().unwrap();

        assert_eq!(granted.username, "alice");
        assert_eq!(granted.credential.expose(), "correct");
        assert_eq!(
            granted.grants,
            mapper.grants_for(&BTreeSet::from([Role::SecurityOfficer]))
        );
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn test_grants_are_exactly_mapper_output() {
        let mapper = RoleAuthorityMapper::new()
            .with_permissions(Role::SystemAdministrator, ["BACKUP_CONFIGURATION"]);
        let gateway = AuthenticationGateway::new(
            "test",
            WhitelistPolicy::unrestricted(),
            Arc::new(directory()),
            Arc::new(mapper.clone()),
        );

        let granted = gateway
            .authenticate(login("bob", "hunter2"), ip("::1"))
            .await
            .into_result()
            .unwrap();

        let roles = BTreeSet::from([Role::ServiceAdministrator, Role::SystemAdministrator]);
        assert_eq!(granted.grants, mapper.grants_for(&roles));
        assert!(granted.grants.contains(&AuthorityGrant::new("BACKUP_CONFIGURATION")));
    }

    #[tokio::test]
    async fn test_canonical_username_is_reported() {
        let backend = ScriptedBackend::new().with_account(
            Account::new("ALICE", "correct", ["xroad-security-officer"]).canonical("alice"),
        );
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let granted = gateway
            .authenticate(login("ALICE", "correct"), ip("10.0.0.1"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(granted.username, "alice");
    }

    #[tokio::test]
    async fn test_no_matching_groups_is_denied() {
        let backend = directory();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(login("carol", "correct"), ip("10.0.0.1"))
            .await;

        assert!(!outcome.is_granted());
        assert_eq!(outcome.denial_kind(), Some(DenialKind::NoAuthorizedRoles));
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn test_backend_outage() {
        let backend = directory().failing_open();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(login("alice", "correct"), ip("10.0.0.1"))
            .await;

        assert_eq!(outcome.denial_kind(), Some(DenialKind::BackendUnavailable));
        assert_eq!(counters.authenticates(), 0);
        assert_eq!(counters.releases(), 0);
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let backend = directory();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(login("alice", "wrong"), ip("10.0.0.1"))
            .await;
        assert_eq!(outcome.denial_kind(), Some(DenialKind::InvalidCredentials));

        let outcome = gateway
            .authenticate(login("mallory", "anything"), ip("10.0.0.1"))
            .await;
        assert_eq!(outcome.denial_kind(), Some(DenialKind::InvalidCredentials));

        assert_eq!(counters.opens(), 2);
        assert_eq!(counters.releases(), 2);
    }

    #[tokio::test]
    async fn test_release_failure_keeps_grant() {
        let backend = directory().failing_release();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let granted = gateway
            .authenticate(login("alice", "correct"), ip("10.0.0.1"))
            .await
            .into_result()
            .unwrap();

        assert_eq!(granted.username, "alice");
        assert!(granted.grants.contains(&AuthorityGrant::for_role(Role::SecurityOfficer)));
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn test_release_failure_keeps_invalid_credentials() {
        let backend = directory().failing_release();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(login("alice", "wrong"), ip("10.0.0.1"))
            .await;

        assert_eq!(outcome.denial_kind(), Some(DenialKind::InvalidCredentials));
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn test_backend_panic_is_unavailable_and_released() {
        let backend = directory().panicking();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(login("alice", "correct"), ip("10.0.0.1"))
            .await;

        assert_eq!(outcome.denial_kind(), Some(DenialKind::BackendUnavailable));
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn test_backend_timeout() {
        let backend = directory().with_delay(Duration::from_millis(300));
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend)
            .with_backend_timeout(Duration::from_millis(20));

        let outcome = gateway
            .authenticate(login("alice", "correct"), ip("10.0.0.1"))
            .await;
        assert_eq!(outcome.denial_kind(), Some(DenialKind::BackendUnavailable));

        // The abandoned session is still released once the backend returns.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counters.releases() == 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_request_type() {
        let backend = directory();
        let counters = backend.counters();
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let outcome = gateway
            .authenticate(
                AuthenticationRequest::BearerToken(Secret::from("eyJhbGciOi")),
                ip("10.0.0.1"),
            )
            .await;

        assert_eq!(outcome.denial_kind(), Some(DenialKind::UnsupportedRequestType));
        assert_eq!(counters.opens(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_attempts_are_independent() {
        let backend = directory().with_delay(Duration::from_millis(20));
        let gateway = gateway(WhitelistPolicy::unrestricted(), backend);

        let alice = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .authenticate(login("alice", "correct"), ip("10.0.0.1"))
                    .await
            })
        };
        let bob = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .authenticate(login("bob", "hunter2"), ip("10.0.0.2"))
                    .await
            })
        };

        let alice = alice.await.unwrap().into_result().unwrap();
        let bob = bob.await.unwrap().into_result().unwrap();

        assert_eq!(
            alice.grants,
            BTreeSet::from([AuthorityGrant::for_role(Role::SecurityOfficer)])
        );
        assert_eq!(
            bob.grants,
            BTreeSet::from([
                AuthorityGrant::for_role(Role::ServiceAdministrator),
                AuthorityGrant::for_role(Role::SystemAdministrator),
            ])
        );
    }

    #[tokio::test]
    async fn test_standard_gateways_from_config() {
        let config = GatewayAuthConfig::default();
        let backend = directory();
        let counters = backend.counters();
        let gateways = AuthGateways::build(
            &config,
            Arc::new(backend),
            Arc::new(RoleAuthorityMapper::new()),
        );

        assert_eq!(gateways.form_login.name(), "form-login");
        assert_eq!(gateways.key_management.name(), "key-management");

        let remote = ip("203.0.113.9");
        let outcome = gateways
            .form_login
            .authenticate(login("alice", "correct"), remote)
            .await;
        assert!(outcome.is_granted());

        let outcome = gateways
            .key_management
            .authenticate(login("alice", "correct"), remote)
            .await;
        assert_eq!(outcome.denial_kind(), Some(DenialKind::NetworkNotWhitelisted));

        let outcome = gateways
            .key_management
            .authenticate(login("alice", "correct"), ip("::ffff:127.0.0.1"))
            .await;
        assert!(outcome.is_granted());

        assert_eq!(counters.opens(), 2);
        assert_eq!(counters.releases(), 2);
    }

    #[tokio::test]
    async fn test_form_login_constructor_is_unrestricted() {
        let gateway = AuthenticationGateway::form_login(
            Arc::new(directory()),
            Arc::new(RoleAuthorityMapper::new()),
        );
        assert!(gateway.policy().is_unrestricted());
    }
}
