//! Internal roles and their mapping to identity-backend groups.
//!
//! Every [`Role`] corresponds to exactly one backend group name and no two
//! roles share a group. The [`RoleGroupTable`] is built once from
//! [`Role::ALL`] and is read-only afterwards, so it can be shared freely
//! between concurrent authentication attempts.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing an unknown role name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Internal application role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Manages keys, certificates and security settings.
    #[serde(rename = "XROAD_SECURITY_OFFICER")]
    SecurityOfficer,
    /// Registers members and subsystems.
    #[serde(rename = "XROAD_REGISTRATION_OFFICER")]
    RegistrationOfficer,
    /// Manages services and access rights.
    #[serde(rename = "XROAD_SERVICE_ADMINISTRATOR")]
    ServiceAdministrator,
    /// Manages system-level settings and backups.
    #[serde(rename = "XROAD_SYSTEM_ADMINISTRATOR")]
    SystemAdministrator,
    /// Read-only access to the security server.
    #[serde(rename = "XROAD_SECURITYSERVER_OBSERVER")]
    SecurityServerObserver,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::SecurityOfficer,
        Self::RegistrationOfficer,
        Self::ServiceAdministrator,
        Self::SystemAdministrator,
        Self::SecurityServerObserver,
    ];

    /// Canonical role name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SecurityOfficer => "XROAD_SECURITY_OFFICER",
            Self::RegistrationOfficer => "XROAD_REGISTRATION_OFFICER",
            Self::ServiceAdministrator => "XROAD_SERVICE_ADMINISTRATOR",
            Self::SystemAdministrator => "XROAD_SYSTEM_ADMINISTRATOR",
            Self::SecurityServerObserver => "XROAD_SECURITYSERVER_OBSERVER",
        }
    }

    /// Backend group whose members hold this role.
    #[must_use]
    pub const fn group_name(self) -> &'static str {
        match self {
            Self::SecurityOfficer => "xroad-security-officer",
            Self::RegistrationOfficer => "xroad-registration-officer",
            Self::ServiceAdministrator => "xroad-service-administrator",
            Self::SystemAdministrator => "xroad-system-administrator",
            Self::SecurityServerObserver => "xroad-securityserver-observer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Opaque capability token consumed by downstream authorization checks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityGrant(String);

impl AuthorityGrant {
    /// Prefix used for grants derived directly from a role.
    pub const ROLE_PREFIX: &'static str = "ROLE_";

    /// Create a grant from an arbitrary token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The grant representing membership in `role`.
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        Self(format!("{}{}", Self::ROLE_PREFIX, role.name()))
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorityGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AuthorityGrant {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

static GLOBAL_TABLE: LazyLock<RoleGroupTable> = LazyLock::new(RoleGroupTable::build);

/// Bidirectional lookup between roles and backend group names.
#[derive(Debug)]
pub struct RoleGroupTable {
    by_group: HashMap<&'static str, Role>,
}

impl RoleGroupTable {
    /// The process-wide table, built on first access.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_TABLE
    }

    fn build() -> Self {
        let by_group: HashMap<_, _> = Role::ALL
            .into_iter()
            .map(|role| (role.group_name(), role))
            .collect();

        // Two roles sharing a group would collapse into one entry here.
        debug_assert_eq!(by_group.len(), Role::ALL.len());

        tracing::debug!(roles = by_group.len(), "Built role/group mapping table");
        Self { by_group }
    }

    /// Group name for a role.
    #[must_use]
    pub const fn group_name_for(&self, role: Role) -> &'static str {
        role.group_name()
    }

    /// Role for a group name, if the group is mapped.
    ///
    /// Matching is exact; group names are case-sensitive on the backend.
    #[must_use]
    pub fn role_for_group_name(&self, name: &str) -> Option<Role> {
        self.by_group.get(name).copied()
    }

    /// Check whether a group name is mapped to any role.
    #[must_use]
    pub fn contains_group(&self, name: &str) -> bool {
        self.by_group.contains_key(name)
    }

    /// All mapped group names.
    pub fn group_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_group.keys().copied()
    }

    /// Number of mapped roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_group.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_group.is_empty()
    }

    /// Roles for every mapped group in `groups`; unmapped groups are ignored.
    pub fn roles_for_groups<'a, I>(&self, groups: I) -> BTreeSet<Role>
    where
        I: IntoIterator<Item = &'a str>,
    {
        groups
            .into_iter()
            .filter_map(|group| self.role_for_group_name(group))
            .collect()
    }
}
