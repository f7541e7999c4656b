//! Mapping from roles to authority grants.

use std::collections::{BTreeSet, HashMap};

use pamgate_core::{AuthorityGrant, Role};

/// Turns matched roles into capability grants.
///
/// Implementations must be total and pure: the same roles always yield the
/// same grants, and no input is an error.
pub trait AuthorityMapper: Send + Sync {
    /// Grants for a set of roles.
    fn grants_for(&self, roles: &BTreeSet<Role>) -> BTreeSet<AuthorityGrant>;
}

/// Grants one `ROLE_<NAME>` authority per role, plus any extra permissions
/// registered for that role.
#[derive(Debug, Clone, Default)]
pub struct RoleAuthorityMapper {
    permissions: HashMap<Role, BTreeSet<AuthorityGrant>>,
}

impl RoleAuthorityMapper {
    /// Create a mapper that grants role authorities only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add permissions granted to holders of `role`.
    #[must_use]
    pub fn with_permissions<I, S>(mut self, role: Role, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .entry(role)
            .or_default()
            .extend(permissions.into_iter().map(AuthorityGrant::new));
        self
    }
}

impl AuthorityMapper for RoleAuthorityMapper {
    fn grants_for(&self, roles: &BTreeSet<Role>) -> BTreeSet<AuthorityGrant> {
        roles
            .iter()
            .flat_map(|role| {
                let extra = self.permissions.get(role).into_iter().flatten().cloned();
                std::iter::once(AuthorityGrant::for_role(*role)).chain(extra)
            })
            .collect()
    }
}
