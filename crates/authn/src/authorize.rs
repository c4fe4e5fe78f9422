//! Ownership and role-precedence authorization.

use std::{sync::Arc, time::Duration};

use gatehouse_storage::{DEFAULT_IO_TIMEOUT, Identity, IdentityId, RoleCatalog, with_deadline};

use crate::error::{AuthError, Result};

/// Decides whether a caller may act on a resource.
///
/// The owner of a resource may always act on it. Anyone else needs a role
/// whose level is at least the required role's level, so an elevated role
/// may act in place of the owner.
pub struct RoleAuthorizer {
    catalog: Arc<dyn RoleCatalog>,
    timeout: Duration,
}

impl std::fmt::Debug for RoleAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleAuthorizer").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

impl RoleAuthorizer {
    /// Creates an authorizer reading roles from `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn RoleCatalog>) -> Self {
        Self { catalog, timeout: DEFAULT_IO_TIMEOUT }
    }

    /// Sets the deadline for catalog reads.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` if `caller` may act on a resource owned by `owner`
    /// that otherwise requires `required_role`.
    ///
    /// Ownership is checked first and skips the catalog entirely.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RoleNotFound`] if `required_role` is not in the catalog
    /// - [`AuthError::Storage`] if the catalog read fails or times out
    #[tracing::instrument(
        skip(self, caller),
        fields(caller_id = %caller.id, caller_role = %caller.role.name)
    )]
    pub async fn authorize(
        &self,
        caller: &Identity,
        owner: IdentityId,
        required_role: &str,
    ) -> Result<bool> {
        if caller.id == owner {
            return Ok(true);
        }

        let required =
            with_deadline("role_catalog.get", self.timeout, self.catalog.get_role_by_name(required_role))
                .await
                .map_err(|err| {
                    if err.is_not_found() {
                        AuthError::role_not_found(required_role)
                    } else {
                        AuthError::storage(err)
                    }
                })?;

        let permitted = caller.role.outranks_or_equals(&required);
        if !permitted {
            tracing::debug!(
                caller_level = caller.role.level,
                required_level = required.level,
                "insufficient role"
            );
        }
        Ok(permitted)
    }
}
