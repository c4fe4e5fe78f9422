//! Role catalog lookups.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    types::{Role, RoleId},
};

/// Name of the baseline role assigned at registration.
pub const ROLE_USER: &str = "user";
/// Name of the role allowed to edit other callers' content.
pub const ROLE_MODERATOR: &str = "moderator";
/// Name of the role allowed to delete other callers' content.
pub const ROLE_ADMIN: &str = "admin";

/// Read access to the role catalog.
#[async_trait]
pub trait RoleCatalog: Send + Sync {
    /// Fetches a role by its unique name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no role has this name.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_role_by_name(&self, name: &str) -> StorageResult<Role>;
}

/// In-memory [`RoleCatalog`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRoleCatalog {
    roles: Arc<RwLock<HashMap<String, Role>>>,
}

impl MemoryRoleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog seeded with `user` (1), `moderator` (2) and `admin` (3).
    #[must_use]
    pub fn with_default_roles() -> Self {
        let catalog = Self::new();
        for role in default_roles() {
            catalog.upsert(role);
        }
        catalog
    }

    /// Inserts or replaces a role, keyed by name.
    pub fn upsert(&self, role: Role) {
        self.roles.write().insert(role.name.clone(), role);
    }
}

/// The three roles every deployment starts with.
#[must_use]
pub fn default_roles() -> Vec<Role> {
    vec![
        Role::builder()
            .id(RoleId(1))
            .name(ROLE_USER)
            .level(1)
            .description("A user can create posts and comments")
            .build(),
        Role::builder()
            .id(RoleId(2))
            .name(ROLE_MODERATOR)
            .level(2)
            .description("A moderator can update other users' posts")
            .build(),
        Role::builder()
            .id(RoleId(3))
            .name(ROLE_ADMIN)
            .level(3)
            .description("An admin can update and delete other users' posts")
            .build(),
    ]
}

#[async_trait]
impl RoleCatalog for MemoryRoleCatalog {
    #[tracing::instrument(skip(self))]
    async fn get_role_by_name(&self, name: &str) -> StorageResult<Role> {
        fail_point!("role-catalog-get", |_| {
            Err(StorageError::connection("injected role catalog failure"))
        });
        self.roles.read().get(name).cloned().ok_or_else(|| StorageError::not_found("role", name))
    }
}
