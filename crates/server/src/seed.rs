//! Demo data for local runs.

use gatehouse_authn::hash_password;
use gatehouse_storage::{Identity, IdentityId, IdentityStore, RoleCatalog, StorageError};
use thiserror::Error;

use crate::resources::{NewPost, PostStore};

/// Demo accounts: one per default role.
pub const DEMO_USERS: [(&str, &str); 3] =
    [("alice", "user"), ("bob", "moderator"), ("carol", "admin")];

/// Errors raised while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    /// A collaborator rejected a write.
    #[error("failed to seed demo data")]
    Storage(#[from] StorageError),
    /// The demo password could not be hashed.
    #[error("failed to hash demo password")]
    Password(#[from] gatehouse_authn::AuthError),
}

/// Creates the [`DEMO_USERS`] with `password` and one post each.
///
/// Emails are `<name>@example.com`. Returns the created identities.
///
/// # Errors
///
/// Returns [`SeedError`] if a role is missing or a write conflicts.
pub async fn seed_demo(
    identities: &dyn IdentityStore,
    roles: &dyn RoleCatalog,
    posts: &dyn PostStore,
    password: &str,
) -> Result<Vec<Identity>, SeedError> {
    let password_hash = hash_password(password)?;
    let mut created = Vec::with_capacity(DEMO_USERS.len());

    for (id, (name, role)) in (1_i64..).zip(DEMO_USERS) {
        let identity = Identity::builder()
            .id(IdentityId(id))
            .username(name)
            .email(format!("{name}@example.com"))
            .password_hash(password_hash.as_str())
            .role(roles.get_role_by_name(role).await?)
            .build();
        identities.create_identity(&identity).await?;
        posts
            .create_post(NewPost {
                user_id: identity.id,
                title: format!("Hello from {name}"),
                content: format!("{name} holds the {role} role."),
                tags: vec!["demo".to_owned()],
            })
            .await?;
        tracing::info!(identity_id = %identity.id, username = name, role, "seeded demo identity");
        created.push(identity);
    }
    Ok(created)
}
