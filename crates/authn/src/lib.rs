//! # Gatehouse authentication
//!
//! Identity checks for the gatehouse request gate.
//!
//! This crate provides:
//! - **Bearer tokens**: HS256 issuance and verification with explicit time bounds
//! - **Header parsing**: `Authorization: Bearer` and `Authorization: Basic`
//! - **Passwords**: Argon2 hashing and email/password login
//! - **Activation**: hashed one-time tokens for new registrations
//! - **Identity resolution**: cache-aside lookup with an explicit failure policy
//! - **Authorization**: resource ownership, then role precedence
//!
//! ## Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use gatehouse_authn::{IdentityResolver, RoleAuthorizer, TokenAuthenticator, bearer_token};
//! use gatehouse_storage::{
//!     Identity, IdentityId, IdentityStore, MemoryIdentityCache, MemoryIdentityStore,
//!     MemoryRoleCatalog, RoleCatalog,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let roles = MemoryRoleCatalog::with_default_roles();
//! let store = MemoryIdentityStore::new();
//! store
//!     .create_identity(
//!         &Identity::builder()
//!             .id(IdentityId(1))
//!             .username("ada")
//!             .email("ada@example.com")
//!             .role(roles.get_role_by_name("moderator").await?)
//!             .build(),
//!     )
//!     .await?;
//!
//! let tokens = TokenAuthenticator::new(b"not-a-real-secret", "gatehouse");
//! let token = tokens.issue(&tokens.claims_for(IdentityId(1), Duration::from_secs(60)))?;
//!
//! let resolver = IdentityResolver::builder()
//!     .store(Arc::new(store))
//!     .cache(Arc::new(MemoryIdentityCache::default()))
//!     .build();
//! let authorizer = RoleAuthorizer::new(Arc::new(roles));
//!
//! let header = format!("Bearer {token}");
//! let claims = tokens.verify(bearer_token(Some(&header))?)?;
//! let caller = resolver.resolve(claims.sub).await?;
//! assert!(authorizer.authorize(&caller, IdentityId(2), "moderator").await?);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Ownership and role-precedence authorization.
pub mod authorize;
/// `Authorization` header parsing.
pub mod credentials;
/// Authentication error types.
pub mod error;
/// Activation tokens for new registrations.
pub mod invitation;
/// Bearer token issuance and verification.
pub mod jwt;
/// Password hashing and login.
pub mod password;
/// Cache-aside identity resolution.
pub mod resolver;
/// Test helpers (tokens, attack payloads, assertion macros).
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

// Re-export key types for convenience
pub use authorize::RoleAuthorizer;
pub use credentials::{BASIC_REALM, BasicCredentials, bearer_token};
pub use error::{AuthError, Result};
pub use invitation::{
    DEFAULT_INVITATION_TTL, IssuedInvitation, hash_invitation_token, issue_invitation,
};
pub use jwt::{Claims, DEFAULT_TOKEN_TTL, TokenAuthenticator};
pub use password::{hash_password, login, verify_password};
pub use resolver::{CacheFillPolicy, IdentityResolver};
