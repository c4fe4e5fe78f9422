//! Collaborator abstractions for the gatehouse request gate.
//!
//! The gate resolves callers through three collaborators that live outside
//! the process in production: a durable identity store, a role catalog and
//! a shared identity cache. This crate defines their traits, the records
//! they exchange, and in-memory implementations for tests and local runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Request gate (server)                      │
//! │   rate check → token verify → identity resolve → authorize  │
//! ├─────────────────────────────────────────────────────────────┤
//! │        IdentityResolver         │       RoleAuthorizer       │
//! ├───────────────┬─────────────────┼────────────────────────────┤
//! │ IdentityCache │  IdentityStore  │        RoleCatalog         │
//! ├───────────────┼─────────────────┼────────────────────────────┤
//! │ MemoryIdentity│ MemoryIdentity  │     MemoryRoleCatalog      │
//! │ Cache (moka)  │ Store           │                            │
//! └───────────────┴─────────────────┴────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use gatehouse_storage::{
//!     Identity, IdentityId, IdentityStore, MemoryIdentityStore, MemoryRoleCatalog, RoleCatalog,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roles = MemoryRoleCatalog::with_default_roles();
//!     let store = MemoryIdentityStore::new();
//!
//!     let identity = Identity::builder()
//!         .id(IdentityId(1))
//!         .username("ada")
//!         .email("ada@example.com")
//!         .role(roles.get_role_by_name("user").await?)
//!         .build();
//!     store.create_identity(&identity).await?;
//!
//!     assert_eq!(store.get_identity_by_id(IdentityId(1)).await?.username, "ada");
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Implementations map their
//! internal failures to [`StorageError`] variants; [`with_deadline`] turns a
//! stalled call into [`StorageError::Timeout`].
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (identity factories, a failure-injecting cache,
//!   assertion macros).
//! - **`failpoints`**: Activates `fail` crate injection points in the in-memory collaborators.

#![deny(unsafe_code)]

pub mod cache;
pub mod deadline;
pub mod error;
pub mod identity;
pub mod role;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use cache::{IdentityCache, IdentityCacheConfig, MemoryIdentityCache};
pub use deadline::{DEFAULT_IO_TIMEOUT, with_deadline};
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use identity::{IdentityStore, MemoryIdentityStore};
pub use role::{MemoryRoleCatalog, ROLE_ADMIN, ROLE_MODERATOR, ROLE_USER, RoleCatalog};
pub use types::{Identity, IdentityId, Invitation, Role, RoleId};
