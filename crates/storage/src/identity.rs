//! Durable identity storage.
//!
//! [`IdentityStore`] is the source of truth behind the identity cache.
//! Production deployments back it with a relational database; the
//! [`MemoryIdentityStore`] double serves tests and local runs.
//!
//! # Usage
//!
//! ```no_run
//! use gatehouse_storage::{IdentityId, IdentityStore, StorageResult};
//!
//! async fn username<S: IdentityStore>(store: &S, id: IdentityId) -> StorageResult<String> {
//!     Ok(store.get_identity_by_id(id).await?.username)
//! }
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    types::{Identity, IdentityId, Invitation},
};

/// Persistence layer for identities.
///
/// # Error Handling
///
/// Lookups return [`StorageError::NotFound`] when no identity matches.
/// Implementations map transport failures to [`StorageError::Connection`]
/// or [`StorageError::Internal`] and must not retry internally.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetches an identity by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no identity has this id.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_identity_by_id(&self, id: IdentityId) -> StorageResult<Identity>;

    /// Fetches an identity by contact address.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no identity has this address.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_identity_by_email(&self, email: &str) -> StorageResult<Identity>;

    /// Stores a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the id or the email is taken.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn create_identity(&self, identity: &Identity) -> StorageResult<()>;

    /// Stores a registrant under the next free id, inactive, together with
    /// the invitation that activates it. Both writes land or neither does.
    ///
    /// The `id` and `is_active` of `identity` are ignored. Returns the
    /// identity as stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the email or the username is
    /// taken.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn create_and_invite(
        &self,
        identity: Identity,
        invitation: &Invitation,
    ) -> StorageResult<Identity>;

    /// Redeems the invitation whose token digest is `token_hash`: the
    /// identity becomes active and all of its invitations are consumed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no invitation has this digest or
    /// it expired at `now`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> StorageResult<Identity>;
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<IdentityId, Identity>,
    email_index: HashMap<String, IdentityId>,
    invitations: HashMap<String, (IdentityId, DateTime<Utc>)>,
}

/// In-memory implementation of [`IdentityStore`].
///
/// Clones share state. Every id lookup increments an access counter so
/// tests can observe whether a read reached the store or was served by a
/// cache.
#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    tables: Arc<RwLock<Tables>>,
    id_reads: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIdentityStore")
            .field("identities", &self.tables.read().by_id.len())
            .field("id_reads", &self.id_reads())
            .finish()
    }
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`IdentityStore::get_identity_by_id`] calls served so far.
    #[must_use]
    pub fn id_reads(&self) -> u64 {
        self.id_reads.load(Ordering::Acquire)
    }

    /// Removes an identity, returning it if present.
    ///
    /// Callers that front this store with a cache must invalidate the
    /// cached entry themselves.
    pub fn remove(&self, id: IdentityId) -> Option<Identity> {
        let mut tables = self.tables.write();
        let removed = tables.by_id.remove(&id)?;
        tables.email_index.remove(&removed.email);
        Some(removed)
    }

    /// Replaces a stored identity in place (role change, activation).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the identity does not exist.
    pub fn replace(&self, identity: Identity) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let previous_email = match tables.by_id.get(&identity.id) {
            Some(existing) => existing.email.clone(),
            None => return Err(StorageError::not_found("identity", identity.id)),
        };
        tables.email_index.remove(&previous_email);
        tables.email_index.insert(identity.email.clone(), identity.id);
        tables.by_id.insert(identity.id, identity);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    #[tracing::instrument(skip(self), fields(identity_id = %id))]
    async fn get_identity_by_id(&self, id: IdentityId) -> StorageResult<Identity> {
        fail_point!("identity-store-get", |_| {
            Err(StorageError::connection("injected identity store failure"))
        });
        self.id_reads.fetch_add(1, Ordering::AcqRel);
        self.tables.read().by_id.get(&id).cloned().ok_or_else(|| StorageError::not_found("identity", id))
    }

    #[tracing::instrument(skip(self, email))]
    async fn get_identity_by_email(&self, email: &str) -> StorageResult<Identity> {
        let tables = self.tables.read();
        tables
            .email_index
            .get(email)
            .and_then(|id| tables.by_id.get(id))
            .cloned()
            .ok_or_else(|| StorageError::not_found("identity", email))
    }

    #[tracing::instrument(skip(self, identity), fields(identity_id = %identity.id))]
    async fn create_identity(&self, identity: &Identity) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.by_id.contains_key(&identity.id) {
            return Err(StorageError::conflict(format!("identity {} already exists", identity.id)));
        }
        if tables.email_index.contains_key(&identity.email) {
            return Err(StorageError::conflict("email already registered"));
        }
        tables.email_index.insert(identity.email.clone(), identity.id);
        tables.by_id.insert(identity.id, identity.clone());
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(username = %identity.username))]
    async fn create_and_invite(
        &self,
        mut identity: Identity,
        invitation: &Invitation,
    ) -> StorageResult<Identity> {
        fail_point!("identity-store-invite", |_| {
            Err(StorageError::connection("injected identity store failure"))
        });
        let mut tables = self.tables.write();
        if tables.email_index.contains_key(&identity.email) {
            return Err(StorageError::conflict("email already registered"));
        }
        if tables.by_id.values().any(|existing| existing.username == identity.username) {
            return Err(StorageError::conflict("username already taken"));
        }
        let next = tables.by_id.keys().map(|id| id.0).max().unwrap_or(0) + 1;
        identity.id = IdentityId(next);
        identity.is_active = false;
        tables.email_index.insert(identity.email.clone(), identity.id);
        tables.by_id.insert(identity.id, identity.clone());
        tables.invitations.insert(invitation.token_hash.clone(), (identity.id, invitation.expires_at));
        Ok(identity)
    }

    #[tracing::instrument(skip_all)]
    async fn activate(&self, token_hash: &str, now: DateTime<Utc>) -> StorageResult<Identity> {
        let mut tables = self.tables.write();
        let id = match tables.invitations.get(token_hash) {
            Some(&(id, expires_at)) if now < expires_at => id,
            Some(_) => {
                tables.invitations.remove(token_hash);
                return Err(StorageError::not_found("invitation", "expired"));
            }
            None => return Err(StorageError::not_found("invitation", "unknown")),
        };
        let identity = tables
            .by_id
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("identity", id))?;
        identity.is_active = true;
        let activated = identity.clone();
        tables.invitations.retain(|_, (invited, _)| *invited != id);
        Ok(activated)
    }
}
