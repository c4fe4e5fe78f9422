//! Cache-aside identity resolution.
//!
//! [`IdentityResolver`] maps a verified token subject to a full [`Identity`].
//! With a cache configured it reads the cache first and, on a miss, reads
//! the durable store and fills the cache with the result. Without one, every
//! call goes to the store.
//!
//! # Concurrency
//!
//! No per-key lock is held across the store read. Two concurrent misses for
//! the same id may both read the store and both fill the cache; the last
//! write wins and the store stays the source of truth.
//!
//! An invalidation generation guards against stale fills: a resolve that
//! read the store before an [`IdentityResolver::invalidate`] returns its
//! result to its caller but does not leave it in the cache.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use fail::fail_point;
use gatehouse_storage::{
    DEFAULT_IO_TIMEOUT, Identity, IdentityCache, IdentityId, IdentityStore, StorageError,
    with_deadline,
};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// How cache failures affect a resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFillPolicy {
    /// A failed cache read or fill fails the resolution, even when the store
    /// returned a valid identity. A broken cache is surfaced rather than
    /// silently bypassed.
    #[default]
    Strict,
    /// Cache failures are logged; reads fall through to the store and the
    /// store's result is served without a fill.
    BestEffort,
}

/// Resolves identities through an optional cache in front of the store.
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    cache: Option<Arc<dyn IdentityCache>>,
    fill_policy: CacheFillPolicy,
    timeout: Duration,
    invalidation_gen: AtomicU64,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("cache_enabled", &self.cache.is_some())
            .field("fill_policy", &self.fill_policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl IdentityResolver {
    /// Creates a resolver.
    ///
    /// Leaving `cache` unset disables caching. Each collaborator call runs
    /// under `timeout` (5 seconds by default).
    #[builder]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        cache: Option<Arc<dyn IdentityCache>>,
        #[builder(default)] fill_policy: CacheFillPolicy,
        #[builder(default = DEFAULT_IO_TIMEOUT)] timeout: Duration,
    ) -> Self {
        Self { store, cache, fill_policy, timeout, invalidation_gen: AtomicU64::new(0) }
    }

    /// Returns `true` when a cache sits in front of the store.
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns the cache, if one is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn IdentityCache>> {
        self.cache.as_ref()
    }

    /// Returns the cache failure policy.
    #[must_use]
    pub fn fill_policy(&self) -> CacheFillPolicy {
        self.fill_policy
    }

    /// Resolves `id` to an identity.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IdentityNotFound`] when the store has no such identity (never cached)
    /// - [`AuthError::Storage`] when the store fails or times out, or when the cache does under
    ///   [`CacheFillPolicy::Strict`]
    #[tracing::instrument(skip(self), fields(identity_id = %id))]
    pub async fn resolve(&self, id: IdentityId) -> Result<Identity> {
        let Some(cache) = &self.cache else {
            return self.fetch(id).await;
        };

        match with_deadline("identity_cache.get", self.timeout, cache.get(id)).await {
            Ok(Some(identity)) => {
                tracing::debug!(cache = "hit", "identity resolved from cache");
                return Ok(identity);
            },
            Ok(None) => tracing::debug!(cache = "miss", "identity not cached"),
            Err(err) => self.cache_failure("read", err)?,
        }

        let generation = self.invalidation_gen.load(Ordering::Acquire);
        let identity = self.fetch(id).await?;

        if self.invalidation_gen.load(Ordering::Acquire) != generation {
            tracing::debug!("skipping cache fill: invalidated during store read");
            return Ok(identity);
        }

        if let Err(err) = with_deadline("identity_cache.set", self.timeout, cache.set(&identity)).await
        {
            self.cache_failure("fill", err)?;
            return Ok(identity);
        }

        // An invalidation that landed while the fill was in flight wins.
        if self.invalidation_gen.load(Ordering::Acquire) != generation {
            tracing::debug!("removing cache fill: invalidated during write");
            if let Err(err) =
                with_deadline("identity_cache.delete", self.timeout, cache.delete(id)).await
            {
                tracing::warn!(error = %err, "failed to remove stale cache fill");
            }
        }

        Ok(identity)
    }

    /// Removes `id` from the cache so the next resolve reads the store.
    ///
    /// Call after an identity is deleted or its role changes. Fills already
    /// in flight for any id will not repopulate the cache.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the cache delete fails.
    #[tracing::instrument(skip(self), fields(identity_id = %id))]
    pub async fn invalidate(&self, id: IdentityId) -> Result<()> {
        self.invalidation_gen.fetch_add(1, Ordering::AcqRel);
        if let Some(cache) = &self.cache {
            with_deadline("identity_cache.delete", self.timeout, cache.delete(id)).await?;
            tracing::info!("identity cache entry invalidated");
        }
        Ok(())
    }

    async fn fetch(&self, id: IdentityId) -> Result<Identity> {
        fail_point!("resolver-before-store-fetch", |_| {
            Err(AuthError::storage(StorageError::internal("injected failure before store fetch")))
        });

        with_deadline("identity_store.get", self.timeout, self.store.get_identity_by_id(id))
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    AuthError::IdentityNotFound { id: id.into() }
                } else {
                    tracing::warn!(
                        transient = err.is_transient(),
                        error = %err,
                        "identity store read failed"
                    );
                    AuthError::storage(err)
                }
            })
    }

    /// Applies the fill policy to a cache failure.
    fn cache_failure(&self, stage: &'static str, err: StorageError) -> Result<()> {
        match self.fill_policy {
            CacheFillPolicy::Strict => {
                tracing::error!(
                    stage,
                    transient = err.is_transient(),
                    error = %err,
                    "identity cache failure"
                );
                Err(AuthError::storage(err))
            },
            CacheFillPolicy::BestEffort => {
                tracing::warn!(
                    stage,
                    transient = err.is_transient(),
                    error = %err,
                    "identity cache failure; serving from store"
                );
                Ok(())
            },
        }
    }
}
