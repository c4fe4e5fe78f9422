//! Shared identity cache.
//!
//! [`IdentityCache`] is the fast path consulted before the durable
//! [`IdentityStore`](crate::IdentityStore). The bundled
//! [`MemoryIdentityCache`] keeps entries in a [`moka`] cache; a networked
//! cache (Redis, memcached) implements the same trait.
//!
//! # Usage
//!
//! ```no_run
//! # use std::time::Duration;
//! # use gatehouse_storage::{IdentityCacheConfig, MemoryIdentityCache};
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IdentityCacheConfig::builder()
//!     .max_entries(10_000)
//!     .ttl(Duration::from_secs(60))
//!     .build()?;
//! let cache = MemoryIdentityCache::new(&config);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use fail::fail_point;
use moka::future::Cache;
use tracing::trace;

use crate::{
    error::{ConfigError, StorageError, StorageResult},
    types::{Identity, IdentityId},
};

/// Cache of resolved identities, keyed by id.
///
/// Entries carry no staleness contract of their own: callers remove an
/// entry explicitly when the identity changes.
#[async_trait]
pub trait IdentityCache: Send + Sync {
    /// Returns the cached identity, or `Ok(None)` on a miss.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, id: IdentityId) -> StorageResult<Option<Identity>>;

    /// Stores an identity under its id, replacing any previous entry.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, identity: &Identity) -> StorageResult<()>;

    /// Removes the entry for `id`. Removing an absent entry succeeds.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, id: IdentityId) -> StorageResult<()>;

    /// Number of entries currently held, when the backend can report it.
    fn entry_count(&self) -> Option<u64> {
        None
    }
}

// ───────────────────────────────────────────────────────────────────────────
// IdentityCacheConfig
// ───────────────────────────────────────────────────────────────────────────

/// Default maximum number of cache entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Minimum allowed cache TTL.
const MIN_TTL: Duration = Duration::from_secs(1);

/// Capacity and expiry for [`MemoryIdentityCache`].
///
/// # Validation
///
/// - `max_entries` must be >= 1
/// - `ttl`, when set, must be >= 1 second
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCacheConfig {
    max_entries: u64,
    ttl: Option<Duration>,
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self { max_entries: DEFAULT_MAX_ENTRIES, ttl: Some(DEFAULT_TTL) }
    }
}

impl IdentityCacheConfig {
    /// Starts a builder with the default capacity and TTL.
    #[must_use]
    pub fn builder() -> IdentityCacheConfigBuilder {
        IdentityCacheConfigBuilder { max_entries: DEFAULT_MAX_ENTRIES, ttl: Some(DEFAULT_TTL) }
    }

    /// Returns the maximum number of cache entries.
    #[must_use]
    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Returns the entry TTL, if any.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

/// Builder for [`IdentityCacheConfig`].
#[derive(Debug)]
pub struct IdentityCacheConfigBuilder {
    max_entries: u64,
    ttl: Option<Duration>,
}

impl IdentityCacheConfigBuilder {
    /// Sets the maximum number of entries in the cache.
    #[must_use]
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the TTL for cache entries.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keeps entries until evicted by capacity or removed explicitly.
    #[must_use]
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Builds the configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `max_entries` is 0 or the
    /// TTL is shorter than one second.
    pub fn build(self) -> Result<IdentityCacheConfig, ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                value: self.max_entries.to_string(),
                min: "1".to_owned(),
            });
        }
        if let Some(ttl) = self.ttl
            && ttl < MIN_TTL
        {
            return Err(ConfigError::BelowMinimum {
                field: "ttl",
                value: format!("{}ms", ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        Ok(IdentityCacheConfig { max_entries: self.max_entries, ttl: self.ttl })
    }
}

// ───────────────────────────────────────────────────────────────────────────
// MemoryIdentityCache
// ───────────────────────────────────────────────────────────────────────────

/// In-process [`IdentityCache`] backed by [`moka::future::Cache`].
///
/// Inserts are atomic per entry: a fill abandoned mid-flight either lands
/// completely or not at all. Clones share the same underlying cache.
#[derive(Clone)]
pub struct MemoryIdentityCache {
    cache: Cache<IdentityId, Identity>,
    config: IdentityCacheConfig,
}

impl std::fmt::Debug for MemoryIdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIdentityCache")
            .field("entries", &self.cache.entry_count())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for MemoryIdentityCache {
    fn default() -> Self {
        Self::new(&IdentityCacheConfig::default())
    }
}

impl MemoryIdentityCache {
    /// Creates a cache from a validated configuration.
    #[must_use]
    pub fn new(config: &IdentityCacheConfig) -> Self {
        let builder = Cache::builder().max_capacity(config.max_entries);
        let cache = match config.ttl {
            Some(ttl) => builder.time_to_live(ttl).build(),
            None => builder.build(),
        };
        Self { cache, config: config.clone() }
    }

    /// Returns the configuration this cache was built with.
    #[must_use]
    pub fn config(&self) -> &IdentityCacheConfig {
        &self.config
    }

    /// Invalidates all cache entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl IdentityCache for MemoryIdentityCache {
    #[tracing::instrument(skip(self), fields(identity_id = %id))]
    async fn get(&self, id: IdentityId) -> StorageResult<Option<Identity>> {
        fail_point!("identity-cache-get", |_| {
            Err(StorageError::connection("injected identity cache read failure"))
        });
        let hit = self.cache.get(&id).await;
        trace!(hit = hit.is_some(), "identity cache lookup");
        Ok(hit)
    }

    #[tracing::instrument(skip(self, identity), fields(identity_id = %identity.id))]
    async fn set(&self, identity: &Identity) -> StorageResult<()> {
        fail_point!("identity-cache-set", |_| {
            Err(StorageError::connection("injected identity cache write failure"))
        });
        self.cache.insert(identity.id, identity.clone()).await;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(identity_id = %id))]
    async fn delete(&self, id: IdentityId) -> StorageResult<()> {
        self.cache.invalidate(&id).await;
        Ok(())
    }

    fn entry_count(&self) -> Option<u64> {
        Some(self.cache.entry_count())
    }
}
