//! Shared application state.
//!
//! Everything a request needs is constructed once at startup from a
//! validated [`ServerConfig`] and handed to the router; nothing is ambient.

use std::{sync::Arc, time::Duration};

use gatehouse_authn::{IdentityResolver, RoleAuthorizer, TokenAuthenticator};
use gatehouse_ratelimit::FixedWindowLimiter;
use gatehouse_storage::{
    IdentityCache, IdentityStore, MemoryIdentityCache, MemoryIdentityStore, MemoryRoleCatalog,
    RoleCatalog,
};

use crate::{
    config::{ConfigLoadError, ServerConfig},
    gate::Gate,
    resources::{FollowStore, MemoryFollowStore, MemoryPostStore, PostStore},
};

/// State cloned into every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    /// The request gate.
    pub gate: Arc<Gate>,
    /// Identity store, for login, registration and user lookups.
    pub identities: Arc<dyn IdentityStore>,
    /// Role catalog, for the role given to new registrants.
    pub roles: Arc<dyn RoleCatalog>,
    /// Post store.
    pub posts: Arc<dyn PostStore>,
    /// Follow-edge store.
    pub follows: Arc<dyn FollowStore>,
    /// Deadline for each collaborator call made outside the gate.
    pub io_timeout: Duration,
    /// Lifetime of tokens issued at login.
    pub token_ttl: Duration,
    /// Lifetime of activation tokens issued at registration.
    pub invitation_ttl: Duration,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gate", &self.gate)
            .field("io_timeout", &self.io_timeout)
            .field("token_ttl", &self.token_ttl)
            .field("invitation_ttl", &self.invitation_ttl)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl AppState {
    /// Wires the gate and collaborators from `config`.
    ///
    /// Collaborators left unset get in-memory implementations. When
    /// `config.cache.enabled` is set and no `cache` is given, an in-process
    /// cache is built from the cache section; when it is unset, any given
    /// `cache` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError`] if the cache section is invalid.
    #[builder]
    pub fn new(
        config: ServerConfig,
        identities: Option<Arc<dyn IdentityStore>>,
        roles: Option<Arc<dyn RoleCatalog>>,
        cache: Option<Arc<dyn IdentityCache>>,
        posts: Option<Arc<dyn PostStore>>,
        follows: Option<Arc<dyn FollowStore>>,
    ) -> Result<Self, ConfigLoadError> {
        let identities = identities.unwrap_or_else(|| Arc::new(MemoryIdentityStore::new()));
        let roles = roles.unwrap_or_else(|| Arc::new(MemoryRoleCatalog::with_default_roles()));

        let cache = if config.cache.enabled {
            match cache {
                Some(cache) => Some(cache),
                None => {
                    let cache_config = config.cache.identity_cache_config()?;
                    Some(Arc::new(MemoryIdentityCache::new(&cache_config)) as Arc<dyn IdentityCache>)
                },
            }
        } else {
            None
        };
        tracing::info!(
            cache_enabled = cache.is_some(),
            fill_policy = ?config.cache.fill_policy,
            rate_limit = config.rate_limiter.requests_per_window(),
            rate_window = ?config.rate_limiter.window(),
            rate_limit_enabled = config.rate_limiter.enabled(),
            "gate configured"
        );

        let resolver = IdentityResolver::builder()
            .store(Arc::clone(&identities))
            .maybe_cache(cache)
            .fill_policy(config.cache.fill_policy)
            .timeout(config.io_timeout)
            .build();

        let gate = Gate::builder()
            .limiter(Arc::new(FixedWindowLimiter::new(config.rate_limiter)))
            .tokens(TokenAuthenticator::new(config.token.secret.as_bytes(), &config.token.issuer))
            .resolver(resolver)
            .authorizer(RoleAuthorizer::new(Arc::clone(&roles)).with_timeout(config.io_timeout))
            .basic(config.basic.credentials())
            .build();

        Ok(Self {
            gate: Arc::new(gate),
            identities,
            roles,
            posts: posts.unwrap_or_else(|| Arc::new(MemoryPostStore::new())),
            follows: follows.unwrap_or_else(|| Arc::new(MemoryFollowStore::new())),
            io_timeout: config.io_timeout,
            token_ttl: config.token.ttl,
            invitation_ttl: config.invitation_ttl,
        })
    }
}
