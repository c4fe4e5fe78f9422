//! Server configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML file, then environment variables. The result is validated
//! before any component is built from it.
//!
//! ```toml
//! addr = "0.0.0.0:8080"
//! io_timeout = "5s"
//! invitation_ttl = "3days"
//!
//! [token]
//! secret = "change-me"
//! issuer = "gatehouse"
//! ttl = "3days"
//!
//! [basic]
//! username = "admin"
//! password = "change-me"
//!
//! [cache]
//! enabled = true
//! max_entries = 10000
//! ttl = "1m"
//! fill_policy = "strict"
//!
//! [rate_limiter]
//! requests_per_window = 20
//! window = "5s"
//! enabled = true
//! ```

use std::{path::Path, time::Duration};

use gatehouse_authn::{
    BasicCredentials, CacheFillPolicy, DEFAULT_INVITATION_TTL, DEFAULT_TOKEN_TTL,
};
use gatehouse_ratelimit::{RateLimitConfig, RateLimitConfigError};
use gatehouse_storage::{
    ConfigError, DEFAULT_IO_TIMEOUT, IdentityCacheConfig,
    cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL},
};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use zeroize::Zeroizing;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default token issuer and audience.
pub const DEFAULT_ISSUER: &str = "gatehouse";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigLoadError {
    /// The config file could not be read.
    #[error("failed to read config file {path}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`].
    #[error("failed to parse config file {path}")]
    Parse {
        /// File that failed.
        path: String,
        /// Underlying parse error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// An environment variable held an unusable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The rate limiter section failed validation.
    #[error("invalid rate limiter configuration")]
    RateLimit(#[from] RateLimitConfigError),

    /// The cache section failed validation.
    #[error("invalid cache configuration")]
    Cache(#[from] ConfigError),
}

/// Token signing settings.
#[derive(Clone, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields, default)]
pub struct TokenConfig {
    /// HMAC signing secret. Required. Scrubbed from memory on drop.
    #[serde(deserialize_with = "zeroizing_string")]
    #[builder(default, with = |secret: impl Into<String>| Zeroizing::new(secret.into()))]
    pub secret: Zeroizing<String>,
    /// Issuer and audience of issued tokens.
    #[builder(into, default = DEFAULT_ISSUER.to_owned())]
    pub issuer: String,
    /// Lifetime of issued tokens.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_TOKEN_TTL)]
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: Zeroizing::default(),
            issuer: DEFAULT_ISSUER.to_owned(),
            ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Credentials for Basic-protected operational routes.
#[derive(Clone, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields, default)]
pub struct BasicAuthConfig {
    /// User name.
    #[builder(into, default = "admin".to_owned())]
    pub username: String,
    /// Password. Required. Scrubbed from memory on drop.
    #[serde(deserialize_with = "zeroizing_string")]
    #[builder(default, with = |password: impl Into<String>| Zeroizing::new(password.into()))]
    pub password: Zeroizing<String>,
}

impl Default for BasicAuthConfig {
    fn default() -> Self {
        Self { username: "admin".to_owned(), password: Zeroizing::default() }
    }
}

impl std::fmt::Debug for BasicAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicAuthConfig {
    /// The expected credential pair.
    #[must_use]
    pub fn credentials(&self) -> BasicCredentials {
        BasicCredentials::new(&self.username, self.password.as_str())
    }
}

/// Identity cache settings.
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Whether identities are cached in front of the store.
    #[builder(default)]
    pub enabled: bool,
    /// Maximum number of cached identities.
    #[builder(default = DEFAULT_MAX_ENTRIES)]
    pub max_entries: u64,
    /// Time-to-live per entry; `None` keeps entries until invalidated or evicted.
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// How cache failures affect resolution.
    #[builder(default)]
    pub fill_policy: CacheFillPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: Some(DEFAULT_TTL),
            fill_policy: CacheFillPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Builds the in-memory cache configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_entries` is zero.
    pub fn identity_cache_config(&self) -> Result<IdentityCacheConfig, ConfigError> {
        let builder = IdentityCacheConfig::builder().max_entries(self.max_entries);
        match self.ttl {
            Some(ttl) => builder.ttl(ttl).build(),
            None => builder.without_ttl().build(),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Listen address. A bare `:port` binds every interface.
    #[builder(into, default = DEFAULT_ADDR.to_owned())]
    pub addr: String,
    /// Token signing.
    #[builder(default)]
    pub token: TokenConfig,
    /// Basic credentials for operational routes.
    #[builder(default)]
    pub basic: BasicAuthConfig,
    /// Identity cache.
    #[builder(default)]
    pub cache: CacheConfig,
    /// Admission limiter.
    #[builder(default)]
    pub rate_limiter: RateLimitConfig,
    /// Deadline for each collaborator call.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_IO_TIMEOUT)]
    pub io_timeout: Duration,
    /// How long a registrant may take to activate.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_INVITATION_TTL)]
    pub invitation_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            token: TokenConfig::default(),
            basic: BasicAuthConfig::default(),
            cache: CacheConfig::default(),
            rate_limiter: RateLimitConfig::default(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            invitation_ttl: DEFAULT_INVITATION_TTL,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path` (if given) and the process
    /// environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError`] if the file cannot be read or parsed, an
    /// environment override is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|var| std::env::var(var).ok())?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Parses a TOML file without applying overrides or validating.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Io`] or [`ConfigLoadError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigLoadError::Io { path: display.clone(), source })?;
        toml::from_str(&text)
            .map_err(|source| ConfigLoadError::Parse { path: display, source: Box::new(source) })
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Recognized variables: `ADDR`, `AUTH_TOKEN_SECRET`, `ADMIN_USER`,
    /// `ADMIN_PASSWORD`, `CACHE_ENABLED` (or its older name `REDIS_ENABLED`),
    /// `RATELIMITER_REQUESTS_COUNT` and `RATE_LIMITER_ENABLED`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::InvalidEnv`] for an unparseable value.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigLoadError> {
        if let Some(addr) = lookup("ADDR") {
            self.addr = addr;
        }
        if let Some(secret) = lookup("AUTH_TOKEN_SECRET") {
            self.token.secret = Zeroizing::new(secret);
        }
        if let Some(user) = lookup("ADMIN_USER") {
            self.basic.username = user;
        }
        if let Some(password) = lookup("ADMIN_PASSWORD") {
            self.basic.password = Zeroizing::new(password);
        }
        for var in ["REDIS_ENABLED", "CACHE_ENABLED"] {
            if let Some(value) = lookup(var) {
                self.cache.enabled = parse_bool(var, value)?;
            }
        }
        if let Some(value) = lookup("RATELIMITER_REQUESTS_COUNT") {
            let count = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigLoadError::InvalidEnv { var: "RATELIMITER_REQUESTS_COUNT", value })?;
            self.rate_limiter = self.rate_limiter.with_requests_per_window(count)?;
        }
        if let Some(value) = lookup("RATE_LIMITER_ENABLED") {
            self.rate_limiter =
                self.rate_limiter.with_enabled(parse_bool("RATE_LIMITER_ENABLED", value)?);
        }
        Ok(())
    }

    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.token.secret.is_empty() {
            return Err(ConfigLoadError::Invalid(
                "token.secret must be set (or AUTH_TOKEN_SECRET)".into(),
            ));
        }
        if self.token.issuer.is_empty() {
            return Err(ConfigLoadError::Invalid("token.issuer must not be empty".into()));
        }
        if self.token.ttl.as_secs() == 0 {
            return Err(ConfigLoadError::Invalid("token.ttl must be at least 1s".into()));
        }
        if self.basic.username.is_empty() || self.basic.password.is_empty() {
            return Err(ConfigLoadError::Invalid(
                "basic.username and basic.password must be set (or ADMIN_USER / ADMIN_PASSWORD)"
                    .into(),
            ));
        }
        if self.io_timeout.is_zero() {
            return Err(ConfigLoadError::Invalid("io_timeout must be positive".into()));
        }
        if self.invitation_ttl.as_secs() == 0 {
            return Err(ConfigLoadError::Invalid("invitation_ttl must be at least 1s".into()));
        }
        self.rate_limiter.validate()?;
        self.cache.identity_cache_config()?;
        Ok(())
    }

    /// The address to bind, with a bare `:port` expanded to all interfaces.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.addr.starts_with(':') { format!("0.0.0.0{}", self.addr) } else { self.addr.clone() }
    }
}

fn zeroizing_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Zeroizing<String>, D::Error> {
    String::deserialize(deserializer).map(Zeroizing::new)
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigLoadError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigLoadError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |var| map.get(var).cloned()
    }

    fn valid() -> ServerConfig {
        ServerConfig::builder()
            .token(TokenConfig::builder().secret("s3cret").build())
            .basic(BasicAuthConfig::builder().password("admin-pass").build())
            .build()
    }

    #[test]
    fn test_defaults_match_service_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.token.issuer, "gatehouse");
        assert_eq!(config.token.ttl, Duration::from_secs(3 * 24 * 3600));
        assert!(!config.cache.enabled);
        assert_eq!(config.rate_limiter.requests_per_window(), 20);
        assert_eq!(config.rate_limiter.window(), Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(5));
        assert_eq!(config.invitation_ttl, Duration::from_secs(3 * 24 * 3600));
    }

    #[test]
    fn test_parses_full_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            addr = ":9090"
            io_timeout = "2s"
            invitation_ttl = "12h"

            [token]
            secret = "abc"
            ttl = "1h"

            [basic]
            username = "ops"
            password = "pw"

            [cache]
            enabled = true
            max_entries = 50
            ttl = "30s"
            fill_policy = "best_effort"

            [rate_limiter]
            requests_per_window = 3
            window = "10s"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.token.secret.as_str(), "abc");
        assert_eq!(config.basic.credentials(), BasicCredentials::new("ops", "pw"));
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.io_timeout, Duration::from_secs(2));
        assert_eq!(config.invitation_ttl, Duration::from_secs(12 * 3_600));
        assert_eq!(config.token.ttl, Duration::from_secs(3_600));
        assert_eq!(config.cache.fill_policy, CacheFillPolicy::BestEffort);
        assert_eq!(config.cache.ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.rate_limiter.requests_per_window(), 3);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("adress = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = valid();
        config
            .apply_env_with(env(&[
                ("ADDR", ":7000"),
                ("AUTH_TOKEN_SECRET", "from-env"),
                ("ADMIN_USER", "root"),
                ("ADMIN_PASSWORD", "env-pass"),
                ("REDIS_ENABLED", "true"),
                ("RATELIMITER_REQUESTS_COUNT", "7"),
                ("RATE_LIMITER_ENABLED", "false"),
            ]))
            .unwrap();

        assert_eq!(config.addr, ":7000");
        assert_eq!(config.token.secret.as_str(), "from-env");
        assert_eq!(config.basic.username, "root");
        assert_eq!(config.basic.password.as_str(), "env-pass");
        assert!(config.cache.enabled);
        assert_eq!(config.rate_limiter.requests_per_window(), 7);
        assert!(!config.rate_limiter.enabled());
    }

    #[test]
    fn test_cache_enabled_wins_over_legacy_name() {
        let mut config = valid();
        config
            .apply_env_with(env(&[("REDIS_ENABLED", "true"), ("CACHE_ENABLED", "false")]))
            .unwrap();
        assert!(!config.cache.enabled);
    }

    #[rstest]
    #[case("RATELIMITER_REQUESTS_COUNT", "many")]
    #[case("RATE_LIMITER_ENABLED", "maybe")]
    #[case("CACHE_ENABLED", "2")]
    fn test_malformed_env_rejected(#[case] var: &str, #[case] value: &str) {
        let mut config = valid();
        let err = config.apply_env_with(env(&[(var, value)])).unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidEnv { .. }), "got {err:?}");
    }

    #[test]
    fn test_zero_request_count_rejected() {
        let mut config = valid();
        let err = config.apply_env_with(env(&[("RATELIMITER_REQUESTS_COUNT", "0")])).unwrap_err();
        assert!(matches!(err, ConfigLoadError::RateLimit(RateLimitConfigError::ZeroLimit)));
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let config = ServerConfig::builder()
            .basic(BasicAuthConfig::builder().password("pw").build())
            .build();
        assert!(matches!(config.validate(), Err(ConfigLoadError::Invalid(_))));
    }

    #[test]
    fn test_missing_basic_password_fails_validation() {
        let config =
            ServerConfig::builder().token(TokenConfig::builder().secret("s").build()).build();
        assert!(matches!(config.validate(), Err(ConfigLoadError::Invalid(_))));
    }

    #[test]
    fn test_sub_second_invitation_ttl_fails_validation() {
        let mut config = valid();
        config.invitation_ttl = Duration::from_millis(500);
        assert!(matches!(config.validate(), Err(ConfigLoadError::Invalid(_))));
    }

    #[test]
    fn test_zero_cache_capacity_fails_validation() {
        let mut config = valid();
        config.cache.max_entries = 0;
        assert!(matches!(config.validate(), Err(ConfigLoadError::Cache(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("admin-pass"));
    }
}
