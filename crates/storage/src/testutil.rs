//! Shared test utilities for gate collaborators.
//!
//! Feature-gated behind `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! gatehouse-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use gatehouse_storage::testutil::{FlakyIdentityCache, make_identity};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    cache::{IdentityCache, MemoryIdentityCache},
    error::{StorageError, StorageResult},
    role::default_roles,
    types::{Identity, IdentityId, Role},
};

/// Returns the default-catalog role with the given name.
///
/// # Panics
///
/// Panics if `name` is not one of `user`, `moderator`, `admin`.
#[must_use]
pub fn make_role(name: &str) -> Role {
    default_roles()
        .into_iter()
        .find(|role| role.name == name)
        .unwrap_or_else(|| panic!("unknown default role: {name}"))
}

/// Creates an active identity `user{id}` / `user{id}@example.com` holding
/// the named default role.
#[must_use]
pub fn make_identity(id: i64, role: &str) -> Identity {
    Identity::builder()
        .id(IdentityId(id))
        .username(format!("user{id}"))
        .email(format!("user{id}@example.com"))
        .role(make_role(role))
        .build()
}

/// An [`IdentityCache`] wrapper with switchable failures and latency.
///
/// Delegates to a [`MemoryIdentityCache`] unless a failure is armed, and
/// counts every call so tests can assert which path the resolver took.
#[derive(Clone, Default)]
pub struct FlakyIdentityCache {
    inner: MemoryIdentityCache,
    fail_get: Arc<AtomicBool>,
    fail_set: Arc<AtomicBool>,
    latency: Arc<Mutex<Option<Duration>>>,
    gets: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
    deletes: Arc<AtomicU64>,
}

impl FlakyIdentityCache {
    /// Creates a healthy cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `get` calls fail with a connection error.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::Release);
    }

    /// Makes subsequent `set` calls fail with a connection error.
    pub fn fail_sets(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::Release);
    }

    /// Delays every call by `latency` before it runs.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of `get` calls observed.
    #[must_use]
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Acquire)
    }

    /// Number of `set` calls observed.
    #[must_use]
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Acquire)
    }

    /// Number of `delete` calls observed.
    #[must_use]
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Acquire)
    }

    /// The healthy cache behind the wrapper.
    #[must_use]
    pub fn inner(&self) -> &MemoryIdentityCache {
        &self.inner
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl IdentityCache for FlakyIdentityCache {
    async fn get(&self, id: IdentityId) -> StorageResult<Option<Identity>> {
        self.gets.fetch_add(1, Ordering::AcqRel);
        self.delay().await;
        if self.fail_get.load(Ordering::Acquire) {
            return Err(StorageError::connection("cache unreachable"));
        }
        self.inner.get(id).await
    }

    async fn set(&self, identity: &Identity) -> StorageResult<()> {
        self.sets.fetch_add(1, Ordering::AcqRel);
        self.delay().await;
        if self.fail_set.load(Ordering::Acquire) {
            return Err(StorageError::connection("cache unreachable"));
        }
        self.inner.set(identity).await
    }

    async fn delete(&self, id: IdentityId) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::AcqRel);
        self.delay().await;
        self.inner.delete(id).await
    }
}

/// Assert that a [`StorageResult`] is a [`StorageError::NotFound`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use gatehouse_storage::assert_not_found;
/// use gatehouse_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::not_found("identity", 1));
/// assert_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "{}: expected StorageError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Conflict`].
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict { .. })),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Timeout`].
#[macro_export]
macro_rules! assert_timeout {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Timeout { .. })),
            "expected StorageError::Timeout, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok`, returning the inner value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
}
