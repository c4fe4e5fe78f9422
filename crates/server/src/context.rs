//! Typed request context.
//!
//! Each gate stage leaves its result in the request's extensions as a
//! distinct type, and each type can only be produced by its stage. A
//! handler that names [`Caller`] or [`Authorized`] in its signature is
//! therefore unreachable unless the preceding stages ran and passed.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use gatehouse_authn::Claims;
use gatehouse_storage::Identity;
use thiserror::Error;

use crate::error::ApiError;

/// Proof that the request passed admission control.
#[derive(Debug, Clone)]
pub struct Admitted {
    key: Arc<str>,
}

impl Admitted {
    pub(crate) fn new(key: &str) -> Self {
        Self { key: Arc::from(key) }
    }

    /// The limiter key the request was counted under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// An authenticated caller: verified claims plus the identity they name.
#[derive(Debug, Clone)]
pub struct Caller {
    /// The resolved identity.
    pub identity: Arc<Identity>,
    /// The verified token claims.
    pub claims: Claims,
}

/// A resource loaded from the path before authorization.
#[derive(Debug)]
pub struct Loaded<R>(pub Arc<R>);

impl<R> Clone for Loaded<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// A resource the caller has been cleared to act on.
#[derive(Debug)]
pub struct Authorized<R> {
    caller: Caller,
    resource: Arc<R>,
}

impl<R> Clone for Authorized<R> {
    fn clone(&self) -> Self {
        Self { caller: self.caller.clone(), resource: Arc::clone(&self.resource) }
    }
}

impl<R> Authorized<R> {
    pub(crate) fn new(caller: Caller, resource: Arc<R>) -> Self {
        Self { caller, resource }
    }

    /// The caller that was authorized.
    #[must_use]
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// The resource as loaded before authorization.
    #[must_use]
    pub fn resource(&self) -> &R {
        &self.resource
    }
}

/// A handler asked for a stage result that no middleware produced.
///
/// This is a routing bug, not a caller error.
#[derive(Debug, Error)]
#[error("request context has no {0}; the route is not wired through that gate stage")]
pub struct MissingStage(&'static str);

fn from_extensions<T>(parts: &Parts, stage: &'static str) -> Result<T, ApiError>
where
    T: Clone + Send + Sync + 'static,
{
    parts.extensions.get::<T>().cloned().ok_or_else(|| ApiError::internal(MissingStage(stage)))
}

impl<S: Send + Sync> FromRequestParts<S> for Admitted {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        from_extensions(parts, "admission")
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        from_extensions(parts, "authenticated caller")
    }
}

impl<S, R> FromRequestParts<S> for Loaded<R>
where
    S: Send + Sync,
    R: Send + Sync + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        from_extensions(parts, "loaded resource")
    }
}

impl<S, R> FromRequestParts<S> for Authorized<R>
where
    S: Send + Sync,
    R: Send + Sync + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        from_extensions(parts, "authorization")
    }
}
