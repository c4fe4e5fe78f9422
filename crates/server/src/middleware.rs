//! Gate stages as axum middleware.
//!
//! Each function runs one stage, stores its typed result in the request
//! extensions and calls the next layer. The router stacks them so that
//! admission runs first on every route, then bearer authentication, then
//! resource loading, then authorization.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Path, Request, State, rejection::PathRejection},
    http::header,
    middleware::Next,
    response::Response,
};
use gatehouse_authn::AuthError;
use gatehouse_storage::{IdentityId, with_deadline};
use tracing::Instrument;

use crate::{
    context::{Admitted, Caller, Loaded},
    error::ApiError,
    resources::{Post, PostId},
    state::AppState,
};

/// The `Authorization` value, if sent. A value that is not visible ASCII was
/// sent but cannot carry credentials, so it is malformed rather than missing.
fn authorization_header(request: &Request) -> Result<Option<&str>, AuthError> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MalformedAuthorizationHeader))
        .transpose()
}

/// Opens a span per request carrying method and path.
pub async fn trace_request(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        status = tracing::field::Empty,
    );
    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("status", response.status().as_u16());
        tracing::debug!("request finished");
        response
    }
    .instrument(span)
    .await
}

/// Counts the request against the caller's address.
///
/// The key is the peer IP without its port, so opening new connections does
/// not buy a fresh quota.
pub async fn admit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let admitted = state.gate.admit(&peer.ip().to_string())?;
    request.extensions_mut().insert(admitted);
    Ok(next.run(request).await)
}

/// Verifies the bearer token and resolves the caller.
pub async fn require_bearer(
    State(state): State<AppState>,
    admitted: Admitted,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = authorization_header(&request)?;
    let caller = state.gate.authenticate(&admitted, header).await?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Checks Basic credentials for operational routes.
pub async fn require_basic(
    State(state): State<AppState>,
    admitted: Admitted,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = authorization_header(&request).map_err(ApiError::from_basic)?;
    state.gate.verify_basic(&admitted, header)?;
    Ok(next.run(request).await)
}

/// Loads the post named by the `{id}` path segment.
pub async fn load_post(
    State(state): State<AppState>,
    _caller: Caller,
    path: Result<Path<i64>, PathRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    let post = with_deadline("post_store.get", state.io_timeout, state.posts.get_post(PostId(id)))
        .await?;
    request.extensions_mut().insert(Loaded(Arc::new(post)));
    Ok(next.run(request).await)
}

/// Loads the identity named by the `{id}` path segment.
pub async fn load_user(
    State(state): State<AppState>,
    _caller: Caller,
    path: Result<Path<i64>, PathRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    let identity = with_deadline(
        "identity_store.get",
        state.io_timeout,
        state.identities.get_identity_by_id(IdentityId(id)),
    )
    .await
    .map_err(|err| if err.is_not_found() { ApiError::not_found("user") } else { err.into() })?;
    request.extensions_mut().insert(Loaded(Arc::new(identity)));
    Ok(next.run(request).await)
}

/// State for [`authorize_post`]: the role that may act in place of the owner.
#[derive(Clone)]
pub struct RoleGuard {
    state: AppState,
    role: &'static str,
}

impl RoleGuard {
    /// Guards a route with `role`.
    #[must_use]
    pub fn new(state: AppState, role: &'static str) -> Self {
        Self { state, role }
    }
}

/// Clears the caller to act on the loaded post as its owner or with the
/// guard's role.
pub async fn authorize_post(
    State(guard): State<RoleGuard>,
    caller: Caller,
    Loaded(post): Loaded<Post>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = guard.state.gate.authorize(&caller, post, guard.role).await?;
    request.extensions_mut().insert(authorized);
    Ok(next.run(request).await)
}
