//! Route handlers.
//!
//! Handlers run only after the gate stages their signatures name; a
//! handler taking [`Authorized<Post>`] never sees an unauthorized caller.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use gatehouse_authn::{hash_invitation_token, hash_password, issue_invitation, login};
use gatehouse_ratelimit::RateLimitMetricsSnapshot;
use gatehouse_storage::{Identity, IdentityId, ROLE_USER, with_deadline};
use serde::{Deserialize, Serialize};

use crate::{
    context::{Admitted, Authorized, Caller, Loaded},
    error::ApiError,
    resources::{MAX_CONTENT_CHARS, MAX_TITLE_CHARS, NewPost, Post},
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 70;
const MAX_USERNAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 255;

fn check_email(email: &str) -> Result<(), ApiError> {
    if !email.contains('@') || email.chars().count() > MAX_EMAIL_CHARS {
        return Err(ApiError::BadRequest("email must be a valid address".into()));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), ApiError> {
    let length = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&length) {
        return Err(ApiError::BadRequest(format!(
            "password must be {MIN_PASSWORD_CHARS} to {MAX_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
    version: &'static str,
}

/// `GET /v1/health`
pub async fn health(_admitted: Admitted) -> Json<Health> {
    Json(Health { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// Login request body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    email: String,
    password: String,
}

/// Login response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed bearer token.
    pub token: String,
}

/// `POST /v1/authentication/token`
pub async fn issue_token(
    State(state): State<AppState>,
    _admitted: Admitted,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    check_email(&request.email)?;
    check_password(&request.password)?;

    let identity =
        login(state.identities.as_ref(), &request.email, &request.password, state.io_timeout)
            .await?;
    let token = state.gate.issue_token(&identity, state.token_ttl)?;
    tracing::info!(identity_id = %identity.id, "token issued");
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// Registration request body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

/// Registration response: the stored user and its one-time activation token.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The registered, not yet active, user.
    #[serde(flatten)]
    pub user: UserView,
    /// Plain activation token; only its digest is stored.
    pub token: String,
}

/// `POST /v1/authentication/user`
///
/// Creates an inactive identity with the `user` role and returns the token
/// that activates it. Delivering the token to the registrant is left to the
/// caller.
pub async fn register_user(
    State(state): State<AppState>,
    _admitted: Admitted,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    check_text("username", &request.username, MAX_USERNAME_CHARS)?;
    check_email(&request.email)?;
    check_password(&request.password)?;

    let role = with_deadline(
        "role_catalog.get_by_name",
        state.io_timeout,
        state.roles.get_role_by_name(ROLE_USER),
    )
    .await
    .map_err(ApiError::internal)?;
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)??;

    let identity = Identity::builder()
        .id(IdentityId(0))
        .username(request.username)
        .email(request.email)
        .password_hash(password_hash)
        .is_active(false)
        .role(role)
        .build();
    let issued = issue_invitation(Utc::now(), state.invitation_ttl);
    let identity = with_deadline(
        "identity_store.create_and_invite",
        state.io_timeout,
        state.identities.create_and_invite(identity, &issued.invitation),
    )
    .await?;
    tracing::info!(identity_id = %identity.id, "identity registered");

    let body =
        RegisterResponse { user: UserView::from(&identity), token: issued.token.to_string() };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `PUT /v1/users/activate/{token}`
///
/// Redeems an activation token. The identity's cache entry is dropped so
/// the next resolution sees it active.
pub async fn activate_user(
    State(state): State<AppState>,
    _admitted: Admitted,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    let token_hash = hash_invitation_token(&token);
    let identity = with_deadline(
        "identity_store.activate",
        state.io_timeout,
        state.identities.activate(&token_hash, Utc::now()),
    )
    .await?;
    state.gate.resolver().invalidate(identity.id).await?;
    tracing::info!(identity_id = %identity.id, "identity activated");
    Ok(StatusCode::NO_CONTENT)
}

/// Cache section of the operational snapshot.
#[derive(Debug, Serialize)]
pub struct CacheVars {
    enabled: bool,
    entries: Option<u64>,
}

/// Operational snapshot served to Basic-authenticated operators.
#[derive(Debug, Serialize)]
pub struct DebugVars {
    rate_limiter: RateLimitMetricsSnapshot,
    cache: CacheVars,
}

/// `GET /v1/debug/vars`
pub async fn debug_vars(State(state): State<AppState>) -> Json<DebugVars> {
    let resolver = state.gate.resolver();
    Json(DebugVars {
        rate_limiter: state.gate.limiter().metrics_snapshot(),
        cache: CacheVars {
            enabled: resolver.cache_enabled(),
            entries: resolver.cache().and_then(|cache| cache.entry_count()),
        },
    })
}

/// Public view of an identity. Never includes the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    /// Identifier.
    pub id: IdentityId,
    /// Display handle.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Whether the identity is active.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Role name.
    pub role: String,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            is_active: identity.is_active,
            created_at: identity.created_at,
            role: identity.role.name.clone(),
        }
    }
}

/// `GET /v1/users/{id}`
pub async fn get_user(Loaded(user): Loaded<Identity>) -> Json<UserView> {
    Json(UserView::from(user.as_ref()))
}

/// `PUT /v1/users/{id}/follow`
pub async fn follow(
    State(state): State<AppState>,
    caller: Caller,
    Loaded(target): Loaded<Identity>,
) -> Result<StatusCode, ApiError> {
    if caller.identity.id == target.id {
        return Err(ApiError::BadRequest("cannot follow yourself".into()));
    }
    with_deadline(
        "follow_store.follow",
        state.io_timeout,
        state.follows.follow(caller.identity.id, target.id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /v1/users/{id}/unfollow`
pub async fn unfollow(
    State(state): State<AppState>,
    caller: Caller,
    Loaded(target): Loaded<Identity>,
) -> Result<StatusCode, ApiError> {
    with_deadline(
        "follow_store.unfollow",
        state.io_timeout,
        state.follows.unfollow(caller.identity.id, target.id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body of `POST /v1/posts`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePost {
    title: String,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Body of `PATCH /v1/posts/{id}`. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePost {
    title: Option<String>,
    content: Option<String>,
}

fn check_text(field: &str, value: &str, max_chars: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    if value.chars().count() > max_chars {
        return Err(ApiError::BadRequest(format!("{field} must be at most {max_chars} characters")));
    }
    Ok(())
}

/// `POST /v1/posts`
pub async fn create_post(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreatePost>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    check_text("title", &body.title, MAX_TITLE_CHARS)?;
    check_text("content", &body.content, MAX_CONTENT_CHARS)?;

    let post = NewPost {
        user_id: caller.identity.id,
        title: body.title,
        content: body.content,
        tags: body.tags,
    };
    let post = with_deadline("post_store.create", state.io_timeout, state.posts.create_post(post))
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// `GET /v1/posts/{id}`
pub async fn get_post(Loaded(post): Loaded<Post>) -> Json<Post> {
    Json(post.as_ref().clone())
}

/// `PATCH /v1/posts/{id}`: owner or moderator.
pub async fn update_post(
    State(state): State<AppState>,
    authorized: Authorized<Post>,
    body: Result<Json<UpdatePost>, JsonRejection>,
) -> Result<Json<Post>, ApiError> {
    let Json(body) = body?;
    let mut post = authorized.resource().clone();
    if let Some(title) = body.title {
        check_text("title", &title, MAX_TITLE_CHARS)?;
        post.title = title;
    }
    if let Some(content) = body.content {
        check_text("content", &content, MAX_CONTENT_CHARS)?;
        post.content = content;
    }

    let updated =
        with_deadline("post_store.update", state.io_timeout, state.posts.update_post(&post))
            .await?;
    tracing::info!(
        post_id = %updated.id,
        editor = %authorized.caller().identity.id,
        version = updated.version,
        "post updated"
    );
    Ok(Json(updated))
}

/// `DELETE /v1/posts/{id}`: owner or admin.
pub async fn delete_post(
    State(state): State<AppState>,
    authorized: Authorized<Post>,
) -> Result<StatusCode, ApiError> {
    let id = authorized.resource().id;
    with_deadline("post_store.delete", state.io_timeout, state.posts.delete_post(id)).await?;
    tracing::info!(post_id = %id, deleted_by = %authorized.caller().identity.id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}
