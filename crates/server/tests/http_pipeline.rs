//! End-to-end tests for the gate pipeline through the axum router.
//!
//! Requests go through `tower::ServiceExt::oneshot` with a mocked peer
//! address, so every layer runs exactly as it would behind a listener.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::connect_info::MockConnectInfo,
    http::{HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use gatehouse_authn::{
    BasicCredentials, TokenAuthenticator, hash_password,
    testutil::{TEST_ISSUER, TEST_SECRET, expired_token},
};
use gatehouse_ratelimit::testutil::quota;
use gatehouse_server::{
    AppState, ServerConfig,
    config::{BasicAuthConfig, CacheConfig, TokenConfig},
    resources::{MemoryPostStore, NewPost, PostStore},
    router,
};
use gatehouse_storage::{IdentityId, IdentityStore, MemoryIdentityStore, testutil::make_identity};
use serde_json::{Value, json};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const PASSWORD: &str = "correct-horse";
const OWNER: i64 = 1;
const OTHER_USER: i64 = 2;
const MODERATOR: i64 = 3;
const ADMIN: i64 = 4;

struct Harness {
    app: Router,
    tokens: TokenAuthenticator,
    identities: MemoryIdentityStore,
}

struct Options {
    rate_limit: u64,
    cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { rate_limit: 1_000, cache: false }
    }
}

async fn harness_with(options: Options) -> Harness {
    let identities = MemoryIdentityStore::new();
    let hash = hash_password(PASSWORD).unwrap();
    for (id, role) in [(OWNER, "user"), (OTHER_USER, "user"), (MODERATOR, "moderator"), (ADMIN, "admin")]
    {
        let mut identity = make_identity(id, role);
        identity.password_hash.clone_from(&hash);
        identities.create_identity(&identity).await.unwrap();
    }

    let posts = MemoryPostStore::new();
    posts
        .create_post(NewPost {
            user_id: IdentityId(OWNER),
            title: "first".into(),
            content: "owned by user 1".into(),
            tags: vec![],
        })
        .await
        .unwrap();

    let secret = std::str::from_utf8(TEST_SECRET).unwrap();
    let config = ServerConfig::builder()
        .token(TokenConfig::builder().secret(secret).issuer(TEST_ISSUER).build())
        .basic(BasicAuthConfig::builder().username("ops").password("ops-pass").build())
        .cache(CacheConfig::builder().enabled(options.cache).build())
        .rate_limiter(quota(options.rate_limit, Duration::from_secs(5)))
        .build();
    config.validate().unwrap();

    let state = AppState::builder()
        .config(config)
        .identities(Arc::new(identities.clone()))
        .posts(Arc::new(posts))
        .build()
        .unwrap();

    let app = router(state).layer(MockConnectInfo(SocketAddr::from(([10, 1, 2, 3], 40_000))));
    Harness { app, tokens: TokenAuthenticator::new(TEST_SECRET, TEST_ISSUER), identities }
}

async fn harness() -> Harness {
    harness_with(Options::default()).await
}

impl Harness {
    fn bearer(&self, id: i64) -> String {
        let token =
            self.tokens.issue(&self.tokens.claims_for(IdentityId(id), Duration::from_secs(600))).unwrap();
        format!("Bearer {token}")
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn call(&self, method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            },
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    async fn as_user(&self, id: i64, method: Method, uri: &str, body: Option<Value>) -> Response {
        let auth = self.bearer(id);
        self.call(method, uri, Some(&auth), body).await
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_header_is_unauthorized_with_exact_body() {
    let h = harness().await;
    let response = h.call(Method::GET, "/v1/posts/1", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"error": "authorization header is missing"}));
}

#[tokio::test]
async fn malformed_header_is_unauthorized() {
    let h = harness().await;
    let response = h.call(Method::GET, "/v1/posts/1", Some("Token abc"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"error": "authorization header is malformed"}));
}

#[tokio::test]
async fn non_ascii_header_is_malformed_not_missing() {
    let h = harness().await;
    let request = Request::builder()
        .uri("/v1/posts/1")
        .header(header::AUTHORIZATION, HeaderValue::from_bytes(b"Bearer \xffabc").unwrap())
        .body(Body::empty())
        .unwrap();

    let response = h.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"error": "authorization header is malformed"}));
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let h = harness().await;
    let auth = format!("Bearer {}", expired_token(OWNER, 30));
    let response = h.call(Method::GET, "/v1/posts/1", Some(&auth), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_for_removed_identity_is_unauthorized() {
    let h = harness().await;
    let auth = h.bearer(OTHER_USER);
    h.identities.remove(IdentityId(OTHER_USER));
    let response = h.call(Method::GET, "/v1/posts/1", Some(&auth), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn over_quota_is_rate_limited_with_retry_after() {
    let h = harness_with(Options { rate_limit: 3, ..Options::default() }).await;
    for _ in 0..3 {
        assert_eq!(h.call(Method::GET, "/v1/health", None, None).await.status(), StatusCode::OK);
    }

    let response = h.call(Method::GET, "/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 =
        response.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=5).contains(&retry_after), "retry-after {retry_after}");

    let body = json_body(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("rate limit exceeded, retry after: "), "{message}");
}

#[tokio::test]
async fn admission_runs_before_authentication() {
    let h = harness_with(Options { rate_limit: 1, ..Options::default() }).await;
    assert_eq!(h.call(Method::GET, "/v1/posts/1", None, None).await.status(), StatusCode::UNAUTHORIZED);

    // The quota is spent; even a valid token is turned away before verification.
    let response = h.as_user(OWNER, Method::GET, "/v1/posts/1", None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_owner_with_insufficient_role_is_forbidden() {
    let h = harness().await;
    let response =
        h.as_user(OTHER_USER, Method::PATCH, "/v1/posts/1", Some(json!({"title": "mine now"}))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await, json!({"error": "forbidden"}));
}

#[tokio::test]
async fn owner_reaches_handler() {
    let h = harness().await;
    let response =
        h.as_user(OWNER, Method::PATCH, "/v1/posts/1", Some(json!({"title": "renamed"}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let post = json_body(response).await;
    assert_eq!(post["title"], "renamed");
    assert_eq!(post["content"], "owned by user 1");
    assert_eq!(post["version"], 1);
}

#[tokio::test]
async fn moderator_may_edit_but_not_delete() {
    let h = harness().await;
    let edit = h
        .as_user(MODERATOR, Method::PATCH, "/v1/posts/1", Some(json!({"content": "moderated"})))
        .await;
    assert_eq!(edit.status(), StatusCode::OK);

    let delete = h.as_user(MODERATOR, Method::DELETE, "/v1/posts/1", None).await;
    assert_eq!(delete.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_may_delete_any_post() {
    let h = harness().await;
    let delete = h.as_user(ADMIN, Method::DELETE, "/v1/posts/1", None).await;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let get = h.as_user(OWNER, Method::GET, "/v1/posts/1", None).await;
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(get).await, json!({"error": "post not found"}));
}

#[tokio::test]
async fn owner_may_delete_own_post() {
    let h = harness().await;
    let delete = h.as_user(OWNER, Method::DELETE, "/v1/posts/1", None).await;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_fetch_post() {
    let h = harness().await;
    let created = h
        .as_user(
            OTHER_USER,
            Method::POST,
            "/v1/posts",
            Some(json!({"title": "new", "content": "body", "tags": ["a"]})),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let post = json_body(created).await;
    assert_eq!(post["user_id"], OTHER_USER);

    let uri = format!("/v1/posts/{}", post["id"]);
    let fetched = h.as_user(OWNER, Method::GET, &uri, None).await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(json_body(fetched).await["tags"], json!(["a"]));
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() {
    let h = harness().await;
    for body in [
        json!({"title": "x".repeat(101)}),
        json!({"content": ""}),
        json!({"title": "ok", "owner": 2}),
        json!({"title": 5}),
    ] {
        let response = h.as_user(OWNER, Method::PATCH, "/v1/posts/1", Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert!(json_body(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn non_numeric_id_is_bad_request() {
    let h = harness().await;
    let response = h.as_user(OWNER, Method::GET, "/v1/posts/abc", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let h = harness().await;
    let response = h.as_user(OWNER, Method::GET, "/v1/posts/999", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Users and follows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn user_view_hides_password_hash() {
    let h = harness().await;
    let response = h.as_user(OWNER, Method::GET, "/v1/users/3", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user = json_body(response).await;
    assert_eq!(user["username"], "user3");
    assert_eq!(user["role"], "moderator");
    assert!(user.get("password_hash").is_none());

    let missing = h.as_user(OWNER, Method::GET, "/v1/users/99", None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await, json!({"error": "user not found"}));
}

#[tokio::test]
async fn follow_lifecycle() {
    let h = harness().await;
    let follow = || h.as_user(OWNER, Method::PUT, "/v1/users/2/follow", None);

    assert_eq!(follow().await.status(), StatusCode::NO_CONTENT);
    assert_eq!(follow().await.status(), StatusCode::CONFLICT);

    let unfollow = h.as_user(OWNER, Method::PUT, "/v1/users/2/unfollow", None).await;
    assert_eq!(unfollow.status(), StatusCode::NO_CONTENT);
    assert_eq!(follow().await.status(), StatusCode::NO_CONTENT);

    let own = h.as_user(OWNER, Method::PUT, "/v1/users/1/follow", None).await;
    assert_eq!(own.status(), StatusCode::BAD_REQUEST);

    let ghost = h.as_user(OWNER, Method::PUT, "/v1/users/99/follow", None).await;
    assert_eq!(ghost.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_issues_usable_token() {
    let h = harness().await;
    let response = h
        .call(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({"email": "user1@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = json_body(response).await["token"].as_str().unwrap().to_owned();

    let claims = h.tokens.verify(&token).unwrap();
    assert_eq!(claims.sub, IdentityId(OWNER));
    assert_eq!(claims.iat, claims.nbf);

    let auth = format!("Bearer {token}");
    let me = h.call(Method::GET, "/v1/users/1", Some(&auth), None).await;
    assert_eq!(me.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_failures() {
    let h = harness().await;
    let login = |email: &str, password: &str| {
        h.call(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({"email": email, "password": password})),
        )
    };

    assert_eq!(login("user1@example.com", "wrong-password").await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(login("nobody@example.com", PASSWORD).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(login("user1@example.com", "short").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(login("not-an-email", PASSWORD).await.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Registration and activation
// ---------------------------------------------------------------------------

const NEW_PASSWORD: &str = "fresh-password";

impl Harness {
    async fn register(&self, username: &str, email: &str) -> Response {
        self.call(
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": username, "email": email, "password": NEW_PASSWORD})),
        )
        .await
    }

    async fn login(&self, email: &str) -> StatusCode {
        self.call(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({"email": email, "password": NEW_PASSWORD})),
        )
        .await
        .status()
    }
}

#[tokio::test]
async fn registered_user_logs_in_only_after_activation() {
    let h = harness().await;

    let response = h.register("newcomer", "new@example.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["id"], 5);
    assert_eq!(body["username"], "newcomer");
    assert_eq!(body["role"], "user");
    assert_eq!(body["is_active"], false);
    assert!(body.get("password_hash").is_none());
    let token = body["token"].as_str().unwrap().to_owned();

    assert_eq!(h.login("new@example.com").await, StatusCode::UNAUTHORIZED);

    let activated =
        h.call(Method::PUT, &format!("/v1/users/activate/{token}"), None, None).await;
    assert_eq!(activated.status(), StatusCode::NO_CONTENT);
    assert!(h.identities.get_identity_by_id(IdentityId(5)).await.unwrap().is_active);
    assert_eq!(h.login("new@example.com").await, StatusCode::CREATED);

    let replayed = h.call(Method::PUT, &format!("/v1/users/activate/{token}"), None, None).await;
    assert_eq!(replayed.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_activation_token_is_not_found() {
    let h = harness().await;
    let response = h.call(Method::PUT, "/v1/users/activate/not-a-token", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({"error": "invitation not found"}));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let h = harness().await;
    assert_eq!(h.register("newcomer", "new@example.com").await.status(), StatusCode::CREATED);

    assert_eq!(h.register("other", "new@example.com").await.status(), StatusCode::CONFLICT);
    assert_eq!(h.register("newcomer", "other@example.com").await.status(), StatusCode::CONFLICT);
    assert_eq!(h.register("seeded", "user1@example.com").await.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_registrations_are_bad_requests() {
    let h = harness().await;
    let register = |body: Value| h.call(Method::POST, "/v1/authentication/user", None, Some(body));

    let long_name = "n".repeat(101);
    for body in [
        json!({"username": "", "email": "a@example.com", "password": NEW_PASSWORD}),
        json!({"username": long_name, "email": "a@example.com", "password": NEW_PASSWORD}),
        json!({"username": "ann", "email": "not-an-email", "password": NEW_PASSWORD}),
        json!({"username": "ann", "email": "a@example.com", "password": "short"}),
        json!({"username": "ann", "email": "a@example.com"}),
        json!({"username": "ann", "email": "a@example.com", "password": NEW_PASSWORD, "role": "admin"}),
    ] {
        assert_eq!(register(body.clone()).await.status(), StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn activation_drops_cached_identity() {
    let h = harness_with(Options { cache: true, ..Options::default() }).await;
    let body = json_body(h.register("newcomer", "new@example.com").await).await;
    let token = body["token"].as_str().unwrap().to_owned();

    for _ in 0..2 {
        assert_eq!(h.as_user(5, Method::GET, "/v1/posts/1", None).await.status(), StatusCode::OK);
    }
    let before = h.identities.id_reads();

    let activated = h.call(Method::PUT, &format!("/v1/users/activate/{token}"), None, None).await;
    assert_eq!(activated.status(), StatusCode::NO_CONTENT);

    assert_eq!(h.as_user(5, Method::GET, "/v1/posts/1", None).await.status(), StatusCode::OK);
    assert_eq!(h.identities.id_reads() - before, 1, "the stale entry was dropped");
}

// ---------------------------------------------------------------------------
// Operational routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_open() {
    let h = harness().await;
    let response = h.call(Method::GET, "/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn debug_vars_require_basic_credentials() {
    let h = harness().await;

    let denied = h.call(Method::GET, "/v1/debug/vars", None, None).await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        denied.headers()[header::WWW_AUTHENTICATE],
        r#"Basic realm="restricted", charset="UTF-8""#
    );

    let wrong = BasicCredentials::new("ops", "guess").to_header_value();
    let denied = h.call(Method::GET, "/v1/debug/vars", Some(&wrong), None).await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let bearer = h.bearer(ADMIN);
    let denied = h.call(Method::GET, "/v1/debug/vars", Some(&bearer), None).await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let good = BasicCredentials::new("ops", "ops-pass").to_header_value();
    let response = h.call(Method::GET, "/v1/debug/vars", Some(&good), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let vars = json_body(response).await;
    assert!(vars["rate_limiter"]["allowed"].as_u64().unwrap() >= 4);
    assert_eq!(vars["cache"]["enabled"], false);
}

#[tokio::test]
async fn non_ascii_basic_header_is_malformed_with_challenge() {
    let h = harness().await;
    let request = Request::builder()
        .uri("/v1/debug/vars")
        .header(header::AUTHORIZATION, HeaderValue::from_bytes(b"Basic \xe9t\xe9").unwrap())
        .body(Body::empty())
        .unwrap();

    let response = h.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(json_body(response).await, json!({"error": "authorization header is malformed"}));
}

// ---------------------------------------------------------------------------
// Identity cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cached_identity_skips_store_on_second_request() {
    let h = harness_with(Options { cache: true, ..Options::default() }).await;
    let before = h.identities.id_reads();

    for _ in 0..3 {
        assert_eq!(h.as_user(OWNER, Method::GET, "/v1/posts/1", None).await.status(), StatusCode::OK);
    }
    assert_eq!(h.identities.id_reads() - before, 1, "only the first request reads the store");
}

#[tokio::test]
async fn uncached_identity_reads_store_every_time() {
    let h = harness().await;
    let before = h.identities.id_reads();

    for _ in 0..3 {
        assert_eq!(h.as_user(OWNER, Method::GET, "/v1/posts/1", None).await.status(), StatusCode::OK);
    }
    assert_eq!(h.identities.id_reads() - before, 3);
}
