//! Route table and gate ordering.
//!
//! Layers added later wrap earlier ones, so each group lists its stages
//! innermost first. Admission wraps every route; tracing wraps admission so
//! rejected requests are logged too.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::Handler,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use gatehouse_storage::{ROLE_ADMIN, ROLE_MODERATOR};

use crate::{
    handlers,
    middleware::{
        RoleGuard, admit, authorize_post, load_post, load_user, require_basic, require_bearer,
        trace_request,
    },
    state::AppState,
};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Builds the `/v1` router over `state`.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// admission can key on the peer address.
pub fn router(state: AppState) -> Router {
    let post_item = Router::new()
        .route(
            "/v1/posts/{id}",
            get(handlers::get_post)
                .patch(handlers::update_post.layer(from_fn_with_state(
                    RoleGuard::new(state.clone(), ROLE_MODERATOR),
                    authorize_post,
                )))
                .delete(handlers::delete_post.layer(from_fn_with_state(
                    RoleGuard::new(state.clone(), ROLE_ADMIN),
                    authorize_post,
                ))),
        )
        .route_layer(from_fn_with_state(state.clone(), load_post));

    let user_item = Router::new()
        .route("/v1/users/{id}", get(handlers::get_user))
        .route("/v1/users/{id}/follow", put(handlers::follow))
        .route("/v1/users/{id}/unfollow", put(handlers::unfollow))
        .route_layer(from_fn_with_state(state.clone(), load_user));

    let bearer = Router::new()
        .route("/v1/posts", post(handlers::create_post))
        .merge(post_item)
        .merge(user_item)
        .route_layer(from_fn_with_state(state.clone(), require_bearer));

    let basic = Router::new()
        .route("/v1/debug/vars", get(handlers::debug_vars))
        .route_layer(from_fn_with_state(state.clone(), require_basic));

    let open = Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/authentication/token", post(handlers::issue_token))
        .route("/v1/authentication/user", post(handlers::register_user))
        .route("/v1/users/activate/{token}", put(handlers::activate_user));

    Router::new()
        .merge(open)
        .merge(basic)
        .merge(bearer)
        .layer(from_fn_with_state(state.clone(), admit))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(trace_request))
        .with_state(state)
}
