//! HTTP error mapping.
//!
//! Every rejection the gate or a handler produces becomes an [`ApiError`],
//! which renders as `{"error": "<message>"}` with exactly one status code.
//! Internal failures are logged with their full source chain and reach the
//! caller only as "something went wrong".

use std::{error::Error as StdError, time::Duration};

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use gatehouse_authn::{AuthError, BASIC_REALM};
use gatehouse_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Boxed error kept for logging.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A terminal response from the gate or a handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// 400: the request body or path was unusable.
    #[error("{0}")]
    BadRequest(String),

    /// 401 for a Bearer-protected route.
    #[error("{0}")]
    Unauthorized(String),

    /// 401 for a Basic-protected route; carries a `WWW-Authenticate` challenge.
    #[error("{0}")]
    UnauthorizedBasic(String),

    /// 403: authenticated but not permitted.
    #[error("forbidden")]
    Forbidden,

    /// 404: the addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// 409: the request conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// 429: the caller exceeded its admission quota.
    #[error("rate limit exceeded, retry after: {}", humantime::format_duration(*.retry_after))]
    RateLimited {
        /// Time until the caller's window resets, rounded to milliseconds.
        retry_after: Duration,
    },

    /// 500: a collaborator failed or an invariant broke.
    #[error("something went wrong")]
    Internal(#[source] BoxError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    /// A 429 for a denial with `retry_after` left in the window.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        let millis = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
        Self::RateLimited { retry_after: Duration::from_millis(millis) }
    }

    /// A 500 wrapping any error.
    #[must_use]
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    /// A 404 naming what was missing.
    #[must_use]
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    /// Converts an authentication error for a Basic-protected route.
    #[must_use]
    pub fn from_basic(err: AuthError) -> Self {
        if err.is_credential_failure() {
            Self::UnauthorizedBasic(err.to_string())
        } else {
            Self::from(err)
        }
    }

    /// The status code this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::UnauthorizedBasic(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Renders `err` and every source below it, outermost first.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Whole seconds for a `Retry-After` header: rounded up, at least one.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(source) => {
                tracing::error!(error = %error_chain(source.as_ref()), "internal server error");
            },
            Self::RateLimited { retry_after } => {
                tracing::warn!(retry_after_ms = retry_after.as_millis() as u64, "rate limited");
            },
            other => tracing::debug!(%status, error = %other, "request rejected"),
        }

        let message = self.to_string();
        let mut response = (status, Json(ErrorBody { error: &message })).into_response();

        match &self {
            Self::UnauthorizedBasic(_) => {
                let challenge = format!(r#"Basic realm="{BASIC_REALM}", charset="UTF-8""#);
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
                }
            },
            Self::RateLimited { retry_after } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*retry_after)));
            },
            _ => {},
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_credential_failure() {
            return Self::Unauthorized(err.to_string());
        }
        // Missing roles, signing failures and collaborator outages are ours, not the caller's.
        Self::internal(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, .. } => Self::not_found(kind),
            StorageError::Conflict { message } => Self::Conflict(message),
            other => Self::internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
