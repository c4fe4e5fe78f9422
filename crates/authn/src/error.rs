//! Authentication error types.
//!
//! Every stage of the gate that can reject a caller reports an [`AuthError`].
//! The HTTP boundary maps each variant to exactly one status; see
//! [`AuthError::is_credential_failure`] for the classification it relies on.

use gatehouse_storage::StorageError;
use thiserror::Error;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The token is structurally malformed and cannot be decoded.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The token signature does not match its content under our key.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The current time is at or past the token's `exp`.
    #[error("token expired")]
    Expired,

    /// The current time is before the token's `nbf`.
    #[error("token not yet valid")]
    NotYetValid,

    /// The `sub` claim is not a positive integer identifier.
    #[error("malformed subject: {0}")]
    MalformedSubject(String),

    /// The `iss` claim does not name this service.
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),

    /// The `aud` claim does not name this service.
    #[error("invalid audience: {0}")]
    InvalidAudience(String),

    /// The token header names an algorithm other than HS256.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No `Authorization` header was sent.
    #[error("authorization header is missing")]
    MissingAuthorizationHeader,

    /// The `Authorization` header is not `<scheme> <value>` with the expected scheme.
    #[error("authorization header is malformed")]
    MalformedAuthorizationHeader,

    /// Basic credentials decoded but did not match.
    #[error("invalid credentials")]
    InvalidBasicCredentials,

    /// Email and password did not identify an active identity.
    #[error("invalid email or password")]
    InvalidLogin,

    /// A verified token names an identity that no longer exists.
    #[error("identity not found: {id}")]
    IdentityNotFound {
        /// Identifier from the token subject.
        id: i64,
    },

    /// An authorization rule requires a role the catalog does not define.
    #[error("role not found: {name}")]
    RoleNotFound {
        /// Name of the missing role.
        name: String,
    },

    /// A token could not be signed.
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// A stored password hash could not be parsed or a new one computed.
    #[error("password hash error: {0}")]
    PasswordHash(String),

    /// A collaborator (store, cache, catalog) failed or timed out.
    ///
    /// Wraps the original [`StorageError`] to keep the source chain for
    /// structured logging.
    #[error("collaborator error: {0}")]
    Storage(#[source] StorageError),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidCredential`].
    #[must_use]
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential(message.into())
    }

    /// Creates an [`AuthError::MalformedSubject`].
    #[must_use]
    pub fn malformed_subject(subject: impl Into<String>) -> Self {
        Self::MalformedSubject(subject.into())
    }

    /// Creates an [`AuthError::RoleNotFound`].
    #[must_use]
    pub fn role_not_found(name: impl Into<String>) -> Self {
        Self::RoleNotFound { name: name.into() }
    }

    /// Creates an [`AuthError::Storage`].
    #[must_use]
    pub fn storage(err: StorageError) -> Self {
        Self::Storage(err)
    }

    /// Returns `true` when the caller failed to prove who they are.
    ///
    /// These map to `401 Unauthorized`. Everything else is either a policy
    /// decision made elsewhere or a server-side failure.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential(_)
                | Self::SignatureMismatch
                | Self::Expired
                | Self::NotYetValid
                | Self::MalformedSubject(_)
                | Self::InvalidIssuer(_)
                | Self::InvalidAudience(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::MissingAuthorizationHeader
                | Self::MalformedAuthorizationHeader
                | Self::InvalidBasicCredentials
                | Self::InvalidLogin
                | Self::IdentityNotFound { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => AuthError::invalid_credential("invalid token structure"),
            ErrorKind::InvalidSignature => AuthError::SignatureMismatch,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            ErrorKind::InvalidAudience => {
                AuthError::InvalidAudience("audience validation failed".into())
            },
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer("issuer validation failed".into()),
            ErrorKind::InvalidAlgorithm => {
                AuthError::UnsupportedAlgorithm("algorithm not accepted".into())
            },
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::invalid_credential(format!("missing claim: {claim}"))
            },
            _ => AuthError::invalid_credential(format!("token error: {err}")),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
