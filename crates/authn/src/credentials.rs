//! `Authorization` header parsing.
//!
//! Both schemes require exactly two space-separated parts with a
//! case-sensitive scheme name.

use base64::{Engine, engine::general_purpose::STANDARD};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// Realm advertised in `WWW-Authenticate` challenges for Basic-protected routes.
pub const BASIC_REALM: &str = "restricted";

/// Extracts the token from `Authorization: Bearer <token>`.
///
/// # Errors
///
/// - [`AuthError::MissingAuthorizationHeader`] when `header` is `None`
/// - [`AuthError::MalformedAuthorizationHeader`] when the header is not exactly `Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(AuthError::MissingAuthorizationHeader)?;
    match split_scheme(header) {
        Some(("Bearer", token)) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedAuthorizationHeader),
    }
}

/// A decoded `Authorization: Basic` credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// User name.
    pub username: String,
    /// Password, scrubbed from memory on drop.
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: Zeroizing::new(password.into()) }
    }

    /// Parses `Authorization: Basic <base64(user:pass)>`.
    ///
    /// The password is everything after the first `:`, so it may itself
    /// contain colons.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingAuthorizationHeader`] when `header` is `None`
    /// - [`AuthError::MalformedAuthorizationHeader`] for a wrong scheme, bad base64, non-UTF-8
    ///   content, or a missing `:`
    pub fn parse(header: Option<&str>) -> Result<Self> {
        let header = header.ok_or(AuthError::MissingAuthorizationHeader)?;
        let Some(("Basic", encoded)) = split_scheme(header) else {
            return Err(AuthError::MalformedAuthorizationHeader);
        };

        let decoded =
            STANDARD.decode(encoded).map_err(|_| AuthError::MalformedAuthorizationHeader)?;
        let decoded = Zeroizing::new(
            String::from_utf8(decoded).map_err(|_| AuthError::MalformedAuthorizationHeader)?,
        );
        let (username, password) =
            decoded.split_once(':').ok_or(AuthError::MalformedAuthorizationHeader)?;

        Ok(Self::new(username, password))
    }

    /// Encodes the pair as an `Authorization` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.username, self.password.as_str())))
    }

    /// Returns `true` when both parts equal `expected`'s.
    ///
    /// Compares every byte of both fields regardless of where the first
    /// difference is.
    #[must_use]
    pub fn matches(&self, expected: &BasicCredentials) -> bool {
        let user = self.username.as_bytes().ct_eq(expected.username.as_bytes());
        let pass = self.password.as_bytes().ct_eq(expected.password.as_bytes());
        bool::from(user & pass)
    }

    /// Parses `header` and checks it against `expected`.
    ///
    /// # Errors
    ///
    /// Parsing errors from [`parse`](Self::parse), or
    /// [`AuthError::InvalidBasicCredentials`] on a mismatch.
    pub fn verify(header: Option<&str>, expected: &BasicCredentials) -> Result<()> {
        let presented = Self::parse(header)?;
        if presented.matches(expected) {
            Ok(())
        } else {
            tracing::debug!(username = %presented.username, "basic credentials rejected");
            Err(AuthError::InvalidBasicCredentials)
        }
    }
}

/// Splits `"<scheme> <value>"` into exactly two parts.
fn split_scheme(header: &str) -> Option<(&str, &str)> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(value), None) => Some((scheme, value)),
        _ => None,
    }
}
