//! Shared test utilities for authentication testing.
//!
//! Helpers for minting tokens with arbitrary claims, crafting raw token
//! strings for attack tests, and asserting on [`AuthError`] variants.
//! Feature-gated behind `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! gatehouse-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use gatehouse_authn::testutil::{TEST_ISSUER, TEST_SECRET, test_authenticator};
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;

use crate::jwt::TokenAuthenticator;

/// Signing secret used by [`test_authenticator`].
pub const TEST_SECRET: &[u8] = b"gatehouse-test-secret";

/// Issuer and audience used by [`test_authenticator`].
pub const TEST_ISSUER: &str = "gatehouse-test";

/// An authenticator keyed with [`TEST_SECRET`] for [`TEST_ISSUER`].
#[must_use]
pub fn test_authenticator() -> TokenAuthenticator {
    TokenAuthenticator::new(TEST_SECRET, TEST_ISSUER)
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_secs() -> u64 {
    Utc::now().timestamp() as u64
}

/// Claims for `sub` valid from `nbf` until `exp`, as raw JSON.
#[must_use]
pub fn claims_json(sub: i64, nbf: u64, exp: u64) -> serde_json::Value {
    json!({
        "sub": sub,
        "iss": TEST_ISSUER,
        "aud": TEST_ISSUER,
        "iat": nbf,
        "nbf": nbf,
        "exp": exp,
    })
}

/// Signs arbitrary JSON claims with `secret` under `alg`.
///
/// # Panics
///
/// Panics if encoding fails (e.g. `alg` is not an HMAC algorithm).
#[must_use]
pub fn sign_json(secret: &[u8], alg: Algorithm, claims: &serde_json::Value) -> String {
    jsonwebtoken::encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret))
        .expect("failed to encode test token")
}

/// A token for `sub` that expired `ago_secs` seconds ago.
#[must_use]
pub fn expired_token(sub: i64, ago_secs: u64) -> String {
    let now = now_secs();
    sign_json(
        TEST_SECRET,
        Algorithm::HS256,
        &claims_json(sub, now - 3_600 - ago_secs, now - ago_secs),
    )
}

/// Builds a raw token from header and payload JSON with a fake signature.
#[must_use]
pub fn craft_raw_jwt(header: &serde_json::Value, payload: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(b"not-a-real-signature");
    format!("{header_b64}.{payload_b64}.{signature_b64}")
}

/// Assert that a [`Result`](crate::Result) failed with the given
/// [`AuthError`](crate::AuthError) variant pattern.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use gatehouse_authn::{AuthError, assert_auth_error};
///
/// let result: gatehouse_authn::Result<()> = Err(AuthError::Expired);
/// assert_auth_error!(result, AuthError::Expired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {},
            other => panic!("expected {}, got: {:?}", stringify!($pattern), other),
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::AuthError;

    #[test]
    fn test_claims_json_verifies() {
        let now = now_secs();
        let token = sign_json(TEST_SECRET, Algorithm::HS256, &claims_json(3, now, now + 60));
        let claims = test_authenticator().verify(&token).unwrap();
        assert_eq!(claims.sub.0, 3);
    }

    #[test]
    fn test_expired_token_is_expired() {
        assert_auth_error!(test_authenticator().verify(&expired_token(3, 10)), AuthError::Expired);
    }

    #[test]
    fn test_crafted_token_fails_signature() {
        let now = now_secs();
        let token =
            craft_raw_jwt(&json!({"alg": "HS256", "typ": "JWT"}), &claims_json(3, now, now + 60));
        assert_auth_error!(test_authenticator().verify(&token), AuthError::SignatureMismatch);
    }
}
