//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs signed with a secret known only to this process.
//! Issuer and audience are the same string: the service issues tokens for
//! itself.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gatehouse_authn::TokenAuthenticator;
//! use gatehouse_storage::IdentityId;
//!
//! # fn example() -> Result<(), gatehouse_authn::AuthError> {
//! let authenticator = TokenAuthenticator::new(b"not-a-real-secret", "gatehouse");
//! let claims = authenticator.claims_for(IdentityId(42), Duration::from_secs(3_600));
//! let token = authenticator.issue(&claims)?;
//!
//! assert_eq!(authenticator.verify(&token)?, claims);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use gatehouse_storage::IdentityId;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, crypto, decode_header, encode};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Default lifetime of an issued token (three days).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// The only algorithm this service signs or accepts.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Registered claims carried by a bearer token.
///
/// Timestamps are seconds since the Unix epoch. A token is valid while
/// `nbf <= now < exp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the identity the token was issued to.
    pub sub: IdentityId,
    /// Issuer.
    pub iss: String,
    /// Audience; equal to the issuer.
    pub aud: String,
    /// Issued at.
    pub iat: u64,
    /// Not before.
    pub nbf: u64,
    /// Expiration time.
    pub exp: u64,
}

/// Claims as they arrive on the wire, before any of them is checked.
///
/// `sub` stays untyped so that an array or object subject is reported as a
/// malformed subject rather than a decode failure.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: serde_json::Value,
    iss: Option<String>,
    aud: Option<String>,
    #[serde(default)]
    iat: u64,
    nbf: Option<u64>,
    exp: Option<u64>,
}

fn required<T>(claim: Option<T>, name: &str) -> Result<T> {
    claim.ok_or_else(|| AuthError::invalid_credential(format!("missing claim: {name}")))
}

/// Issues and verifies HS256 bearer tokens.
///
/// Holds no mutable state; clone it freely or share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator").field("issuer", &self.issuer).finish_non_exhaustive()
    }
}

impl TokenAuthenticator {
    /// Creates an authenticator that signs with `secret` and accepts only
    /// tokens whose issuer and audience are both `issuer`.
    #[must_use]
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Returns the issuer (and audience) this authenticator uses.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Builds claims for `sub` valid from now for `ttl`.
    #[must_use]
    pub fn claims_for(&self, sub: IdentityId, ttl: Duration) -> Claims {
        self.claims_at(sub, ttl, unix_now())
    }

    /// Builds claims for `sub` valid from `now` for `ttl`.
    #[must_use]
    pub fn claims_at(&self, sub: IdentityId, ttl: Duration, now: u64) -> Claims {
        Claims {
            sub,
            iss: self.issuer.clone(),
            aud: self.issuer.clone(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl.as_secs()),
        }
    }

    /// Signs `claims` into a URL-safe token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if the claims cannot be encoded.
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(TOKEN_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verifies `token` against the current time.
    ///
    /// # Errors
    ///
    /// See [`verify_at`](Self::verify_at).
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, unix_now())
    }

    /// Verifies `token` as of `now` (seconds since the epoch).
    ///
    /// Checks, in order: structure, algorithm, signature, issuer and
    /// audience, expiry, not-before, subject.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredential`] for a malformed token or missing claim
    /// - [`AuthError::UnsupportedAlgorithm`] for any algorithm but HS256
    /// - [`AuthError::SignatureMismatch`] when the content was altered or signed with another key
    /// - [`AuthError::InvalidIssuer`] / [`AuthError::InvalidAudience`]
    /// - [`AuthError::Expired`] when `now >= exp`
    /// - [`AuthError::NotYetValid`] when `now < nbf`
    /// - [`AuthError::MalformedSubject`] when `sub` is not a positive integer
    #[tracing::instrument(skip(self, token))]
    pub fn verify_at(&self, token: &str, now: u64) -> Result<Claims> {
        if token.split('.').count() != 3 {
            return Err(AuthError::invalid_credential("token must have three segments"));
        }

        let header = decode_header(token)
            .map_err(|e| AuthError::invalid_credential(format!("failed to decode header: {e}")))?;
        if header.alg != TOKEN_ALGORITHM {
            tracing::debug!(alg = ?header.alg, "rejected token algorithm");
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let (signed, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| AuthError::invalid_credential("token must have three segments"))?;
        if !crypto::verify(signature, signed.as_bytes(), &self.decoding_key, TOKEN_ALGORITHM)? {
            return Err(AuthError::SignatureMismatch);
        }
        let raw = decode_claims(signed)?;

        let iss = required(raw.iss, "iss")?;
        if iss != self.issuer {
            return Err(AuthError::InvalidIssuer(iss));
        }
        let aud = required(raw.aud, "aud")?;
        if aud != self.issuer {
            return Err(AuthError::InvalidAudience(aud));
        }
        let exp = required(raw.exp, "exp")?;
        let nbf = required(raw.nbf, "nbf")?;

        if now >= exp {
            return Err(AuthError::Expired);
        }
        if now < nbf {
            return Err(AuthError::NotYetValid);
        }

        Ok(Claims { sub: parse_subject(&raw.sub)?, iss, aud, iat: raw.iat, nbf, exp })
    }
}

/// Decodes the payload segment of `header.payload` after the signature
/// has been checked.
fn decode_claims(signed: &str) -> Result<RawClaims> {
    let (_, payload) = signed
        .split_once('.')
        .ok_or_else(|| AuthError::invalid_credential("token must have three segments"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::invalid_credential(format!("failed to decode payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_credential(format!("failed to parse claims: {e}")))
}

/// Accepts a positive integer, either as a JSON number or a decimal string.
fn parse_subject(sub: &serde_json::Value) -> Result<IdentityId> {
    let id = match sub {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(IdentityId(id)),
        _ => Err(AuthError::malformed_subject(sub.to_string())),
    }
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
