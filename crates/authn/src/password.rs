//! Password hashing and email/password login.

use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use gatehouse_storage::{Identity, IdentityStore, with_deadline};

use crate::error::{AuthError, Result};

/// Hashes `password` with Argon2id and a fresh random salt.
///
/// Returns the PHC string to store in [`Identity::password_hash`].
///
/// # Errors
///
/// Returns [`AuthError::PasswordHash`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Checks `password` against a stored PHC hash.
///
/// # Errors
///
/// - [`AuthError::PasswordHash`] if `stored_hash` is not a valid PHC string
/// - [`AuthError::InvalidLogin`] if the password does not match
pub fn verify_password(password: &str, stored_hash: &str) -> Result<()> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidLogin)
}

/// Looks up `email` and checks `password`, returning the identity on success.
///
/// The Argon2 check runs on the blocking pool so it never stalls the
/// request workers. Unknown emails, inactive identities, identities with no
/// stored hash, and wrong passwords are all reported the same way.
///
/// # Errors
///
/// - [`AuthError::InvalidLogin`] when the pair does not identify an active identity
/// - [`AuthError::Storage`] when the store fails or exceeds `timeout`
/// - [`AuthError::PasswordHash`] when the stored hash is corrupt
#[tracing::instrument(skip(store, password))]
pub async fn login(
    store: &dyn IdentityStore,
    email: &str,
    password: &str,
    timeout: Duration,
) -> Result<Identity> {
    let identity =
        match with_deadline("identity_store.get_by_email", timeout, store.get_identity_by_email(email))
            .await
        {
            Ok(identity) => identity,
            Err(err) if err.is_not_found() => return Err(AuthError::InvalidLogin),
            Err(err) => return Err(AuthError::storage(err)),
        };

    if !identity.is_active || identity.password_hash.is_empty() {
        tracing::debug!(identity_id = %identity.id, "login refused for inactive identity");
        return Err(AuthError::InvalidLogin);
    }

    let password = password.to_owned();
    let stored_hash = identity.password_hash.clone();
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AuthError::PasswordHash(format!("verification task failed: {e}")))??;

    tracing::debug!(identity_id = %identity.id, "login succeeded");
    Ok(identity)
}
