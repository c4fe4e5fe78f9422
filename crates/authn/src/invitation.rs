//! Activation tokens for newly registered identities.
//!
//! The registrant receives a random token once; the store only ever sees its
//! SHA-256 digest. Redeeming the token hashes it again and looks the digest
//! up.

use std::time::Duration;

use chrono::{DateTime, Utc};
use gatehouse_storage::Invitation;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Default lifetime of an activation token (three days).
pub const DEFAULT_INVITATION_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// A freshly minted activation token and the record to store for it.
pub struct IssuedInvitation {
    /// Plain token handed to the registrant. Never persisted.
    pub token: Zeroizing<String>,
    /// Digest and expiry to persist.
    pub invitation: Invitation,
}

impl std::fmt::Debug for IssuedInvitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedInvitation")
            .field("token", &"<redacted>")
            .field("invitation", &self.invitation)
            .finish()
    }
}

/// Hex SHA-256 digest of a plain activation token.
#[must_use]
pub fn hash_invitation_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Mints a random activation token valid for `ttl` from `now`.
///
/// A `ttl` too large to represent saturates to the far future.
#[must_use]
pub fn issue_invitation(now: DateTime<Utc>, ttl: Duration) -> IssuedInvitation {
    let token = Zeroizing::new(Uuid::new_v4().to_string());
    let expires_at = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    IssuedInvitation {
        invitation: Invitation { token_hash: hash_invitation_token(&token), expires_at },
        token,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_lowercase_hex_sha256() {
        assert_eq!(
            hash_invitation_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_issued_invitation_stores_digest_not_token() {
        let now = Utc::now();
        let issued = issue_invitation(now, DEFAULT_INVITATION_TTL);

        assert_ne!(issued.invitation.token_hash, *issued.token);
        assert_eq!(issued.invitation.token_hash, hash_invitation_token(&issued.token));
        assert_eq!(issued.invitation.expires_at, now + chrono::Duration::days(3));
        assert!(!issued.invitation.is_expired_at(now));
        assert!(issued.invitation.is_expired_at(issued.invitation.expires_at));
    }

    #[test]
    fn test_tokens_are_unique() {
        let now = Utc::now();
        let a = issue_invitation(now, DEFAULT_INVITATION_TTL);
        let b = issue_invitation(now, DEFAULT_INVITATION_TTL);
        assert_ne!(*a.token, *b.token);
    }

    #[test]
    fn test_debug_redacts_token() {
        let issued = issue_invitation(Utc::now(), DEFAULT_INVITATION_TTL);
        let rendered = format!("{issued:?}");
        assert!(!rendered.contains(issued.token.as_str()));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_oversized_ttl_saturates() {
        let issued = issue_invitation(Utc::now(), Duration::MAX);
        assert_eq!(issued.invitation.expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
