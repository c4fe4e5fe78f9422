//! Identity and role records shared by every stage of the gate.
//!
//! Identifiers are strongly typed `i64` newtypes: passing a [`RoleId`] where
//! an [`IdentityId`] is expected is a compile-time error.

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Defines a newtype wrapper around `i64` for type-safe identifiers.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64`
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Serializes as a bare number
/// - Implements `From<i64>`, `Into<i64>` and `Display`
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier of an [`Identity`].
    ///
    /// This is the value carried in the `sub` claim of a bearer token.
    ///
    /// # Examples
    ///
    /// ```
    /// use gatehouse_storage::IdentityId;
    ///
    /// let id = IdentityId::from(42);
    /// assert_eq!(i64::from(id), 42);
    /// assert_eq!(id.to_string(), "42");
    /// ```
    IdentityId
);

define_id!(
    /// Unique identifier of a [`Role`] in the role catalog.
    RoleId
);

/// A named privilege level.
///
/// Roles form a total order by `level`: a higher level is strictly more
/// privileged, and anything permitted to a role is permitted to every role
/// at or above its level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Role {
    /// Catalog identifier.
    #[builder(into)]
    pub id: RoleId,
    /// Unique role name (`"user"`, `"moderator"`, `"admin"`).
    #[builder(into)]
    pub name: String,
    /// Precedence level; higher means more privilege.
    pub level: i32,
    /// Human-readable description.
    #[builder(into, default)]
    pub description: String,
}

impl Role {
    /// Returns `true` if this role's level is at least `required`'s level.
    #[must_use]
    pub fn outranks_or_equals(&self, required: &Role) -> bool {
        self.level >= required.level
    }
}

/// A registered caller.
///
/// The cache stores whole identities, so every field round-trips through
/// serde. HTTP responses expose a narrower view without `password_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Identity {
    /// Unique identifier.
    #[builder(into)]
    pub id: IdentityId,
    /// Display handle.
    #[builder(into)]
    pub username: String,
    /// Contact address, unique across identities.
    #[builder(into)]
    pub email: String,
    /// PHC-formatted password hash.
    #[builder(into, default)]
    pub password_hash: String,
    /// Whether the identity completed activation.
    #[builder(default = true)]
    pub is_active: bool,
    /// Creation timestamp.
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    /// Assigned role.
    pub role: Role,
}

/// A pending activation for a newly registered identity.
///
/// Only the digest of the token handed to the registrant is kept, so a
/// leaked table cannot be replayed against the activation route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    /// Hex SHA-256 digest of the plain activation token.
    pub token_hash: String,
    /// Instant from which the invitation can no longer be redeemed.
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn role(name: &str, level: i32) -> Role {
        Role::builder().id(level as i64).name(name).level(level).build()
    }

    #[test]
    fn test_id_serializes_transparently() {
        let json = serde_json::to_string(&IdentityId::from(7)).unwrap();
        assert_eq!(json, "7");
        let back: IdentityId = serde_json::from_str("7").unwrap();
        assert_eq!(back, IdentityId(7));
    }

    #[test]
    fn test_role_precedence() {
        let user = role("user", 1);
        let moderator = role("moderator", 2);
        let admin = role("admin", 3);

        assert!(admin.outranks_or_equals(&moderator));
        assert!(moderator.outranks_or_equals(&moderator));
        assert!(!user.outranks_or_equals(&moderator));
    }

    #[test]
    fn test_identity_builder_defaults() {
        let identity = Identity::builder()
            .id(IdentityId(1))
            .username("ada")
            .email("ada@example.com")
            .role(role("user", 1))
            .build();

        assert!(identity.is_active);
        assert!(identity.password_hash.is_empty());
        assert_eq!(identity.id, IdentityId(1));
    }

    #[test]
    fn test_identity_json_round_trip() {
        let identity = Identity::builder()
            .id(IdentityId(9))
            .username("grace")
            .email("grace@example.com")
            .password_hash("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA")
            .role(role("admin", 3))
            .build();

        let json = serde_json::to_string(&identity).unwrap();
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
    }
}
