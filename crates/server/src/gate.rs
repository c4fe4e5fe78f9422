//! The ordered request gate.
//!
//! ```text
//! Start → Admitted → Caller (token verified, identity resolved)
//!       → Loaded<R> → Authorized<R> → handler
//! ```
//!
//! Every stage takes the previous stage's result by reference, so the
//! stages cannot be called out of order. Any failure is terminal: the
//! caller gets the error's response and no later stage runs.

use std::{sync::Arc, time::Duration};

use gatehouse_authn::{
    BasicCredentials, IdentityResolver, RoleAuthorizer, TokenAuthenticator, bearer_token,
};
use gatehouse_ratelimit::FixedWindowLimiter;
use gatehouse_storage::Identity;

use crate::{
    context::{Admitted, Authorized, Caller},
    error::ApiError,
    resources::Owned,
};

/// The four gate components, shared by every request.
#[derive(Debug)]
pub struct Gate {
    limiter: Arc<FixedWindowLimiter>,
    tokens: TokenAuthenticator,
    resolver: IdentityResolver,
    authorizer: RoleAuthorizer,
    basic: BasicCredentials,
}

#[bon::bon]
impl Gate {
    /// Assembles a gate from its components.
    #[builder]
    pub fn new(
        limiter: Arc<FixedWindowLimiter>,
        tokens: TokenAuthenticator,
        resolver: IdentityResolver,
        authorizer: RoleAuthorizer,
        basic: BasicCredentials,
    ) -> Self {
        Self { limiter, tokens, resolver, authorizer, basic }
    }

    /// The admission limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<FixedWindowLimiter> {
        &self.limiter
    }

    /// The token authenticator, also used to issue tokens at login.
    #[must_use]
    pub fn tokens(&self) -> &TokenAuthenticator {
        &self.tokens
    }

    /// The identity resolver.
    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Counts the request against `key` and admits or rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::RateLimited`] when `key` is over its quota.
    pub fn admit(&self, key: &str) -> Result<Admitted, ApiError> {
        let admission = self.limiter.allow(key);
        if admission.permitted {
            Ok(Admitted::new(key))
        } else {
            Err(ApiError::rate_limited(admission.retry_after))
        }
    }

    /// Verifies the bearer token in `header` and resolves its subject.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Unauthorized`] for a missing, malformed, invalid or expired credential, or a
    ///   subject that no longer exists
    /// - [`ApiError::Internal`] when identity resolution fails for any other reason
    #[tracing::instrument(skip_all, fields(key = admitted.key()))]
    pub async fn authenticate(
        &self,
        admitted: &Admitted,
        header: Option<&str>,
    ) -> Result<Caller, ApiError> {
        let token = bearer_token(header)?;
        let claims = self.tokens.verify(token)?;
        let identity = self.resolver.resolve(claims.sub).await?;
        tracing::debug!(identity_id = %identity.id, role = %identity.role.name, "caller authenticated");
        Ok(Caller { identity: Arc::new(identity), claims })
    }

    /// Clears `caller` to act on `resource` as its owner or with at least
    /// `required_role`.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Forbidden`] when the caller is neither owner nor privileged enough
    /// - [`ApiError::Internal`] when the role is unknown or the catalog fails
    #[tracing::instrument(
        skip_all,
        fields(caller_id = %caller.identity.id, required_role = required_role)
    )]
    pub async fn authorize<R: Owned>(
        &self,
        caller: &Caller,
        resource: Arc<R>,
        required_role: &str,
    ) -> Result<Authorized<R>, ApiError> {
        let permitted =
            self.authorizer.authorize(&caller.identity, resource.owner(), required_role).await?;
        if !permitted {
            tracing::debug!(owner = %resource.owner(), "caller lacks ownership and role");
            return Err(ApiError::Forbidden);
        }
        Ok(Authorized::new(caller.clone(), resource))
    }

    /// Checks Basic credentials for operational routes.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnauthorizedBasic`] on any mismatch, so the
    /// response carries a challenge.
    pub fn verify_basic(&self, _admitted: &Admitted, header: Option<&str>) -> Result<(), ApiError> {
        BasicCredentials::verify(header, &self.basic).map_err(ApiError::from_basic)
    }

    /// Issues a token for a freshly logged-in identity.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if signing fails.
    pub fn issue_token(&self, identity: &Identity, ttl: Duration) -> Result<String, ApiError> {
        let claims = self.tokens.claims_for(identity.id, ttl);
        self.tokens.issue(&claims).map_err(ApiError::internal)
    }
}
