//! Per-request authorization context.
//!
//! Flow Overview: read the bearer token, resolve it to provider claims,
//! match the claims' email to a local user, and load the user's
//! organization membership and admin sets once. Handlers pass the
//! resulting context into services, which decide what the caller may do.

pub mod provider;

pub use provider::{IdentityClaims, IdentityProvider, OidcUserinfoProvider, StaticIdentityProvider};

use std::collections::HashSet;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use sqlx::PgPool;
use tracing::error;

use crate::{error::ServiceError, users::{User, UserRepo}};

/// Snapshot of the caller's identity and organization roles, built once
/// per request and never shared across requests.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    user: User,
    member_of: HashSet<i64>,
    admin_of: HashSet<i64>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn new(user: User, member_of: HashSet<i64>, admin_of: HashSet<i64>) -> Self {
        Self {
            user,
            member_of,
            admin_of,
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.user.id
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn is_member_of_organization(&self, organization_id: i64) -> bool {
        self.member_of.contains(&organization_id)
    }

    #[must_use]
    pub fn is_admin_of_organization(&self, organization_id: i64) -> bool {
        self.admin_of.contains(&organization_id)
    }
}

/// Context handed to every service call. May be unauthenticated;
/// privileged operations check and fail with `UnauthorizedAccess`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    user: Option<AuthenticatedUser>,
}

impl RequestContext {
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self { user: None }
    }

    #[must_use]
    pub fn for_user(user: AuthenticatedUser) -> Self {
        Self { user: Some(user) }
    }

    #[must_use]
    pub fn authenticated(&self) -> Option<&AuthenticatedUser> {
        self.user.as_ref()
    }
}

/// Extracts the bearer token from the `Authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Builds the request context for the given headers.
///
/// A missing token, a token the provider rejects, or a provider email
/// with no local user all yield an unauthenticated context rather than
/// an error; only infrastructure faults propagate.
///
/// # Errors
/// Returns an error if the provider cannot be consulted or the store
/// fails.
pub async fn resolve_context(
    headers: &HeaderMap,
    pool: &PgPool,
    identity: &dyn IdentityProvider,
    users: &UserRepo,
) -> Result<RequestContext, ServiceError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(RequestContext::unauthenticated());
    };

    let claims = identity.verify(token).await.map_err(|err| {
        error!("Identity provider verification failed: {err}");
        ServiceError::Internal(err)
    })?;

    let Some(claims) = claims else {
        return Ok(RequestContext::unauthenticated());
    };

    let mut conn = pool.acquire().await?;

    let Some(user) = users.find_by_email(&mut conn, &claims.email).await? else {
        return Ok(RequestContext::unauthenticated());
    };

    let member_of: HashSet<i64> = users
        .organization_membership_ids(&mut conn, user.id)
        .await?
        .into_iter()
        .collect();
    let admin_of: HashSet<i64> = users
        .organization_admin_ids(&mut conn, user.id)
        .await?
        .into_iter()
        .collect();

    Ok(RequestContext::for_user(AuthenticatedUser::new(
        user, member_of, admin_of,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn user(id: i64) -> User {
        User {
            id,
            email: "user@example.com".to_string(),
            email_hash: "0".repeat(64),
            email_verified: true,
            username: "user".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_membership_checks_are_set_based() {
        let member_of: HashSet<i64> = [1, 2].into_iter().collect();
        let admin_of: HashSet<i64> = [2].into_iter().collect();
        let authenticated = AuthenticatedUser::new(user(42), member_of, admin_of);

        assert!(authenticated.is_member_of_organization(1));
        assert!(authenticated.is_member_of_organization(2));
        assert!(!authenticated.is_member_of_organization(3));
        assert!(authenticated.is_admin_of_organization(2));
        assert!(!authenticated.is_admin_of_organization(1));
        assert_eq!(authenticated.id(), 42);
    }

    #[test]
    fn test_unauthenticated_context() {
        let ctx = RequestContext::unauthenticated();
        assert!(ctx.authenticated().is_none());
    }
}
