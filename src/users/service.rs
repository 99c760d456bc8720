//! Identity-backed user provisioning.

use sqlx::PgPool;
use tracing::info;

use crate::{
    auth::provider::IdentityClaims,
    error::ServiceError,
    storage,
    users::{models::User, repo::UserRepo},
};

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    users: UserRepo,
}

impl UserService {
    #[must_use]
    pub fn new(pool: PgPool, users: UserRepo) -> Self {
        Self { pool, users }
    }

    /// Sign-up via a third-party identity provider.
    ///
    /// The provider's verified email is the identity key: if a user with
    /// that email already exists, it is returned unchanged; otherwise a
    /// new account is created from the claims. Concurrent first logins
    /// converge on one row through the unique email-hash constraint.
    ///
    /// # Errors
    /// Returns an error if the claims carry an invalid email or the
    /// store fails.
    pub async fn sign_up_via_identity(
        &self,
        claims: &IdentityClaims,
    ) -> Result<User, ServiceError> {
        if !super::valid_email(&claims.email) {
            return Err(ServiceError::InvalidArgument(
                "Identity provider returned an invalid email address".to_string(),
            ));
        }

        let mut conn = self.pool.acquire().await?;

        if let Some(user) = self.users.find_by_email(&mut conn, &claims.email).await? {
            return Ok(user);
        }

        let username = claims
            .name
            .clone()
            .unwrap_or_else(|| claims.email.clone());

        match self
            .users
            .create(&mut conn, &claims.email, &username, claims.email_verified)
            .await
        {
            Ok(user) => {
                info!(user_id = user.id, "Created user from identity claims");
                Ok(user)
            }
            // Another request created the same user first; return theirs.
            Err(ServiceError::Database(err)) if storage::is_unique_violation(&err) => self
                .users
                .find_by_email(&mut conn, &claims.email)
                .await?
                .ok_or(ServiceError::Database(sqlx::Error::RowNotFound)),
            Err(err) => Err(err),
        }
    }
}
