//! User persistence. Lookups go through the email hash so queries never
//! see plaintext; rows are decrypted into entities on the way out.

use std::sync::Arc;

use sqlx::{PgConnection, Row, postgres::PgRow};

use crate::{crypto::EmailCodec, error::ServiceError, users::models::User};

const USER_COLUMNS: &str = r"
    id, email_hash, email_encrypted, encryption_version,
    email_verified, username, created_at, updated_at, deleted_at
";

#[derive(Clone)]
pub struct UserRepo {
    codec: Arc<EmailCodec>,
}

impl UserRepo {
    #[must_use]
    pub fn new(codec: Arc<EmailCodec>) -> Self {
        Self { codec }
    }

    /// Finds a non-deleted user by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored email cannot be
    /// decrypted.
    pub async fn find_by_id(
        &self,
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<User>, ServiceError> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL LIMIT 1");
        let row = sqlx::query(&query).bind(id).fetch_optional(conn).await?;

        row.map(|row| self.entity_from_row(&row)).transpose()
    }

    /// Finds a non-deleted user by email, via the deterministic hash.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored email cannot be
    /// decrypted.
    pub async fn find_by_email(
        &self,
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<User>, ServiceError> {
        let email_hash = self.codec.hash_email(email);
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email_hash = $1 AND deleted_at IS NULL LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(email_hash)
            .fetch_optional(conn)
            .await?;

        row.map(|row| self.entity_from_row(&row)).transpose()
    }

    /// Inserts a new user, storing the email hash and ciphertext.
    ///
    /// # Errors
    /// Returns an error if encryption fails, the insert fails (including
    /// a duplicate email hash), or the created row cannot be read back.
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        email: &str,
        username: &str,
        email_verified: bool,
    ) -> Result<User, ServiceError> {
        let processed = self.codec.process_email(email)?;

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO users (email_hash, email_encrypted, encryption_version, email_verified, username)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(&processed.hash)
        .bind(&processed.ciphertext)
        .bind(processed.version)
        .bind(email_verified)
        .bind(username)
        .fetch_one(&mut *conn)
        .await?;

        self.find_by_id(conn, id)
            .await?
            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))
    }

    /// Ids of organizations where the user holds membership.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn organization_membership_ids(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
    ) -> Result<Vec<i64>, ServiceError> {
        let ids = sqlx::query_scalar(
            r"
            SELECT organization_id
            FROM organization_members
            WHERE user_id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(ids)
    }

    /// Ids of organizations where the user holds the admin role.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn organization_admin_ids(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
    ) -> Result<Vec<i64>, ServiceError> {
        let ids = sqlx::query_scalar(
            r"
            SELECT organization_id
            FROM organization_admins
            WHERE user_id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(ids)
    }

    fn entity_from_row(&self, row: &PgRow) -> Result<User, ServiceError> {
        let email_encrypted: String = row.try_get("email_encrypted")?;
        let encryption_version: i16 = row.try_get("encryption_version")?;
        let email = self
            .codec
            .decrypt_email(&email_encrypted, encryption_version)?;

        Ok(User {
            id: row.try_get("id")?,
            email,
            email_hash: row.try_get("email_hash")?,
            email_verified: row.try_get("email_verified")?,
            username: row.try_get("username")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}
