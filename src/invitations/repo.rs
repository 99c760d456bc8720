//! Invitation persistence: idempotent creation and status transitions.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::invitations::models::{Invitation, InvitationStatus};

const INVITATION_COLUMNS: &str = r"
    id, organization_id, created_by, intended_for, status,
    expires_at, created_at, updated_at, deleted_at
";

pub struct InvitationRepo;

impl InvitationRepo {
    /// Creates an invitation, or resolves to the existing row when one
    /// already exists for the same (organization, intended user) pair.
    ///
    /// The conflict arm updates a column to its own value so that
    /// `RETURNING id` yields the existing row's id; duplicate creates
    /// therefore never error and always converge on one row.
    ///
    /// # Errors
    /// Returns an error if the insert fails for any other reason, e.g.
    /// the creator is not an admin of the organization (composite
    /// foreign key).
    pub async fn create(
        conn: &mut PgConnection,
        organization_id: i64,
        created_by: i64,
        intended_for: i64,
        status: InvitationStatus,
        expires_at: DateTime<Utc>,
    ) -> Result<Invitation, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO invitations (organization_id, created_by, intended_for, status, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT unique_organization_invitation_intended_for
            DO UPDATE SET organization_id = EXCLUDED.organization_id
            RETURNING id
            ",
        )
        .bind(organization_id)
        .bind(created_by)
        .bind(intended_for)
        .bind(status.as_str())
        .bind(expires_at)
        .fetch_one(&mut *conn)
        .await?;

        Self::find_by_id(conn, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Finds a non-deleted invitation by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<Invitation>, sqlx::Error> {
        let query = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1 AND deleted_at IS NULL LIMIT 1"
        );
        sqlx::query_as::<_, Invitation>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// All non-deleted invitations addressed to a user, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_intended_for(
        conn: &mut PgConnection,
        user_id: i64,
    ) -> Result<Vec<Invitation>, sqlx::Error> {
        let query = format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE intended_for = $1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Invitation>(&query)
            .bind(user_id)
            .fetch_all(conn)
            .await
    }

    /// Moves an invitation to the given status.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_status(
        conn: &mut PgConnection,
        id: i64,
        status: InvitationStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE invitations
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Reopens a terminal invitation back to pending with a fresh expiry.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn reopen(
        conn: &mut PgConnection,
        id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE invitations
            SET status = $2, expires_at = $3, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .bind(InvitationStatus::Pending.as_str())
        .bind(expires_at)
        .execute(conn)
        .await?;

        Ok(())
    }
}
