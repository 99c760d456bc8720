//! Organization persistence: organizations plus the admin and member
//! join tables.

use sqlx::PgConnection;

use crate::orgs::models::{Organization, OrganizationMember};

pub struct OrgRepo;

impl OrgRepo {
    /// Finds a non-deleted organization by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<Organization>, sqlx::Error> {
        sqlx::query_as::<_, Organization>(
            r"
            SELECT id, name, description, is_active, created_by, created_at, updated_at, deleted_at
            FROM organizations
            WHERE id = $1 AND deleted_at IS NULL
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Inserts an organization row and returns its id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(
        conn: &mut PgConnection,
        name: &str,
        description: &str,
        created_by: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            INSERT INTO organizations (name, description, is_active, created_by)
            VALUES ($1, $2, TRUE, $3)
            RETURNING id
            ",
        )
        .bind(name)
        .bind(description)
        .bind(created_by)
        .fetch_one(conn)
        .await
    }

    /// Grants the admin role for an organization.
    ///
    /// # Errors
    /// Returns an error if the insert fails, including a duplicate
    /// (organization, user) pair.
    pub async fn insert_admin(
        conn: &mut PgConnection,
        organization_id: i64,
        user_id: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            INSERT INTO organization_admins (organization_id, user_id)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_one(conn)
        .await
    }

    /// Creates a membership row.
    ///
    /// The unique (organization, user) constraint is the safety net
    /// against concurrent duplicate inserts: the second insert fails
    /// rather than producing a second row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_member(
        conn: &mut PgConnection,
        organization_id: i64,
        user_id: i64,
    ) -> Result<OrganizationMember, sqlx::Error> {
        sqlx::query_as::<_, OrganizationMember>(
            r"
            INSERT INTO organization_members (organization_id, user_id)
            VALUES ($1, $2)
            RETURNING id, organization_id, user_id, created_at, updated_at, deleted_at
            ",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_one(conn)
        .await
    }

    /// Finds a non-deleted membership row by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_member_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<OrganizationMember>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationMember>(
            r"
            SELECT id, organization_id, user_id, created_at, updated_at, deleted_at
            FROM organization_members
            WHERE id = $1 AND deleted_at IS NULL
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Finds the non-deleted membership row for a (organization, user)
    /// pair.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_member(
        conn: &mut PgConnection,
        organization_id: i64,
        user_id: i64,
    ) -> Result<Option<OrganizationMember>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationMember>(
            r"
            SELECT id, organization_id, user_id, created_at, updated_at, deleted_at
            FROM organization_members
            WHERE organization_id = $1 AND user_id = $2 AND deleted_at IS NULL
            LIMIT 1
            ",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
    }
}
