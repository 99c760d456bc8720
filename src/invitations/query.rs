//! Read-side invitation queries: email-keyed lookups and the admin
//! search over the joined view.

use std::sync::Arc;

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::{
    crypto::EmailCodec,
    invitations::models::{Invitation, InvitationStatus, InvitationView},
};

pub const DEFAULT_SEARCH_LIMIT: i64 = 100;

const VIEW_COLUMNS: &str = r"
    i.id,
    i.organization_id,
    o.name AS organization_name,
    i.created_by AS inviter_id,
    inviter.username AS inviter_name,
    i.intended_for AS invitee_id,
    invitee.username AS invitee_name,
    i.status AS invitation_status,
    i.expires_at,
    i.created_at,
    i.updated_at
";

const VIEW_JOINS: &str = r"
    FROM invitations i
    INNER JOIN organizations o ON i.organization_id = o.id
    INNER JOIN users inviter ON i.created_by = inviter.id
    INNER JOIN users invitee ON i.intended_for = invitee.id
";

// Soft-deletion must be filtered on every joined table.
const VIEW_LIVENESS: &str = r"
    i.deleted_at IS NULL
    AND o.deleted_at IS NULL
    AND inviter.deleted_at IS NULL
    AND invitee.deleted_at IS NULL
";

/// Search filters for organization invitations. Unset fields do not
/// constrain the result.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub organization_id: i64,
    pub intended_for: Option<i64>,
    pub statuses: Vec<InvitationStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl SearchParams {
    /// Defaults: every known status, first 100 rows.
    #[must_use]
    pub fn new(organization_id: i64) -> Self {
        Self {
            organization_id,
            intended_for: None,
            statuses: InvitationStatus::ALL.to_vec(),
            limit: DEFAULT_SEARCH_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Clone)]
pub struct InvitationQuery {
    codec: Arc<EmailCodec>,
}

impl InvitationQuery {
    #[must_use]
    pub fn new(codec: Arc<EmailCodec>) -> Self {
        Self { codec }
    }

    /// Finds the active invitation addressed to `email` within an
    /// organization, resolving the email through its deterministic hash.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_intended_email(
        &self,
        conn: &mut PgConnection,
        organization_id: i64,
        email: &str,
    ) -> Result<Option<Invitation>, sqlx::Error> {
        let email_hash = self.codec.hash_email(email);

        sqlx::query_as::<_, Invitation>(
            r"
            SELECT i.id, i.organization_id, i.created_by, i.intended_for, i.status,
                   i.expires_at, i.created_at, i.updated_at, i.deleted_at
            FROM invitations i
            INNER JOIN users u ON i.intended_for = u.id
            WHERE u.email_hash = $1
              AND i.organization_id = $2
              AND i.deleted_at IS NULL
              AND u.deleted_at IS NULL
            LIMIT 1
            ",
        )
        .bind(email_hash)
        .bind(organization_id)
        .fetch_optional(conn)
        .await
    }

    /// Loads the joined view of one invitation.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_view_by_id(
        &self,
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<InvitationView>, sqlx::Error> {
        let query = format!(
            "SELECT {VIEW_COLUMNS} {VIEW_JOINS} WHERE {VIEW_LIVENESS} AND i.id = $1 LIMIT 1"
        );
        sqlx::query_as::<_, InvitationView>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Invitations addressed to a user, any status, newest first.
    ///
    /// An empty result is an empty vector; callers decide whether that
    /// is a not-found condition.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_views_intended_for(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvitationView>, sqlx::Error> {
        let query = format!(
            "SELECT {VIEW_COLUMNS} {VIEW_JOINS}
             WHERE {VIEW_LIVENESS} AND i.intended_for = $1
             ORDER BY i.created_at DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, InvitationView>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(conn)
            .await
    }

    /// Searches an organization's invitations with the given filters.
    ///
    /// Status matching is case-insensitive by construction: statuses are
    /// typed and stored in their canonical lowercase form.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn search(
        &self,
        conn: &mut PgConnection,
        params: &SearchParams,
    ) -> Result<Vec<InvitationView>, sqlx::Error> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {VIEW_COLUMNS} {VIEW_JOINS} WHERE {VIEW_LIVENESS}"));

        builder.push(" AND i.organization_id = ");
        builder.push_bind(params.organization_id);

        if let Some(intended_for) = params.intended_for {
            builder.push(" AND i.intended_for = ");
            builder.push_bind(intended_for);
        }

        let statuses: Vec<String> = params
            .statuses
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();
        builder.push(" AND i.status = ANY(");
        builder.push_bind(statuses);
        builder.push(")");

        builder.push(" ORDER BY i.created_at DESC LIMIT ");
        builder.push_bind(params.limit);
        builder.push(" OFFSET ");
        builder.push_bind(params.offset);

        builder
            .build_query_as::<InvitationView>()
            .fetch_all(conn)
            .await
    }
}
