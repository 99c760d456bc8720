//! Organization registration.

use sqlx::PgPool;
use tracing::info;

use crate::{
    auth::RequestContext,
    error::ServiceError,
    orgs::{models::Organization, repo::OrgRepo},
    storage,
};

#[derive(Clone)]
pub struct OrganizationService {
    pool: PgPool,
}

impl OrganizationService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers a new organization with the requester as its creator.
    ///
    /// The organization row, the creator's admin role, and the creator's
    /// membership are inserted in one transaction: all three or none.
    ///
    /// # Errors
    /// `Unauthorized` without an authenticated requester,
    /// `InvalidArgument` for an empty name or description, or any store
    /// failure.
    pub async fn register_new_organization(
        &self,
        ctx: &RequestContext,
        name: &str,
        description: &str,
    ) -> Result<Organization, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        let name = name.trim().to_string();
        let description = description.trim().to_string();
        if name.is_empty() || description.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "Name and description are required".to_string(),
            ));
        }

        let created_by = requester.id();
        let organization = storage::execute_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let organization_id =
                    OrgRepo::insert(conn, &name, &description, created_by).await?;
                OrgRepo::insert_admin(conn, organization_id, created_by).await?;
                OrgRepo::insert_member(conn, organization_id, created_by).await?;

                OrgRepo::find_by_id(conn, organization_id)
                    .await?
                    .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))
            })
        })
        .await?;

        info!(
            organization_id = organization.id,
            created_by, "Registered organization"
        );

        Ok(organization)
    }
}
