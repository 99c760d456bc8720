//! The invitation lifecycle state machine.
//!
//! Creation is idempotent per (organization, target user): inviting
//! always converges to a pending or accepted invitation without erroring
//! on "already invited". Accept, reject, and cancel are one-way
//! transitions out of pending; re-inviting a rejected or cancelled user
//! reopens the same row.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::{
    auth::RequestContext,
    error::ServiceError,
    invitations::{
        models::{AcceptanceOperation, Invitation, InvitationStatus, InvitationView},
        query::{InvitationQuery, SearchParams},
        repo::InvitationRepo,
    },
    orgs::{models::OrganizationMember, repo::OrgRepo},
    storage,
    users::{repo::UserRepo, valid_email},
};

const INVITATION_TTL_DAYS: i64 = 14;

/// Raw, unvalidated search filters as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub statuses: Option<Vec<String>>,
    pub target_email: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Clone)]
pub struct InvitationService {
    pool: PgPool,
    users: UserRepo,
    query: InvitationQuery,
}

impl InvitationService {
    #[must_use]
    pub fn new(pool: PgPool, users: UserRepo, query: InvitationQuery) -> Self {
        Self { pool, users, query }
    }

    /// Creates (or converges on) an invitation for `target_email` to
    /// join `organization_id`. All invitations created here start as
    /// pending with a 14-day expiry.
    ///
    /// If an invitation for the pair already exists: pending and
    /// accepted rows are returned unchanged; rejected and cancelled rows
    /// are reopened to pending with a fresh expiry.
    ///
    /// # Errors
    /// `Unauthorized` without an authenticated requester, `Forbidden`
    /// when the requester does not administer the organization,
    /// `InvalidArgument` for a malformed email, `NotFound` when no user
    /// has the target email.
    pub async fn create_new_invitation(
        &self,
        ctx: &RequestContext,
        target_email: &str,
        organization_id: i64,
    ) -> Result<Invitation, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        if !requester.is_admin_of_organization(organization_id) {
            return Err(ServiceError::Forbidden(
                "Organization member invitation can only be created by an admin of the organization"
                    .to_string(),
            ));
        }

        if !valid_email(target_email) {
            return Err(ServiceError::InvalidArgument(
                "Invalid email address".to_string(),
            ));
        }

        let mut conn = self.pool.acquire().await?;

        if let Some(existing) = self
            .query
            .find_by_intended_email(&mut conn, organization_id, target_email)
            .await?
        {
            match existing.status {
                // Idempotent no-op: do not reset pending invitations and
                // never reopen accepted ones.
                InvitationStatus::Pending | InvitationStatus::Accepted => return Ok(existing),
                InvitationStatus::Rejected | InvitationStatus::Cancelled => {
                    let expires_at = Utc::now() + Duration::days(INVITATION_TTL_DAYS);
                    InvitationRepo::reopen(&mut conn, existing.id, expires_at).await?;
                    info!(invitation_id = existing.id, "Reopened invitation");

                    return InvitationRepo::find_by_id(&mut conn, existing.id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound("Invitation not found".to_string())
                        });
                }
            }
        }

        let target = self
            .users
            .find_by_email(&mut conn, target_email)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Target user with email {target_email} not found"
                ))
            })?;

        let expires_at = Utc::now() + Duration::days(INVITATION_TTL_DAYS);
        let invitation = InvitationRepo::create(
            &mut conn,
            organization_id,
            requester.id(),
            target.id,
            InvitationStatus::Pending,
            expires_at,
        )
        .await?;

        info!(
            invitation_id = invitation.id,
            organization_id, "Created invitation"
        );

        Ok(invitation)
    }

    /// All invitations addressed to the requester, any status.
    ///
    /// # Errors
    /// `Unauthorized` without an authenticated requester; `NotFound`
    /// when no invitations exist.
    pub async fn get_invitations_intended_to_user(
        &self,
        ctx: &RequestContext,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvitationView>, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        let mut conn = self.pool.acquire().await?;
        let invitations = self
            .query
            .find_views_intended_for(&mut conn, requester.id(), limit, offset)
            .await?;

        if invitations.is_empty() {
            return Err(ServiceError::NotFound("Invitation not found".to_string()));
        }

        Ok(invitations)
    }

    /// Admin search over an organization's invitations.
    ///
    /// Absent or invalid status filters fall back to every known
    /// status. A target email, when given, is resolved to a user id
    /// before searching.
    ///
    /// # Errors
    /// `Unauthorized` without an authenticated requester, `Forbidden`
    /// for non-admins, `NotFound` when the target email resolves to no
    /// user or the search matches nothing.
    pub async fn search_organization_member_invitations(
        &self,
        ctx: &RequestContext,
        organization_id: i64,
        filter: SearchFilter,
    ) -> Result<Vec<InvitationView>, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        if !requester.is_admin_of_organization(organization_id) {
            return Err(ServiceError::Forbidden(
                "Organization member invitations can only be searched by an admin of the organization"
                    .to_string(),
            ));
        }

        let mut params = SearchParams::new(organization_id);
        if let Some(limit) = filter.limit {
            params.limit = limit;
        }
        if let Some(offset) = filter.offset {
            params.offset = offset;
        }
        if let Some(statuses) = parse_statuses(filter.statuses.as_deref()) {
            params.statuses = statuses;
        }

        let mut conn = self.pool.acquire().await?;

        if let Some(target_email) = filter
            .target_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
        {
            let target = self
                .users
                .find_by_email(&mut conn, target_email)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Target user with email {target_email} not found"
                    ))
                })?;
            params.intended_for = Some(target.id);
        }

        let invitations = self.query.search(&mut conn, &params).await?;
        if invitations.is_empty() {
            return Err(ServiceError::NotFound("No invitations found".to_string()));
        }

        Ok(invitations)
    }

    /// Accepts an invitation on behalf of its intended recipient.
    ///
    /// Marks the invitation accepted and creates the membership row in
    /// one transaction; both writes succeed together or neither does.
    ///
    /// # Errors
    /// `Unauthorized` without an authenticated requester, `NotFound` for
    /// an unknown invitation, `Forbidden` when the requester is not the
    /// recipient, the transition is invalid for the current status, or
    /// the invitation has expired.
    pub async fn accept_organization_membership_invitation(
        &self,
        ctx: &RequestContext,
        invitation_id: i64,
    ) -> Result<OrganizationMember, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        let invitation = self.load_invitation(invitation_id).await?;

        if invitation.intended_for != requester.id() {
            return Err(ServiceError::Forbidden(
                "Invitation can only be accepted by the user it is intended for".to_string(),
            ));
        }

        if !invitation.is_acceptance_operation_valid(AcceptanceOperation::Accept) {
            return Err(ServiceError::Forbidden(format!(
                "Invitation with status {} cannot be accepted",
                invitation.status.as_str()
            )));
        }

        if invitation.is_expired() {
            return Err(ServiceError::Forbidden("Invitation has expired".to_string()));
        }

        let organization_id = invitation.organization_id;
        let user_id = invitation.intended_for;
        let member = storage::execute_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                InvitationRepo::set_status(conn, invitation_id, InvitationStatus::Accepted)
                    .await?;
                let member = OrgRepo::insert_member(conn, organization_id, user_id).await?;
                Ok::<_, ServiceError>(member)
            })
        })
        .await?;

        info!(
            invitation_id,
            organization_id, user_id, "Accepted invitation"
        );

        Ok(member)
    }

    /// Cancels an invitation on behalf of an organization admin.
    ///
    /// Cancelling an already-cancelled invitation is an idempotent
    /// no-op.
    ///
    /// # Errors
    /// `Unauthorized`, `NotFound`, or `Forbidden` when the requester is
    /// not an admin of the invitation's organization or the transition
    /// is invalid.
    pub async fn cancel_organization_membership_invitation(
        &self,
        ctx: &RequestContext,
        invitation_id: i64,
    ) -> Result<Invitation, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        let invitation = self.load_invitation(invitation_id).await?;

        if !requester.is_admin_of_organization(invitation.organization_id) {
            return Err(ServiceError::Forbidden(
                "Invitation can only be cancelled by an admin of the organization".to_string(),
            ));
        }

        if invitation.status == InvitationStatus::Cancelled {
            return Ok(invitation);
        }

        if !invitation.is_acceptance_operation_valid(AcceptanceOperation::Cancel) {
            return Err(ServiceError::Forbidden(format!(
                "Invitation with status {} cannot be cancelled",
                invitation.status.as_str()
            )));
        }

        self.transition(invitation_id, InvitationStatus::Cancelled)
            .await
    }

    /// Rejects an invitation on behalf of its intended recipient.
    ///
    /// Rejecting an already-rejected invitation is an idempotent no-op.
    ///
    /// # Errors
    /// `Unauthorized`, `NotFound`, or `Forbidden` when the requester is
    /// not the recipient or the transition is invalid.
    pub async fn reject_organization_membership_invitation(
        &self,
        ctx: &RequestContext,
        invitation_id: i64,
    ) -> Result<Invitation, ServiceError> {
        let requester = ctx.authenticated().ok_or_else(|| {
            ServiceError::Unauthorized("This action requires an authenticated user".to_string())
        })?;

        let invitation = self.load_invitation(invitation_id).await?;

        if invitation.intended_for != requester.id() {
            return Err(ServiceError::Forbidden(
                "Invitation can only be rejected by the user it is intended for".to_string(),
            ));
        }

        if invitation.status == InvitationStatus::Rejected {
            return Ok(invitation);
        }

        if !invitation.is_acceptance_operation_valid(AcceptanceOperation::Reject) {
            return Err(ServiceError::Forbidden(format!(
                "Invitation with status {} cannot be rejected",
                invitation.status.as_str()
            )));
        }

        self.transition(invitation_id, InvitationStatus::Rejected)
            .await
    }

    async fn load_invitation(&self, invitation_id: i64) -> Result<Invitation, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        InvitationRepo::find_by_id(&mut conn, invitation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))
    }

    async fn transition(
        &self,
        invitation_id: i64,
        status: InvitationStatus,
    ) -> Result<Invitation, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        InvitationRepo::set_status(&mut conn, invitation_id, status).await?;
        info!(invitation_id, status = status.as_str(), "Invitation transition");

        InvitationRepo::find_by_id(&mut conn, invitation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))
    }
}

/// Parses raw status filters; returns `None` when the input is absent
/// or not a clean set of known statuses, in which case the caller keeps
/// the every-status default.
fn parse_statuses(raw: Option<&[String]>) -> Option<Vec<InvitationStatus>> {
    let raw = raw?;
    if raw.is_empty() || raw.len() > InvitationStatus::ALL.len() {
        return None;
    }

    let parsed: Vec<InvitationStatus> = raw
        .iter()
        .filter_map(|value| InvitationStatus::parse(value))
        .collect();

    if parsed.len() == raw.len() { Some(parsed) } else { None }
}
