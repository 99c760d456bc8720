//! Request/response types for the membership API.
//!
//! These payloads are shared between handlers and `OpenAPI` generation.
//! Entities are converted into response DTOs here; internal fields such
//! as email hashes never appear in a response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    invitations::models::{Invitation, InvitationStatus, InvitationView},
    orgs::models::{Organization, OrganizationMember},
    users::models::User,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInvitationRequest {
    pub target_email: String,
    pub organization_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvitationActionRequest {
    pub invitation_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub email_verified: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            email_verified: user.email_verified,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Organization> for OrganizationResponse {
    fn from(organization: Organization) -> Self {
        Self {
            id: organization.id,
            name: organization.name,
            description: organization.description,
            is_active: organization.is_active,
            created_by: organization.created_by,
            created_at: organization.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationResponse {
    pub id: i64,
    pub organization_id: i64,
    pub intended_for_id: i64,
    pub created_by_id: i64,
    pub status: InvitationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(invitation: Invitation) -> Self {
        Self {
            id: invitation.id,
            organization_id: invitation.organization_id,
            intended_for_id: invitation.intended_for,
            created_by_id: invitation.created_by,
            status: invitation.status,
            expires_at: invitation.expires_at,
            created_at: invitation.created_at,
            updated_at: invitation.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<OrganizationMember> for MemberResponse {
    fn from(member: OrganizationMember) -> Self {
        Self {
            id: member.id,
            organization_id: member.organization_id,
            user_id: member.user_id,
            created_at: member.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationListResponse {
    pub invitations: Vec<InvitationView>,
    pub count: usize,
}
