//! Invitation endpoints: create, list, search, and the three lifecycle
//! actions.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sqlx::PgPool;

use super::{
    bad_request, parse_non_negative,
    types::{
        CreateInvitationRequest, InvitationActionRequest, InvitationListResponse,
        InvitationResponse, MemberResponse,
    },
};
use crate::{
    api::AppContext,
    auth::{self, RequestContext},
    error::ServiceError,
    invitations::{InvitationView, SearchFilter, query::DEFAULT_SEARCH_LIMIT},
    users::valid_email,
};

/// Raw query string for listing the caller's invitations. Values are
/// validated explicitly so malformed input gets a descriptive `400`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<String>,
    offset: Option<String>,
}

/// Raw query string for the admin search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    organization_id: Option<String>,
    statuses: Option<String>,
    target_email: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/invitations",
    request_body = CreateInvitationRequest,
    responses(
        (status = 201, description = "Invitation created or converged on.", body = InvitationResponse),
        (status = 400, description = "Missing or malformed fields."),
        (status = 401, description = "No authenticated user."),
        (status = 403, description = "Caller is not an admin of the organization."),
        (status = 404, description = "Target user does not exist."),
    ),
    tag = "invitations"
)]
/// Invites a user, by email, to join an organization. Repeating the
/// call converges on the existing invitation instead of erroring.
pub async fn create_invitation(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Json(payload): Json<CreateInvitationRequest>,
) -> impl IntoResponse {
    if payload.target_email.trim().is_empty() {
        return bad_request("Target email and organization id are required");
    }
    if payload.organization_id <= 0 {
        return bad_request("organization_id must be greater than 0");
    }

    let ctx = match resolve(&headers, &pool, &state).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    match state
        .invitations
        .create_new_invitation(&ctx, &payload.target_email, payload.organization_id)
        .await
    {
        Ok(invitation) => (
            StatusCode::CREATED,
            Json(InvitationResponse::from(invitation)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/invitations",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, default 100"),
        ("offset" = Option<i64>, Query, description = "Page start, default 0"),
    ),
    responses(
        (status = 200, description = "Invitations addressed to the caller.", body = InvitationListResponse),
        (status = 400, description = "Malformed pagination."),
        (status = 401, description = "No authenticated user."),
        (status = 404, description = "No invitations exist for the caller."),
    ),
    tag = "invitations"
)]
/// Lists every invitation addressed to the caller, any status.
pub async fn list_my_invitations(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = match parse_non_negative(query.limit.as_deref(), "limit", DEFAULT_SEARCH_LIMIT) {
        Ok(limit) => limit,
        Err(message) => return bad_request(&message),
    };
    let offset = match parse_non_negative(query.offset.as_deref(), "offset", 0) {
        Ok(offset) => offset,
        Err(message) => return bad_request(&message),
    };

    let ctx = match resolve(&headers, &pool, &state).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    match state
        .invitations
        .get_invitations_intended_to_user(&ctx, limit, offset)
        .await
    {
        Ok(invitations) => list_response(invitations).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/invitations/search",
    params(
        ("organization_id" = i64, Query, description = "Organization to search, required"),
        ("statuses" = Option<String>, Query, description = "Comma-separated status filter"),
        ("target_email" = Option<String>, Query, description = "Filter by invited email"),
        ("limit" = Option<i64>, Query, description = "Page size, default 100"),
        ("offset" = Option<i64>, Query, description = "Page start, default 0"),
    ),
    responses(
        (status = 200, description = "Matching invitations.", body = InvitationListResponse),
        (status = 400, description = "Malformed filters."),
        (status = 401, description = "No authenticated user."),
        (status = 403, description = "Caller is not an admin of the organization."),
        (status = 404, description = "Nothing matched."),
    ),
    tag = "invitations"
)]
/// Admin search over an organization's invitations.
pub async fn search_invitations(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let organization_id = match query.organization_id.as_deref() {
        None => return bad_request("organization_id is required and must be a number"),
        Some(value) => match value.trim().parse::<i64>() {
            Ok(id) if id > 0 => id,
            Ok(_) => return bad_request("organization_id must be greater than 0"),
            Err(_) => return bad_request("organization_id is required and must be a number"),
        },
    };

    let limit = match parse_non_negative(query.limit.as_deref(), "limit", DEFAULT_SEARCH_LIMIT) {
        Ok(limit) => limit,
        Err(message) => return bad_request(&message),
    };
    let offset = match parse_non_negative(query.offset.as_deref(), "offset", 0) {
        Ok(offset) => offset,
        Err(message) => return bad_request(&message),
    };

    if let Some(target_email) = query.target_email.as_deref() {
        let target_email = target_email.trim();
        if !target_email.is_empty() && !valid_email(target_email) {
            return bad_request("target_email must be a valid email address");
        }
    }

    let statuses = query.statuses.as_deref().map(parse_status_list);

    let ctx = match resolve(&headers, &pool, &state).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    let filter = SearchFilter {
        statuses,
        target_email: query.target_email,
        limit: Some(limit),
        offset: Some(offset),
    };

    match state
        .invitations
        .search_organization_member_invitations(&ctx, organization_id, filter)
        .await
    {
        Ok(invitations) => list_response(invitations).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/invitations/accept",
    request_body = InvitationActionRequest,
    responses(
        (status = 201, description = "Membership created.", body = MemberResponse),
        (status = 400, description = "Missing invitation id."),
        (status = 401, description = "No authenticated user."),
        (status = 403, description = "Not the recipient, invalid transition, or expired."),
        (status = 404, description = "Invitation does not exist."),
    ),
    tag = "invitations"
)]
/// Accepts an invitation; the status change and the membership row are
/// written in one transaction.
pub async fn accept_invitation(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Json(payload): Json<InvitationActionRequest>,
) -> impl IntoResponse {
    if payload.invitation_id <= 0 {
        return bad_request("invitation_id is required and must be greater than 0");
    }

    let ctx = match resolve(&headers, &pool, &state).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    match state
        .invitations
        .accept_organization_membership_invitation(&ctx, payload.invitation_id)
        .await
    {
        Ok(member) => (StatusCode::CREATED, Json(MemberResponse::from(member))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/invitations/reject",
    request_body = InvitationActionRequest,
    responses(
        (status = 200, description = "Invitation rejected.", body = InvitationResponse),
        (status = 400, description = "Missing invitation id."),
        (status = 401, description = "No authenticated user."),
        (status = 403, description = "Not the recipient or invalid transition."),
        (status = 404, description = "Invitation does not exist."),
    ),
    tag = "invitations"
)]
/// Rejects an invitation on behalf of its recipient; idempotent when
/// already rejected.
pub async fn reject_invitation(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Json(payload): Json<InvitationActionRequest>,
) -> impl IntoResponse {
    if payload.invitation_id <= 0 {
        return bad_request("invitation_id is required and must be greater than 0");
    }

    let ctx = match resolve(&headers, &pool, &state).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    match state
        .invitations
        .reject_organization_membership_invitation(&ctx, payload.invitation_id)
        .await
    {
        Ok(invitation) => (StatusCode::OK, Json(InvitationResponse::from(invitation)))
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/invitations/cancel",
    request_body = InvitationActionRequest,
    responses(
        (status = 200, description = "Invitation cancelled.", body = InvitationResponse),
        (status = 400, description = "Missing invitation id."),
        (status = 401, description = "No authenticated user."),
        (status = 403, description = "Not an organization admin or invalid transition."),
        (status = 404, description = "Invitation does not exist."),
    ),
    tag = "invitations"
)]
/// Cancels an invitation on behalf of an organization admin; idempotent
/// when already cancelled.
pub async fn cancel_invitation(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Json(payload): Json<InvitationActionRequest>,
) -> impl IntoResponse {
    if payload.invitation_id <= 0 {
        return bad_request("invitation_id is required and must be greater than 0");
    }

    let ctx = match resolve(&headers, &pool, &state).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    match state
        .invitations
        .cancel_organization_membership_invitation(&ctx, payload.invitation_id)
        .await
    {
        Ok(invitation) => (StatusCode::OK, Json(InvitationResponse::from(invitation)))
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn resolve(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AppContext,
) -> Result<RequestContext, Response> {
    auth::resolve_context(headers, pool, state.identity.as_ref(), &state.user_repo)
        .await
        .map_err(ServiceError::into_response)
}

fn list_response(invitations: Vec<InvitationView>) -> (StatusCode, Json<InvitationListResponse>) {
    let count = invitations.len();
    (
        StatusCode::OK,
        Json(InvitationListResponse { invitations, count }),
    )
}

/// Splits a comma-separated status filter, dropping empty segments.
fn parse_status_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
