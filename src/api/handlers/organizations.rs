//! Organization endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;

use super::{
    bad_request,
    types::{CreateOrganizationRequest, OrganizationResponse},
};
use crate::{api::AppContext, auth};

#[utoipa::path(
    post,
    path = "/v1/orgs",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created.", body = OrganizationResponse),
        (status = 400, description = "Missing or empty name/description."),
        (status = 401, description = "No authenticated user."),
    ),
    tag = "orgs"
)]
/// Creates an organization owned by the authenticated caller.
/// The creator becomes the organization's first admin and first member
/// in the same transaction.
pub async fn create_org(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AppContext>>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> impl IntoResponse {
    if payload.name.trim().is_empty() || payload.description.trim().is_empty() {
        return bad_request("Name and description are required");
    }

    let ctx = match auth::resolve_context(&headers, &pool, state.identity.as_ref(), &state.user_repo)
        .await
    {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    match state
        .orgs
        .register_new_organization(&ctx, &payload.name, &payload.description)
        .await
    {
        Ok(organization) => (
            StatusCode::CREATED,
            Json(OrganizationResponse::from(organization)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
