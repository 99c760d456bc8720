//! Login bootstrap: verifies the bearer token with the identity
//! provider and provisions the local user on first sight.

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::error;

use super::types::UserResponse;
use crate::{api::AppContext, auth};

#[utoipa::path(
    post,
    path = "/v1/session",
    responses(
        (status = 200, description = "Identity verified; local account resolved.", body = UserResponse),
        (status = 401, description = "Missing or rejected bearer token."),
    ),
    tag = "session"
)]
/// Resolves the caller's bearer token into a local user account,
/// creating the account from the provider's claims on first login.
pub async fn create_session(
    headers: HeaderMap,
    state: Extension<Arc<AppContext>>,
) -> impl IntoResponse {
    let Some(token) = auth::bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match state.identity.verify(token).await {
        Ok(Some(claims)) => claims,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Identity provider verification failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.users.sign_up_via_identity(&claims).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(err) => err.into_response(),
    }
}
