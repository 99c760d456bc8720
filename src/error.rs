//! Service error taxonomy and its single HTTP mapping point.
//!
//! Repositories and the crypto codec return typed errors; services add
//! context only where they can (e.g. turning "no user row" into a
//! descriptive `NotFound`). The `IntoResponse` impl below is the only
//! place an error kind becomes a status code and response body.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// No valid authenticated identity.
    #[error("{0}")]
    Unauthorized(String),
    /// Authenticated but lacking permission, or an invalid state
    /// transition was attempted.
    #[error("{0}")]
    Forbidden(String),
    /// Malformed input.
    #[error("{0}")]
    InvalidArgument(String),
    /// Referenced entity does not exist, or a search yielded nothing.
    #[error("{0}")]
    NotFound(String),
    /// Encryption subsystem fault; fatal for the request.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Unexpected store failure; detail stays in operator logs.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// Any other uncategorized fault; detail stays in operator logs.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    fn body(error: &str, message: &str) -> Json<serde_json::Value> {
        Json(json!({ "error": error, "message": message }))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Self::body("Unauthorized", &message),
            )
                .into_response(),
            Self::Forbidden(message) => {
                (StatusCode::FORBIDDEN, Self::body("Forbidden", &message)).into_response()
            }
            Self::InvalidArgument(message) => {
                (StatusCode::BAD_REQUEST, Self::body("Bad request", &message)).into_response()
            }
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Self::body("Not found", &message)).into_response()
            }
            Self::Crypto(err) => {
                // A decryption failure on stored data means corruption or
                // tampering; keep the detail out of the response.
                error!("Email crypto failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Self::body("Internal server error", "Internal server error"),
                )
                    .into_response()
            }
            Self::Database(err) => {
                error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Self::body("Internal server error", "Internal server error"),
                )
                    .into_response()
            }
            Self::Internal(err) => {
                error!("Internal error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Self::body("Internal server error", "Internal server error"),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ServiceError::Unauthorized("auth required".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServiceError::Forbidden("admins only".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::InvalidArgument("bad email".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotFound("no such invitation".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Crypto(CryptoError::DecryptionFailure),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let response = ServiceError::Database(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
