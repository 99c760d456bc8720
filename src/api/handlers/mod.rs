//! API handlers for the membership service.
//!
//! Handlers validate the request shape, resolve the caller's context,
//! and delegate to the service layer. Every error kind is mapped to a
//! status code in exactly one place (`ServiceError::into_response`).

pub mod health;
pub mod invitations;
pub mod organizations;
pub mod session;
pub mod types;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

/// Uniform `400` body matching the service error format.
pub(crate) fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Bad request", "message": message })),
    )
        .into_response()
}

/// Parses an optional non-negative integer query field, with `default`
/// when absent.
pub(crate) fn parse_non_negative(
    value: Option<&str>,
    field: &str,
    default: i64,
) -> Result<i64, String> {
    let Some(value) = value else {
        return Ok(default);
    };

    let parsed: i64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{field} must be a number"))?;
    if parsed < 0 {
        return Err(format!("{field} must be greater than or equal to 0"));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_non_negative() {
        assert_eq!(parse_non_negative(None, "limit", 100), Ok(100));
        assert_eq!(parse_non_negative(Some("25"), "limit", 100), Ok(25));
        assert_eq!(parse_non_negative(Some(" 0 "), "offset", 0), Ok(0));
        assert!(parse_non_negative(Some("-1"), "limit", 100).is_err());
        assert!(parse_non_negative(Some("abc"), "limit", 100).is_err());
    }
}
