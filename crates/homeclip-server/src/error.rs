//! HTTP error types for the `homeclip` server.
//!
//! Authentication failures are answered with `401` and a plain-text reason,
//! which is what Connect iframes display. Everything else gets a JSON body
//! with a machine-readable `error` and a human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use homeclip_core::error::AuthError;

/// Application-level error returned from handlers and middleware.
#[derive(Debug)]
pub enum AppError {
    /// Missing, invalid, or unverifiable token, or unknown tenant.
    Unauthorized(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => {
                return (StatusCode::UNAUTHORIZED, format!("Unauthorized: {msg}")).into_response();
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unauthorized_is_plain_text() {
        let resp = AppError::from(AuthError::MissingToken).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers()[axum::http::header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Unauthorized: no JWT token");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let resp = AppError::Internal("disk on fire".to_owned()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal_error");
        assert_eq!(json["message"], "internal server error");
    }
}
