use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// External error taxonomy. Deliberately coarse: several distinct internal
/// failures collapse into one variant here (most notably `InvalidGrant`),
/// and the precise cause goes to the audit trail only.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid client")]
    InvalidClient,

    /// Bad code, bad verifier, expired/reused/revoked token. One variant,
    /// one wire response, no oracle.
    #[error("invalid grant")]
    InvalidGrant,

    #[error("unauthorized client")]
    UnauthorizedClient,

    #[error("access denied")]
    AccessDenied,

    /// Uniform legacy-login rejection. Identical whether the identifier
    /// exists or not.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// The upstream identity provider timed out or errored. Distinct from
    /// invalid credentials so clients can retry instead of re-prompting.
    #[error("authentication service unavailable")]
    AuthServiceUnavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, description) = match &self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidClient => (
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                "client authentication failed".to_string(),
            ),
            AppError::InvalidGrant => (
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "the provided grant is invalid, expired, or revoked".to_string(),
            ),
            AppError::UnauthorizedClient => (
                StatusCode::BAD_REQUEST,
                "unauthorized_client",
                "the client is not authorized for this grant".to_string(),
            ),
            AppError::AccessDenied => (
                StatusCode::FORBIDDEN,
                "access_denied",
                "access denied".to_string(),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "invalid credentials".to_string(),
            ),
            AppError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "rate limit exceeded".to_string(),
            ),
            AppError::AuthServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "auth_service_unavailable",
                "authentication service unavailable".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("redis error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error,
            "error_description": description,
        }));

        let mut response = (status, body).into_response();

        // Rate-limited callers should back off, not re-authenticate.
        if let AppError::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", val);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_grant_is_a_400() {
        let resp = AppError::InvalidGrant.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let resp = AppError::RateLimitExceeded {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "42");
    }

    #[test]
    fn internal_failures_do_not_leak_detail() {
        let resp = AppError::Internal(anyhow::anyhow!("pool exhausted at 10.0.0.3")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
