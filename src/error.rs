use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An authentication error. The message is internal detail; the HTTP
    /// response carries a generic body so callers cannot probe which
    /// validation step failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An authorization error.
    #[error("Authorization failed")]
    Unauthorized,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An encryption or decryption error. Decryption failures are treated
    /// as security events, never as recoverable data.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A rate limit exceeded error, carrying the seconds until the window
    /// resets.
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded {
        /// Seconds until the current window expires.
        retry_after: i64,
    },

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::Authentication(ref detail) => {
                tracing::warn!("Authentication failed: {}", detail);
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string())
            }

            AppError::RateLimitExceeded { retry_after } => {
                tracing::warn!("Rate limit exceeded, retry after {}s", retry_after);
                let body = sonic_rs::to_string(&sonic_rs::json!({
                    "error": "Too many requests",
                    "retry_after": retry_after,
                }))
                .unwrap_or_else(|_| r#"{"error":"Too many requests"}"#.to_string());

                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                if let Ok(value) = retry_after.to_string().parse() {
                    response.headers_mut().insert("Retry-After", value);
                }
                return response;
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, body).into_response()
    }
}

/// Truncates a session identifier to a short prefix safe to log.
pub fn log_safe_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}
