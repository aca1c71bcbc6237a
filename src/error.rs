//! API error envelope.
//!
//! DESIGN
//! ======
//! Services return their own `thiserror` enums. Route handlers translate
//! those into `ApiError`, which is the only type that renders a non-2xx JSON
//! body. Every body has the same shape:
//!
//! ```json
//! {"error": {"code": "...", "message": "...", "correlation_id": "...", "status_code": 400}}
//! ```
//!
//! Driver errors are logged with the request's correlation ID and replaced by
//! a generic message before they reach the client.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::middleware::correlation_id;

/// Field-level validation failure reported in `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, details: Vec<FieldError> },
    #[error("request validation failed")]
    Unprocessable { details: Vec<FieldError> },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Locked(String),
    #[error("{message}")]
    RateLimited { message: String, retry_after_secs: u64 },
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: Vec::new() }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation { details: vec![FieldError::new(field, message.clone())], message }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Locked(_) => StatusCode::LOCKED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable(_) | Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::Unprocessable { .. } => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "AUTHENTICATION_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "RESOURCE_NOT_FOUND",
            Self::Locked(_) => "ACCOUNT_LOCKED",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::PayloadTooLarge(_) => "REQUEST_TOO_LARGE",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Database and internal failures are masked.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Unprocessable { .. } => "Request validation failed".into(),
            Self::Database(_) => "Database temporarily unavailable".into(),
            Self::Internal(_) => "An unexpected error occurred".into(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation { details, .. } | Self::Unprocessable { details } if !details.is_empty() => {
                Some(details.as_slice())
            }
            _ => None,
        }
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

#[derive(Serialize)]
struct Envelope<'a> {
    error: Body<'a>,
}

#[derive(Serialize)]
struct Body<'a> {
    code: &'static str,
    message: String,
    correlation_id: String,
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [FieldError]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation_id = correlation_id();

        match &self {
            Self::Database(e) => {
                tracing::error!(%correlation_id, error = %e, "database error");
            }
            Self::Internal(detail) => {
                tracing::error!(%correlation_id, %detail, "internal error");
            }
            other => {
                tracing::warn!(%correlation_id, code = other.code(), status = status.as_u16(), message = %other, "api error");
            }
        }

        let envelope = Envelope {
            error: Body {
                code: self.code(),
                message: self.public_message(),
                correlation_id,
                status_code: status.as_u16(),
                details: self.details(),
            },
        };
        let mut response = (status, axum::Json(envelope)).into_response();

        if let Self::RateLimited { retry_after_secs, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
