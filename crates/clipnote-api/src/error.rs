//! API error types.
//!
//! Every failure surfaced at the boundary carries a stable code from the
//! taxonomy, an HTTP status, a human-readable message, and a suggested next
//! action. Rate-limit denials additionally carry `Retry-After` and
//! remaining-quota headers.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use clipnote_models::ErrorCode;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    #[error("{message}")]
    Denied {
        code: ErrorCode,
        message: String,
        retry_after: Option<u64>,
        credits_remaining: Option<i64>,
    },

    #[error("{message}")]
    Pipeline { code: ErrorCode, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation { code, .. }
            | ApiError::Denied { code, .. }
            | ApiError::Pipeline { code, .. } => StatusCode::from_u16(code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<ErrorCode> {
        match self {
            ApiError::Validation { code, .. }
            | ApiError::Denied { code, .. }
            | ApiError::Pipeline { code, .. } => Some(*code),
            ApiError::Internal(_) => Some(ErrorCode::Internal),
            _ => None,
        }
    }
}

impl From<clipnote_store::StoreError> for ApiError {
    fn from(e: clipnote_store::StoreError) -> Self {
        match e {
            clipnote_store::StoreError::NotFound(msg) => ApiError::NotFound(msg),
            clipnote_store::StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<clipnote_worker::WorkerError> for ApiError {
    fn from(e: clipnote_worker::WorkerError) -> Self {
        ApiError::Pipeline {
            code: e.error_code(),
            message: e.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let retry_after = match &self {
            ApiError::Denied { retry_after, .. } => *retry_after,
            _ => None,
        };
        let credits_remaining = match &self {
            ApiError::Denied {
                credits_remaining, ..
            } => *credits_remaining,
            _ => None,
        };

        let body = ErrorResponse {
            detail,
            code: code.map(|c| c.as_str().to_string()),
            suggested_action: code.map(|c| c.suggested_action().to_string()),
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        if let Some(remaining) = credits_remaining {
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                response.headers_mut().insert("X-Credits-Remaining", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let err = ApiError::validation(ErrorCode::InvalidUrl, "bad url");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ApiError::Denied {
            code: ErrorCode::RateLimited,
            message: "slow down".into(),
            retry_after: Some(30),
            credits_remaining: None,
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = ApiError::Denied {
            code: ErrorCode::InsufficientCredits,
            message: "no credits".into(),
            retry_after: None,
            credits_remaining: Some(0),
        };
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn store_errors_map_to_api_errors() {
        let err: ApiError = clipnote_store::StoreError::not_found("job x").into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = clipnote_store::StoreError::conflict("busy").into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn denied_response_carries_retry_after_header() {
        let err = ApiError::Denied {
            code: ErrorCode::RateLimited,
            message: "slow down".into(),
            retry_after: Some(42),
            credits_remaining: Some(3),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("Retry-After").unwrap(),
            &HeaderValue::from_static("42")
        );
        assert_eq!(
            response.headers().get("X-Credits-Remaining").unwrap(),
            &HeaderValue::from_static("3")
        );
    }
}
