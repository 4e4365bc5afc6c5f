//! API Error Types
//!
//! Every handler returns [`ApiResult`]; failures render as a JSON body
//! `{ "code": ..., "message": ..., "details"?: ... }` with the status code
//! implied by [`ErrorCode`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use billvault_core::{ConfigError, TierError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes exposed to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors
    InvalidInput,
    Unauthorized,
    RecordNotFound,

    // Server errors
    TierUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::RecordNotFound => StatusCode::NOT_FOUND,
            ErrorCode::TierUnavailable | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::Unauthorized => "Missing or invalid service key",
            ErrorCode::RecordNotFound => "Record not found",
            ErrorCode::TierUnavailable => "Storage tier temporarily unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn unauthorized() -> Self {
        Self::from_code(ErrorCode::Unauthorized)
    }

    pub fn record_not_found(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RecordNotFound,
            format!("Record {} not found", id),
        )
    }

    pub fn tier_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TierUnavailable, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Tier failures are logged in full and surfaced with a generic message so
/// provider details never reach the caller.
impl From<TierError> for ApiError {
    fn from(err: TierError) -> Self {
        tracing::error!(error = %err, tier = %err.tier(), "Tier operation failed");
        match err {
            TierError::Transient { .. } | TierError::Timeout { .. } => {
                ApiError::from_code(ErrorCode::TierUnavailable)
            }
            TierError::Corrupt { .. } => ApiError::from_code(ErrorCode::InternalError),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Configuration error: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use billvault_core::Tier;

    #[test]
    fn test_error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RecordNotFound).unwrap();
        assert_eq!(json, "\"RECORD_NOT_FOUND\"");
        let json = serde_json::to_string(&ErrorCode::TierUnavailable).unwrap();
        assert_eq!(json, "\"TIER_UNAVAILABLE\"");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::RecordNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::TierUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_tier_error_hides_reason() {
        let err: ApiError =
            TierError::transient(Tier::Hot, "get", "connection refused to 10.0.0.7").into();
        assert_eq!(err.code, ErrorCode::TierUnavailable);
        assert!(!err.message.contains("10.0.0.7"));

        let err: ApiError = TierError::corrupt(Tier::Cold, "2024/01/01/a.json", "bad json").into();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[test]
    fn test_body_omits_empty_details() {
        let body = serde_json::to_value(ApiError::record_not_found("abc123")).unwrap();
        assert_eq!(body["code"], "RECORD_NOT_FOUND");
        assert_eq!(body["message"], "Record abc123 not found");
        assert!(body.get("details").is_none());
    }
}
