//! API error handling.
//!
//! Every failure leaves the service as `{"error": "<message>"}` with a
//! matching status code.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::application::ExecutionError;
use crate::infrastructure::RegistryError;

/// Message for a path segment that is not a stress test id.
pub const INVALID_ID_MESSAGE: &str = "Id should be an integer";

/// Message for a request body that is not a valid definition.
pub const INVALID_JSON_MESSAGE: &str = "Could not parse JSON";

const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message.
    pub error: String,
}

impl ApiError {
    /// Creates a new API error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Error details.
    pub error: ApiError,
}

impl ApiErrorResponse {
    /// Creates a new API error response.
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// Creates a 400 Bad Request response.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new(message))
    }

    /// Creates a 400 response for a malformed path id.
    #[must_use]
    pub fn invalid_id() -> Self {
        Self::bad_request(INVALID_ID_MESSAGE)
    }

    /// Creates a 404 Not Found response.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new(message))
    }

    /// Creates a 500 Internal Server Error response.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ApiError::new(message))
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<RegistryError> for ApiErrorResponse {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(_) => Self::not_found(error.to_string()),
        }
    }
}

impl From<ExecutionError> for ApiErrorResponse {
    fn from(error: ExecutionError) -> Self {
        match error {
            ExecutionError::Registry(error) => Self::from(error),
            // The run is already recorded; only the outcome is reported as a failure.
            ExecutionError::AllIterationsFailed { .. } => {
                tracing::error!(%error, "Stress test run failed");
                Self::internal_error(INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected request body");
        Self::bad_request(INVALID_JSON_MESSAGE)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// A request that parsed but describes an unacceptable definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// What is wrong with the request.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::bad_request(error.message)
    }
}

// =============================================================================
// Tests
// =============================================================================
