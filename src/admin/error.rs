//! JSON error responses for the admin API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::ServiceError;
use crate::snapshot::BuildError;
use crate::store::StoreError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    /// Malformed body, path or query, or a request that failed validation
    ValidationFailed,
    /// Entity does not exist
    NotFound,
    /// Referenced cluster is missing or inactive
    InvalidReference,
    /// External id already taken
    Conflict,
    /// Database unreachable or refresh could not read it
    StoreUnavailable,
    /// Anything else
    InternalError,
}

impl ApiErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::InvalidReference => StatusCode::BAD_REQUEST,
            ApiErrorCode::Conflict => StatusCode::CONFLICT,
            ApiErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: ApiErrorCode,
    pub message: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

#[derive(Debug)]
pub struct ApiError {
    code: ApiErrorCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ValidationFailed, message)
    }

    pub fn code(&self) -> ApiErrorCode {
        self.code
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let code = match &err {
            ServiceError::Validation(_) => ApiErrorCode::ValidationFailed,
            ServiceError::NotFound { .. } => ApiErrorCode::NotFound,
            ServiceError::InvalidReference { .. } => ApiErrorCode::InvalidReference,
            ServiceError::Conflict { .. } => ApiErrorCode::Conflict,
            ServiceError::Store(StoreError::Database(_) | StoreError::Unavailable(_)) => {
                ApiErrorCode::StoreUnavailable
            }
            ServiceError::Store(_) => ApiErrorCode::InternalError,
        };
        if code == ApiErrorCode::StoreUnavailable || code == ApiErrorCode::InternalError {
            tracing::error!(error = %err, "Admin request failed");
        }
        Self::new(code, err.to_string())
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        Self::new(ApiErrorCode::StoreUnavailable, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
