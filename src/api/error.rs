use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::compose::MergeError;
use crate::signing::SignError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("{0}")]
    MissingParameter(String),
    #[error("{0}")]
    MissingConfig(String),
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("Failed to generate signed URL: {0}")]
    Signing(#[from] SignError),
    #[error("{0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) | ApiError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Merge(err) if err.is_precondition() => StatusCode::BAD_REQUEST,
            ApiError::Merge(MergeError::TimedOut(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Signing(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::MissingConfig(_)
            | ApiError::Merge(_)
            | ApiError::Signing(_)
            | ApiError::Storage(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::MissingParameter(_) => "MISSING_PARAMETER",
            ApiError::MissingConfig(_) => "CONFIG_ERROR",
            ApiError::Merge(MergeError::TimedOut(_)) => "MERGE_TIMEOUT",
            ApiError::Merge(_) => "MERGE_FAILED",
            ApiError::Signing(_) => "SIGNING_FAILED",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}
