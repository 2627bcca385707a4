//! Error types for moodlist-server HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::capture::CaptureError;
use crate::services::orchestrator::{CycleError, FailureKind};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Detect cycle failure, status chosen by failure kind
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Camera start/stop failure
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Capture(err) => match err {
                CaptureError::AlreadyActive => (StatusCode::CONFLICT, "CAMERA_ALREADY_STARTED"),
                CaptureError::NotActive => (StatusCode::CONFLICT, "NO_ACTIVE_CAMERA"),
                CaptureError::PermissionDenied(_) => {
                    (StatusCode::FORBIDDEN, "DEVICE_PERMISSION_DENIED")
                }
                CaptureError::Unavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "DEVICE_UNAVAILABLE")
                }
                CaptureError::EmptyFrame => (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_FAILURE"),
            },
            ApiError::Cycle(err) => match err.kind() {
                FailureKind::Busy => (StatusCode::CONFLICT, "BUSY"),
                FailureKind::NoActiveCamera => (StatusCode::CONFLICT, "NO_ACTIVE_CAMERA"),
                FailureKind::ModelsNotReady => (StatusCode::SERVICE_UNAVAILABLE, "MODELS_NOT_READY"),
                FailureKind::DevicePermissionDenied => {
                    (StatusCode::FORBIDDEN, "DEVICE_PERMISSION_DENIED")
                }
                FailureKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                FailureKind::AuthFailure => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_FAILURE"),
                FailureKind::CatalogFailure => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CATALOG_FAILURE")
                }
                FailureKind::CaptureFailure => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_FAILURE")
                }
                FailureKind::ClassifierFailure => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CLASSIFIER_FAILURE")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
