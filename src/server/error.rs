//! HTTP error mapping
//!
//! Every failure leaves the API as `{"detail": "<message>"}`.

use crate::error::PlygateError;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// A `PlygateError` on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub PlygateError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

impl From<PlygateError> for ApiError {
    fn from(err: PlygateError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PlygateError::Validation(rejection.body_text()))
    }
}

/// Classify a multipart read failure; body-limit hits become 413
pub fn multipart_error(err: MultipartError, limit: u64) -> PlygateError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PlygateError::UploadTooLarge { limit }
    } else {
        PlygateError::Validation(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = detail(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", detail);
        }
        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// Status code for an error
pub fn status_for(err: &PlygateError) -> StatusCode {
    match err {
        PlygateError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        PlygateError::ArtifactNotFound(_) | PlygateError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Human-readable message, including the OS error for IO failures
pub fn detail(err: &PlygateError) -> String {
    match err {
        PlygateError::Io { context, source } => format!("{context}: {source}"),
        PlygateError::CommandFailed { command, source } => format!("{command}: {source}"),
        other => other.to_string(),
    }
}
