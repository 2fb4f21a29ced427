//! API error types and responses.
//!
//! Every response body, successful or not, carries a `diagnostics` array. Errors
//! raised before an operation runs (malformed bodies, unknown operations,
//! configuration failures) are rendered here the same way.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use appgate_sdp_control::ControlError;
use appgate_sdp_core::{Diagnostic, DiagnosticKind, Diagnostics};

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The path names an operation the endpoint does not offer.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The provider refused the request.
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Body of every error response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    diagnostics: Diagnostics,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownOperation(_) => StatusCode::NOT_FOUND,
            Self::Control(e) => StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// The error as a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::BadRequest(_) => Diagnostic::error(DiagnosticKind::Validation, self.to_string()),
            Self::UnknownOperation(_) => Diagnostic::error(DiagnosticKind::NotFound, self.to_string()),
            Self::Control(e) => e.to_diagnostic(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            diagnostics: Diagnostics::from(self.to_diagnostic()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
