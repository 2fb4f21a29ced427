//! Error types for the reconciliation engine.
//!
//! Every remote call ends up here before it reaches the orchestrator: HTTP
//! failures, Controller validation envelopes, version gate refusals and local
//! validation problems all become a [`ControlError`], which in turn knows how
//! to render itself as a [`Diagnostic`].

use appgate_sdp_auth::AuthError;
use appgate_sdp_core::{AttributePath, ControllerVersion, CoreError, Diagnostic, DiagnosticKind};
use serde::Deserialize;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur while reconciling resources.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Missing, conflicting or malformed input.
    #[error("{message}")]
    Validation {
        /// Attribute the problem refers to.
        path: Option<AttributePath>,
        /// What is wrong.
        message: String,
    },

    /// Network, TLS or Controller-side failure.
    #[error("Controller unreachable: {0}")]
    Transport(String),

    /// The referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind or endpoint.
        kind: String,
        /// Identifier or name that was looked up.
        id: String,
    },

    /// The request conflicts with the current remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A field requires a newer Controller.
    #[error("{field} requires Controller {} or later, connected Controller is {current}", .required.short())]
    VersionUnsupported {
        /// Attribute that was set.
        field: String,
        /// Minimum Controller version.
        required: ControllerVersion,
        /// Connected Controller version.
        current: ControllerVersion,
    },

    /// A name lookup matched more than one entity.
    #[error("multiple {kind} entities are named {name:?}, use the id instead")]
    Ambiguous {
        /// Entity kind.
        kind: String,
        /// Name that was looked up.
        name: String,
    },

    /// The Controller rejected the request.
    #[error("Controller returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Top-level message.
        message: String,
        /// Flattened per-field errors, one per line.
        detail: Option<String>,
    },

    /// A wait loop gave up before the expected state was reached.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The resource or data source type is not registered.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// An operation needs a configured provider.
    #[error("provider is not configured")]
    NotConfigured,

    /// Authentication error.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Core domain error.
    #[error(transparent)]
    Core(CoreError),

    /// A body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ControlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::VersionUnsupported {
                field,
                required,
                current,
            } => Self::VersionUnsupported {
                field,
                required,
                current,
            },
            other => Self::Core(other),
        }
    }
}

impl ControlError {
    /// A validation error without an attribute path.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            path: None,
            message: message.into(),
        }
    }

    /// A validation error pointing at an attribute.
    #[must_use]
    pub fn invalid(path: AttributePath, message: impl Into<String>) -> Self {
        Self::Validation {
            path: Some(path),
            message: message.into(),
        }
    }

    /// Not-found error for an entity kind.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Returns true if this error means the entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { status: 404, .. })
    }

    /// Returns true if the operation might succeed when retried.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Conflict(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Auth(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Replace a generic 404 with a not-found error naming the entity.
    #[must_use]
    pub fn for_entity(self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        if self.is_not_found() {
            Self::not_found(kind, id)
        } else {
            self
        }
    }

    /// The diagnostic category for this error.
    #[must_use]
    pub const fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            Self::Validation { .. } | Self::Ambiguous { .. } | Self::UnknownType(_) => {
                DiagnosticKind::Validation
            }
            Self::Api { status, .. } => match *status {
                404 => DiagnosticKind::NotFound,
                409 => DiagnosticKind::Conflict,
                400 | 422 => DiagnosticKind::Validation,
                s if s >= 500 => DiagnosticKind::Transport,
                _ => DiagnosticKind::Unknown,
            },
            Self::Transport(_) | Self::Timeout(_) => DiagnosticKind::Transport,
            Self::NotFound { .. } => DiagnosticKind::NotFound,
            Self::Conflict(_) => DiagnosticKind::Conflict,
            Self::VersionUnsupported { .. } => DiagnosticKind::VersionUnsupported,
            Self::Auth(e) => e.diagnostic_kind(),
            Self::Core(e) => e.diagnostic_kind(),
            Self::NotConfigured => DiagnosticKind::Validation,
            Self::Cancelled | Self::Serialization(_) | Self::Internal(_) => {
                DiagnosticKind::Unknown
            }
        }
    }

    /// Returns the appropriate HTTP status code for this error at the host boundary.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        status_for_kind(self.diagnostic_kind())
    }

    /// Render as an error diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.diagnostic_kind(), self.to_string());
        match self {
            Self::Validation {
                path: Some(path), ..
            } => diagnostic.with_path(path.clone()),
            Self::VersionUnsupported { field, .. } => {
                diagnostic.with_path(AttributePath::from(field.clone()))
            }
            Self::Api {
                detail: Some(detail),
                ..
            } => diagnostic.with_detail(detail.clone()),
            Self::Core(e) => e.to_diagnostic(),
            _ => diagnostic,
        }
    }
}

/// HTTP status used at the host boundary for an error diagnostic of `kind`.
#[must_use]
pub const fn status_for_kind(kind: DiagnosticKind) -> u16 {
    match kind {
        DiagnosticKind::Validation | DiagnosticKind::VersionUnsupported => 422,
        DiagnosticKind::NotFound => 404,
        DiagnosticKind::Conflict => 409,
        DiagnosticKind::Transport => 502,
        DiagnosticKind::Unknown => 500,
    }
}

/// Error body returned by the Controller.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Variants without a detail slot carry the field errors in their message.
fn with_detail(message: String, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!("{message}\n{detail}"),
        None => message,
    }
}

/// Translate a non-success Controller answer into an error.
///
/// Validation envelopes are flattened so that every `{field, message}` entry
/// appears on its own line of the detail.
#[must_use]
pub fn from_response(status: u16, body: &str) -> ControlError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();

    let message = envelope
        .message
        .or(envelope.id)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() || trimmed.len() > 512 {
                format!("HTTP {status}")
            } else {
                trimmed.to_string()
            }
        });

    let detail = if envelope.errors.is_empty() {
        None
    } else {
        Some(
            envelope
                .errors
                .iter()
                .map(|e| match (&e.field, &e.message) {
                    (Some(field), Some(msg)) => format!("{field}: {msg}"),
                    (Some(field), None) => field.clone(),
                    (None, Some(msg)) => msg.clone(),
                    (None, None) => "unspecified error".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };

    match status {
        401 | 403 => ControlError::Auth(AuthError::AuthRejected(with_detail(
            message,
            detail.as_deref(),
        ))),
        409 => ControlError::Conflict(with_detail(message, detail.as_deref())),
        s if s >= 500 => ControlError::Transport(with_detail(
            format!("HTTP {s}: {message}"),
            detail.as_deref(),
        )),
        _ => ControlError::Api {
            status,
            message,
            detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgate_sdp_core::Severity;

    #[test]
    fn validation_envelope_is_flattened() {
        let body = r#"{
            "id": "unprocessable entity",
            "message": "Validation failed",
            "errors": [
                {"field": "name", "message": "may not be empty"},
                {"field": "hostnames", "message": "must contain at least 1 element"}
            ]
        }"#;

        let err = from_response(422, body);
        let diag = err.to_diagnostic();

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.kind, DiagnosticKind::Validation);
        assert!(diag.summary.contains("Validation failed"));
        assert_eq!(
            diag.detail.as_deref(),
            Some("name: may not be empty\nhostnames: must contain at least 1 element")
        );
    }

    #[test]
    fn status_mapping() {
        assert!(from_response(404, "").is_not_found());
        assert!(matches!(from_response(409, "{}"), ControlError::Conflict(_)));
        assert!(from_response(503, "down").is_retriable());
        assert!(matches!(
            from_response(401, r#"{"message": "token expired"}"#),
            ControlError::Auth(AuthError::AuthRejected(_))
        ));
        assert!(!from_response(400, "bad").is_retriable());
    }

    #[test]
    fn conflict_keeps_every_field_error() {
        let body = r#"{
            "message": "Conflict",
            "errors": [
                {"field": "name", "message": "already in use"},
                {"field": "hostname", "message": "taken by appliance gw-2"}
            ]
        }"#;

        let err = from_response(409, body);
        assert!(matches!(err, ControlError::Conflict(_)));
        let summary = err.to_diagnostic().summary;
        assert!(summary.contains("name: already in use"), "{summary}");
        assert!(summary.contains("hostname: taken by appliance gw-2"), "{summary}");
    }

    #[test]
    fn server_error_keeps_field_errors() {
        let body = r#"{"message": "Internal", "errors": [{"message": "database locked"}]}"#;
        let err = from_response(500, body);
        assert!(err.is_retriable());
        assert!(err.to_string().contains("database locked"));
    }

    #[test]
    fn version_error_carries_field_path() {
        let err: ControlError = CoreError::VersionUnsupported {
            field: "network_inactivity_timeout_enabled".to_string(),
            required: ControllerVersion::V6_1,
            current: ControllerVersion::V5_4,
        }
        .into();

        assert_eq!(err.http_status_code(), 422);
        let diag = err.to_diagnostic();
        assert_eq!(diag.kind, DiagnosticKind::VersionUnsupported);
        assert!(diag.summary.contains("6.1"));
        assert_eq!(
            diag.path.map(|p| p.to_string()).as_deref(),
            Some("network_inactivity_timeout_enabled")
        );
    }

    #[test]
    fn for_entity_names_kind_and_id() {
        let err = from_response(404, "").for_entity("entitlement", "abc");
        assert_eq!(err.to_string(), "entitlement abc not found");
        assert_eq!(err.http_status_code(), 404);
    }
}
