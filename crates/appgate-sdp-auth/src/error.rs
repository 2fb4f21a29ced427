//! Authentication error types.

use appgate_sdp_core::DiagnosticKind;
use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while building a session against the Controller.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The provider configuration is missing or contradicting fields.
    #[error("invalid provider configuration: {0}")]
    ConfigInvalid(String),

    /// The Controller could not be reached.
    #[error("Controller unreachable: {0}")]
    TransportDown(String),

    /// The Controller refused the credentials or the token expired.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The Controller answered login without a parseable version.
    #[error("Controller version unreadable: {0}")]
    VersionUnreadable(String),

    /// The Controller does not accept the requested peer API version.
    #[error(
        "Controller does not support peer API v{requested} (supported v{min_supported}..=v{max_supported})"
    )]
    UnsupportedProtocol {
        /// Version the plugin asked for.
        requested: u16,
        /// Lowest version the Controller accepts.
        min_supported: u16,
        /// Highest version the Controller accepts.
        max_supported: u16,
    },

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if login may succeed when retried.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::TransportDown(_))
    }

    /// The diagnostic category for this error.
    #[must_use]
    pub const fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            Self::ConfigInvalid(_) | Self::AuthRejected(_) => DiagnosticKind::Validation,
            Self::TransportDown(_) | Self::VersionUnreadable(_) => DiagnosticKind::Transport,
            Self::UnsupportedProtocol { .. } => DiagnosticKind::VersionUnsupported,
            Self::Internal(_) => DiagnosticKind::Unknown,
        }
    }
}
