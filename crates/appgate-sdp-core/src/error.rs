//! Common error types for the Appgate SDP provider.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::version::ControllerVersion;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An unknown entity kind was named.
    #[error(transparent)]
    UnknownKind(#[from] crate::kind::UnknownKind),

    /// A Controller version string could not be parsed.
    #[error("unreadable Controller version: {0:?}")]
    InvalidVersion(String),

    /// A protocol version unknown to the plugin was requested.
    #[error("unknown peer API protocol version {0}")]
    UnknownProtocol(u16),

    /// A field needs a newer Controller than the one connected.
    #[error("{field} requires Controller {} or later, connected Controller is {current}", .required.short())]
    VersionUnsupported {
        /// The attribute that was set.
        field: String,
        /// Minimum Controller version for the attribute.
        required: ControllerVersion,
        /// Version reported by the Controller at login.
        current: ControllerVersion,
    },
}

impl CoreError {
    /// The diagnostic category for this error.
    #[must_use]
    pub const fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            Self::InvalidId(_) | Self::UnknownKind(_) | Self::UnknownProtocol(_) => {
                DiagnosticKind::Validation
            }
            Self::InvalidVersion(_) => DiagnosticKind::Transport,
            Self::VersionUnsupported { .. } => DiagnosticKind::VersionUnsupported,
        }
    }

    /// Convert into an error diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.diagnostic_kind(), self.to_string());
        match self {
            Self::VersionUnsupported { field, .. } => {
                diagnostic.with_path(crate::diagnostics::AttributePath::from(field.clone()))
            }
            _ => diagnostic,
        }
    }
}
