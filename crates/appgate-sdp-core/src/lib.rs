//! Core types for the Appgate SDP provider.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - **Identifiers**: UUID-backed entity and device ids
//! - **Entity kinds**: the Controller collections the provider manages
//! - **Diagnostics**: the uniform error/warning stream returned to the orchestrator
//! - **Versions**: Controller release versions, peer API protocol versions and
//!   the version gate deciding which fields may be written
//!
//! # Example
//!
//! ```
//! use appgate_sdp_core::{ControllerVersion, VersionGate};
//!
//! let gate = VersionGate::new("5.5.3-27278-release".parse().unwrap());
//! assert!(gate.supports(ControllerVersion::V5_5));
//! assert!(gate
//!     .require("network_inactivity_timeout_enabled", ControllerVersion::V6_1)
//!     .is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod kind;
pub mod version;

pub use diagnostics::{AttributePath, Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{CoreError, Result};
pub use ids::{DeviceId, EntityId, IdError};
pub use kind::{EntityKind, UnknownKind};
pub use version::{ControllerVersion, ProtocolVersion, VersionGate};
