//! Resource reconciliation for the Appgate SDP Controller.
//!
//! This crate holds everything between the plugin host and the Controller's
//! admin API: resource schemas, planning, the CRUD skeleton shared by entity
//! kinds, the identity-provider variants, appliance activation and the
//! resources that live inside Controller-wide singleton documents.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Plugin host (server / CLI)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ProviderService                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Registry   │ │  Planning   │ │  Deadlines, retry   │   │
//! │  │  (schemas)  │ │  (local)    │ │  and diagnostics    │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌──────────────┬──────┴───────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//!  ┌───────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//!  │  Generic  │ │  Identity  │ │ Appliance  │ │ Singleton  │
//!  │  CRUD     │ │  providers │ │ activation │ │ documents  │
//!  └───────────┘ └────────────┘ └────────────┘ └────────────┘
//!                              │
//!                              ▼
//!                ┌──────────────────────────┐
//!                │  ControllerApi (REST)    │
//!                │  + resolver by id/name   │
//!                └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use appgate_sdp_auth::ProviderConfig;
//! use appgate_sdp_control::ProviderService;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ProviderService::with_defaults();
//! service.configure(
//!     ProviderConfig::new("https://controller.example.com:8443/admin")
//!         .with_credentials("admin", "admin"),
//! )?;
//!
//! let planned = json!({"name": "hq", "short_name": "hq"});
//! let outcome = service
//!     .create("appgatesdp_site", planned.as_object().unwrap(), CancellationToken::new())
//!     .await;
//! for diagnostic in &outcome.diagnostics {
//!     println!("{diagnostic}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Eventual consistency
//!
//! Singleton mutations and appliance activation wait for the Controller to
//! converge. Those waits end a safety pad before the operation deadline and
//! report readiness timeouts as warnings, not errors.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod appliance;
pub mod convert;
pub mod crud;
pub mod customization;
pub mod data_source;
pub mod entities;
pub mod error;
pub mod groups;
pub mod identity_provider;
pub mod license;
pub mod plan;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod service;
pub mod singleton;
pub mod timeouts;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{ControllerApi, HttpControllerApi, ListQuery};
pub use error::{ControlError, Result};
pub use plan::{AttributeChange, PlanResult};
pub use registry::{ProviderSchema, Registry};
pub use resource::{Attrs, DataSource, OpContext, Resource};
pub use retry::{Backoff, Deadline};
pub use schema::Schema;
pub use service::{Outcome, ProviderService, ServiceConfig};
pub use timeouts::{Operation, Timeouts};
