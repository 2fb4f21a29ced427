//! Resource endpoints.
//!
//! One route serves every operation: `POST /v1/resources/{type}/{operation}`.
//! The body carries whichever attribute maps the operation needs.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use appgate_sdp_control::{Attrs, PlanResult};
use appgate_sdp_core::Diagnostics;

use super::split;
use crate::error::ApiError;
use crate::state::ServerState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request body shared by every resource operation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    /// Configuration to validate.
    pub config: Option<Attrs>,
    /// Prior state, for `plan` and `update`.
    pub prior: Option<Attrs>,
    /// Proposed configuration, for `plan`.
    pub proposed: Option<Attrs>,
    /// Planned state, for `create` and `update`.
    pub planned: Option<Attrs>,
    /// Current state, for `read`, `delete` and `upgrade`.
    pub state: Option<Attrs>,
    /// Entity id, for `import`.
    pub id: Option<String>,
    /// Schema version the state was written with, for `upgrade`.
    pub version: Option<u64>,
}

impl ResourceRequest {
    fn take(slot: Option<Attrs>, name: &str) -> Result<Attrs, ApiError> {
        slot.ok_or_else(|| ApiError::BadRequest(format!("`{name}` is required")))
    }
}

/// Response body of every resource operation.
#[derive(Debug, Default, Serialize)]
pub struct ResourceResponse {
    /// New state; `null` removes the instance from state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Plan, for `plan`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanResult>,
    /// Errors and warnings.
    pub diagnostics: Diagnostics,
}

fn present(state: Attrs) -> Value {
    Value::Object(state)
}

fn maybe_gone(state: Option<Attrs>) -> Value {
    state.map_or(Value::Null, Value::Object)
}

// =============================================================================
// Handlers
// =============================================================================

/// Run one resource operation.
///
/// Operations: `validate`, `plan`, `create`, `read`, `update`, `delete`,
/// `import`, `upgrade`.
///
/// # Errors
///
/// Returns 400 for a malformed body and 404 for an unknown operation. Failures
/// of the operation itself are answered with their diagnostics and a status
/// derived from the first error.
pub async fn operation(
    State(state): State<ServerState>,
    Path((type_name, operation)): Path<(String, String)>,
    payload: Result<Json<ResourceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ResourceResponse>), ApiError> {
    let Json(request) = payload?;
    let service = &state.service;
    let cancel = state.operation_token();

    let (status, response) = match operation.as_str() {
        "validate" => {
            let config = ResourceRequest::take(request.config, "config")?;
            let (status, _, diagnostics) = split(service.validate(&type_name, &config));
            (status, ResourceResponse { diagnostics, ..ResourceResponse::default() })
        }
        "plan" => {
            let proposed = ResourceRequest::take(request.proposed, "proposed")?;
            let (status, plan, diagnostics) =
                split(service.plan(&type_name, request.prior.as_ref(), &proposed));
            (status, ResourceResponse { plan, diagnostics, ..ResourceResponse::default() })
        }
        "create" => {
            let planned = ResourceRequest::take(request.planned, "planned")?;
            let (status, created, diagnostics) =
                split(service.create(&type_name, &planned, cancel).await);
            (status, ResourceResponse { state: created.map(present), diagnostics, plan: None })
        }
        "read" => {
            let current = ResourceRequest::take(request.state, "state")?;
            let (status, read, diagnostics) =
                split(service.read(&type_name, &current, cancel).await);
            (status, ResourceResponse { state: read.map(maybe_gone), diagnostics, plan: None })
        }
        "update" => {
            let prior = ResourceRequest::take(request.prior, "prior")?;
            let planned = ResourceRequest::take(request.planned, "planned")?;
            let (status, updated, diagnostics) =
                split(service.update(&type_name, &prior, &planned, cancel).await);
            (status, ResourceResponse { state: updated.map(maybe_gone), diagnostics, plan: None })
        }
        "delete" => {
            let current = ResourceRequest::take(request.state, "state")?;
            let (status, deleted, diagnostics) =
                split(service.delete(&type_name, &current, cancel).await);
            let state = deleted.map(|()| Value::Null);
            (status, ResourceResponse { state, diagnostics, plan: None })
        }
        "import" => {
            let id = request
                .id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::BadRequest("`id` is required".to_string()))?;
            let (status, imported, diagnostics) =
                split(service.import(&type_name, &id, cancel).await);
            (status, ResourceResponse { state: imported.map(present), diagnostics, plan: None })
        }
        "upgrade" => {
            let version = request.version.unwrap_or_default();
            let (status, upgraded, diagnostics) =
                split(service.upgrade(&type_name, version, request.state).await);
            (status, ResourceResponse { state: upgraded.map(maybe_gone), diagnostics, plan: None })
        }
        other => return Err(ApiError::UnknownOperation(other.to_string())),
    };

    Ok((status, Json(response)))
}
