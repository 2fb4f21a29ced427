//! Data source endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use appgate_sdp_control::Attrs;

use super::resources::ResourceResponse;
use super::split;
use crate::error::ApiError;
use crate::state::ServerState;

/// Request body of a data source read.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DataSourceRequest {
    /// Lookup configuration, e.g. `{"site_name": "hq"}`.
    pub config: Attrs,
}

/// Resolve a data source.
///
/// ```text
/// POST /v1/data-sources/appgatesdp_site/read
/// { "config": { "site_name": "hq" } }
///
/// Response: 200 OK
/// { "state": { "id": "...", "site_id": "...", "site_name": "hq", ... }, "diagnostics": [] }
/// ```
///
/// # Errors
///
/// Returns 400 for a malformed body.
pub async fn read(
    State(state): State<ServerState>,
    Path(type_name): Path<String>,
    payload: Result<Json<DataSourceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ResourceResponse>), ApiError> {
    let Json(request) = payload?;
    let outcome = state
        .service
        .read_data_source(&type_name, &request.config, state.operation_token())
        .await;
    let (status, value, diagnostics) = split(outcome);
    Ok((
        status,
        Json(ResourceResponse {
            state: value.map(Value::Object),
            plan: None,
            diagnostics,
        }),
    ))
}
