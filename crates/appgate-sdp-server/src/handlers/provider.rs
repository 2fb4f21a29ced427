//! Provider-level endpoints: schema and configuration.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::info;

use appgate_sdp_auth::ProviderConfig;
use appgate_sdp_core::Diagnostics;

use crate::error::ApiError;
use crate::state::ServerState;

/// Response to a configure call.
#[derive(Debug, Serialize)]
pub struct ConfigureResponse {
    /// Always empty on success; errors are returned as an error response.
    pub diagnostics: Diagnostics,
}

/// Every resource and data source schema.
///
/// ```text
/// GET /v1/schema
///
/// Response: 200 OK
/// {
///   "resources": { "appgatesdp_site": { "version": 0, "block": { ... } }, ... },
///   "data_sources": { ... }
/// }
/// ```
pub async fn schema(State(state): State<ServerState>) -> Response {
    Json(state.service.schema()).into_response()
}

/// Attach the provider to a Controller.
///
/// Unset credentials fall back to the `APPGATE_*` environment variables.
///
/// # Errors
///
/// Returns a 422 response for unusable configuration.
pub async fn configure(
    State(state): State<ServerState>,
    payload: Result<Json<ProviderConfig>, JsonRejection>,
) -> Result<Json<ConfigureResponse>, ApiError> {
    let Json(config) = payload?;
    state.service.configure(config.with_process_env())?;
    info!("Provider configuration accepted");
    Ok(Json(ConfigureResponse {
        diagnostics: Diagnostics::new(),
    }))
}
