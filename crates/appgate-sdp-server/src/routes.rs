//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{data_sources, health, provider, resources};
use crate::state::ServerState;

/// Create the router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `GET /v1/schema` - Every resource and data source schema
/// - `POST /v1/provider/configure` - Attach the Controller
/// - `POST /v1/resources/{type}/{operation}` - `validate`, `plan`, `create`,
///   `read`, `update`, `delete`, `import`, `upgrade`
/// - `POST /v1/data-sources/{type}/read` - Resolve a data source
pub fn create_router(state: ServerState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/schema", get(provider::schema))
        .route("/v1/provider/configure", post(provider::configure))
        .route(
            "/v1/resources/{type_name}/{operation}",
            post(resources::operation),
        )
        .route("/v1/data-sources/{type_name}/read", post(data_sources::read))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(timeout_layer(request_timeout)),
        )
        .with_state(state)
}

/// Requests running past `timeout` are answered with 408.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}
