//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the plugin host API.

pub mod data_sources;
pub mod health;
pub mod provider;
pub mod resources;

use appgate_sdp_core::Diagnostics;
use appgate_sdp_control::Outcome;
use axum::http::StatusCode;

/// Status code for an operation outcome.
fn status_of<T>(outcome: &Outcome<T>) -> StatusCode {
    StatusCode::from_u16(outcome.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Split an outcome into status, value and diagnostics.
fn split<T>(outcome: Outcome<T>) -> (StatusCode, Option<T>, Diagnostics) {
    let status = status_of(&outcome);
    (status, outcome.value, outcome.diagnostics)
}
