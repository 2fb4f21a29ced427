//! Command implementations.
//!
//! Each command drives a [`ProviderService`] and returns the JSON document to
//! print. Warnings are logged; error diagnostics turn into an `Err`.

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use appgate_sdp_control::{Attrs, Outcome, ProviderService};
use appgate_sdp_core::EntityKind;

/// Turn an outcome into its value, failing on error diagnostics.
fn finish(outcome: Outcome<Attrs>) -> anyhow::Result<Value> {
    for warning in outcome.diagnostics.warnings() {
        tracing::warn!("{warning}");
    }
    if outcome.diagnostics.has_errors() {
        let message = outcome
            .diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        bail!(message);
    }
    outcome
        .value
        .map(Value::Object)
        .ok_or_else(|| anyhow!("operation returned no state"))
}

/// Import `id` as `type_name` and return the resulting state.
///
/// # Errors
///
/// Returns an error if the entity does not exist or cannot be read.
pub async fn import(service: &ProviderService, type_name: &str, id: &str) -> anyhow::Result<Value> {
    let outcome = service.import(type_name, id, CancellationToken::new()).await;
    let state = finish(outcome).with_context(|| format!("importing {type_name} {id}"))?;
    Ok(json!({"type": type_name, "id": id, "state": state}))
}

/// Resolve an entity of `kind` by id or by exact name.
///
/// # Errors
///
/// Returns an error if nothing or more than one entity matches.
pub async fn lookup(
    service: &ProviderService,
    kind: EntityKind,
    id: Option<&str>,
    name: Option<&str>,
) -> anyhow::Result<Value> {
    let mut config = Map::new();
    if let Some(id) = id {
        config.insert(format!("{kind}_id"), Value::String(id.to_string()));
    }
    if let Some(name) = name {
        config.insert(format!("{kind}_name"), Value::String(name.to_string()));
    }
    let type_name = format!("appgatesdp_{kind}");
    let outcome = service
        .read_data_source(&type_name, &config, CancellationToken::new())
        .await;
    finish(outcome).with_context(|| format!("looking up {kind}"))
}

/// Every schema the provider exposes.
///
/// # Errors
///
/// Returns an error if a schema cannot be serialised.
pub fn schema(service: &ProviderService) -> anyhow::Result<Value> {
    serde_json::to_value(service.schema()).context("serialising schemas")
}
