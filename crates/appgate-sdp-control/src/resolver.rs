//! Resolve an entity reference given by id or by name.
//!
//! Name lookups go through the Controller's list query, which matches names
//! by substring. Results are therefore filtered for exact equality before
//! one is picked:
//!
//! ```text
//!   query "b"  ─►  [b, ba, bar]  ─► exact ─► [b]       ─► b
//!   query "x"  ─►  [xa, xb]      ─► exact ─► []        ─► not found
//!   query "d"  ─►  [d, d]        ─► exact ─► [d, d]    ─► ambiguous
//! ```

use serde_json::Value;
use tracing::debug;

use appgate_sdp_core::EntityKind;

use crate::api::{ControllerApi, ListQuery};
use crate::error::{ControlError, Result};

/// Resolve `kind` by exactly one of `id` and `name`.
///
/// # Errors
///
/// - `Validation` if neither or both of `id` and `name` are given.
/// - `NotFound` if nothing matches.
/// - `Ambiguous` if several entities carry the exact name.
pub async fn resolve(
    api: &dyn ControllerApi,
    kind: EntityKind,
    id: Option<&str>,
    name: Option<&str>,
) -> Result<Value> {
    let id = id.filter(|s| !s.is_empty());
    let name = name.filter(|s| !s.is_empty());

    match (id, name) {
        (Some(id), None) => resolve_by_id(api, kind, id).await,
        (None, Some(name)) => resolve_by_name(api, kind, name).await,
        (None, None) => Err(ControlError::validation(format!(
            "one of {kind}_id or {kind}_name must be set"
        ))),
        (Some(_), Some(_)) => Err(ControlError::validation(format!(
            "only one of {kind}_id or {kind}_name may be set"
        ))),
    }
}

/// Fetch an entity by id.
///
/// # Errors
///
/// Returns `NotFound` naming `kind` and `id` on 404.
pub async fn resolve_by_id(api: &dyn ControllerApi, kind: EntityKind, id: &str) -> Result<Value> {
    api.get(&kind.entity_path(id))
        .await
        .map_err(|e| e.for_entity(kind.as_str(), id))
}

/// Find the single entity of `kind` whose name equals `name`.
///
/// # Errors
///
/// Returns `NotFound` or `Ambiguous`.
pub async fn resolve_by_name(api: &dyn ControllerApi, kind: EntityKind, name: &str) -> Result<Value> {
    let candidates = api.list(kind.api_path(), &ListQuery::by_name(name)).await?;
    let returned = candidates.len();

    let mut exact: Vec<Value> = candidates
        .into_iter()
        .filter(|entity| entity.get("name").and_then(Value::as_str) == Some(name))
        .collect();

    debug!(kind = %kind, name = %name, returned, exact = exact.len(), "Name lookup");

    match exact.len() {
        0 => Err(ControlError::not_found(kind.as_str(), name)),
        1 => Ok(exact.remove(0)),
        _ => Err(ControlError::Ambiguous {
            kind: kind.to_string(),
            name: name.to_string(),
        }),
    }
}
