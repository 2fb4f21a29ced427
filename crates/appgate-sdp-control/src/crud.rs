//! The create/read/update/delete skeleton shared by entity resources.
//!
//! ```text
//!   create:  check versions ─► assign id ─► POST /{kind}        ─► state
//!   read:    GET /{kind}/{id}              (404 ─► drop from state)
//!   update:  GET /{kind}/{id} ─► patch changed fields ─► PUT    ─► state
//!   delete:  DELETE /{kind}/{id}           (404 ─► success)
//! ```
//!
//! Updates always send the fetched body with the changed fields overlaid, so
//! fields the Controller computed (timestamps, server tags) survive.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use appgate_sdp_core::{Diagnostic, EntityId, EntityKind};

use crate::convert::{carry_local, from_wire, patch_wire, to_wire};
use crate::error::{ControlError, Result};
use crate::groups;
use crate::resource::{require_id, Attrs, OpContext, Resource};
use crate::schema::{Block, Schema};
use crate::timeouts::timeouts_block;

/// Prefix of every registered type name.
pub const TYPE_PREFIX: &str = "appgatesdp_";

/// Endpoints of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Kind label used in messages.
    pub kind: EntityKind,
    /// Name of the computed id mirror, e.g. `site_id`.
    pub id_attr: &'static str,
}

impl Endpoint {
    /// The endpoint of `kind`, with `id_attr` as id mirror.
    #[must_use]
    pub const fn new(kind: EntityKind, id_attr: &'static str) -> Self {
        Self { kind, id_attr }
    }

    /// Collection path.
    #[must_use]
    pub const fn collection(&self) -> &'static str {
        self.kind.api_path()
    }

    /// Single entity path.
    #[must_use]
    pub fn entity(&self, id: &str) -> String {
        self.kind.entity_path(id)
    }
}

/// State from a Controller body: managed attributes from the wire, state-only
/// and write-only attributes from `source`, the id mirrored into `id_attr`.
#[must_use]
pub fn state_from_remote(endpoint: &Endpoint, block: &Block, remote: &Value, source: &Attrs) -> Attrs {
    let mut state = remote
        .as_object()
        .map(|body| from_wire(block, body))
        .unwrap_or_default();
    carry_local(block, source, &mut state);
    if let Some(id) = state.get("id").cloned() {
        state.insert(endpoint.id_attr.to_string(), id);
    }
    state
}

/// POST a new entity built from `planned`.
///
/// # Errors
///
/// Returns `VersionUnsupported` for attributes the Controller does not know,
/// or the Controller's error.
pub async fn create_entity(
    ctx: &OpContext,
    endpoint: &Endpoint,
    block: &Block,
    planned: &Attrs,
) -> Result<Attrs> {
    let gate = ctx.gate().await?;
    block.check_versions(planned, &gate)?;

    let mut body = to_wire(block, planned, Some(&gate));
    if !body.contains_key("id") {
        body.insert("id".to_string(), Value::String(EntityId::generate().to_string()));
    }
    let body = Value::Object(body);

    let created = ctx.api().post(endpoint.collection(), &body).await?;
    let remote = if created.is_object() { created } else { body };
    let state = state_from_remote(endpoint, block, &remote, planned);

    info!(
        kind = %endpoint.kind,
        id = %state.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
        "Entity created"
    );
    Ok(state)
}

/// GET an entity; `None` when the Controller no longer has it.
///
/// # Errors
///
/// Returns the Controller's error for anything but 404.
pub async fn read_entity(
    ctx: &OpContext,
    endpoint: &Endpoint,
    block: &Block,
    state: &Attrs,
) -> Result<Option<Attrs>> {
    let id = require_id(state)?;
    match ctx.api().get(&endpoint.entity(id)).await {
        Ok(remote) => Ok(Some(state_from_remote(endpoint, block, &remote, state))),
        Err(e) if e.is_not_found() => {
            warn!(kind = %endpoint.kind, id = %id, "Entity gone, removing from state");
            Ok(None)
        }
        Err(e) => Err(e.for_entity(endpoint.kind.as_str(), id)),
    }
}

/// Fetch, patch and PUT an entity.
///
/// A 404 on the fetch or the PUT means the entity vanished; a warning is
/// recorded and `None` returned so the orchestrator plans a create.
///
/// # Errors
///
/// Returns `VersionUnsupported` for attributes the Controller does not know,
/// or the Controller's error.
pub async fn update_entity(
    ctx: &OpContext,
    endpoint: &Endpoint,
    block: &Block,
    prior: &Attrs,
    planned: &Attrs,
) -> Result<Option<Attrs>> {
    let id = require_id(prior)?;
    let gate = ctx.gate().await?;
    block.check_versions(planned, &gate)?;

    let path = endpoint.entity(id);
    let mut remote = match ctx.api().get(&path).await {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(ControlError::Internal(format!("{path} is not an object"))),
        Err(e) if e.is_not_found() => return Ok(vanished(ctx, endpoint, id)),
        Err(e) => return Err(e),
    };
    patch_wire(block, &mut remote, prior, planned, Some(&gate));
    let body = Value::Object(remote);

    let updated = match ctx.api().put(&path, &body).await {
        Ok(updated) => updated,
        Err(e) if e.is_not_found() => return Ok(vanished(ctx, endpoint, id)),
        Err(e) => return Err(e),
    };
    let remote = if updated.is_object() { updated } else { body };

    info!(kind = %endpoint.kind, id = %id, "Entity updated");
    Ok(Some(state_from_remote(endpoint, block, &remote, planned)))
}

pub(crate) fn vanished(ctx: &OpContext, endpoint: &Endpoint, id: &str) -> Option<Attrs> {
    warn!(kind = %endpoint.kind, id = %id, "Entity vanished during update");
    ctx.warn(Diagnostic::warning(format!(
        "{} {id} no longer exists on the Controller and was removed from state",
        endpoint.kind
    )));
    None
}

/// DELETE an entity. 404 counts as success.
///
/// # Errors
///
/// Returns the Controller's error for anything but 404.
pub async fn delete_entity(ctx: &OpContext, endpoint: &Endpoint, state: &Attrs) -> Result<()> {
    let id = require_id(state)?;
    match ctx.api().delete(&endpoint.entity(id)).await {
        Ok(()) => {
            info!(kind = %endpoint.kind, id = %id, "Entity deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(kind = %endpoint.kind, id = %id, "Entity already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// A resource managed entirely by the skeleton.
pub struct GenericResource {
    type_name: String,
    endpoint: Endpoint,
    schema: Schema,
}

impl GenericResource {
    /// A resource for `kind` with the base entity attributes plus `fields`.
    #[must_use]
    pub fn new(kind: EntityKind, id_attr: &'static str, fields: Block) -> Self {
        let schema = Schema::new(0)
            .with(groups::base_entity(id_attr))
            .with(fields)
            .with(timeouts_block());
        Self {
            type_name: format!("{TYPE_PREFIX}{kind}"),
            endpoint: Endpoint::new(kind, id_attr),
            schema,
        }
    }

    /// The managed endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Resource for GenericResource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        create_entity(ctx, &self.endpoint, &self.schema.block, planned).await
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        read_entity(ctx, &self.endpoint, &self.schema.block, state).await
    }

    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        update_entity(ctx, &self.endpoint, &self.schema.block, prior, planned).await
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        delete_entity(ctx, &self.endpoint, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Deadline;
    use crate::schema::{AttrType, Attribute};
    use crate::testing::MemoryController;
    use appgate_sdp_core::ControllerVersion;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn site() -> GenericResource {
        GenericResource::new(
            EntityKind::Site,
            "site_id",
            Block::new()
                .attr("short_name", Attribute::string())
                .attr("network_subnets", Attribute::set(AttrType::String)),
        )
    }

    fn ctx(api: &Arc<MemoryController>) -> OpContext {
        let api: Arc<dyn crate::api::ControllerApi> = api.clone();
        OpContext::new(api, Deadline::after(Duration::from_secs(5)).with_pad(Duration::ZERO))
    }

    fn attrs(value: Value) -> Attrs {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_id_and_mirrors_it() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let state = site()
            .create(&ctx(&api), &attrs(json!({"name": "hq", "short_name": "h", "notes": "n"})))
            .await
            .unwrap();

        let id = state["id"].as_str().unwrap();
        assert_eq!(state["site_id"], id);
        assert_eq!(state["short_name"], "h");
        assert!(api.entity("/sites", id).is_some());
        assert_eq!(api.entity("/sites", id).unwrap()["shortName"], "h");
    }

    #[tokio::test]
    async fn pinned_id_is_sent() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let pinned = "0b5c3a10-4bde-4d4a-a2b1-0b0ef1c9a001";
        site()
            .create(&ctx(&api), &attrs(json!({"id": pinned, "name": "hq"})))
            .await
            .unwrap();
        assert!(api.entity("/sites", pinned).is_some());
    }

    #[tokio::test]
    async fn read_of_missing_entity_drops_state() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let result = site()
            .read(&ctx(&api), &attrs(json!({"id": "stale", "name": "hq"})))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn update_preserves_server_fields() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert(
            "/sites",
            json!({"id": "s1", "name": "hq", "shortName": "h", "created": "2024-01-01T00:00:00Z"}),
        );
        let prior = attrs(json!({"id": "s1", "name": "hq", "short_name": "h"}));
        let planned = attrs(json!({"id": "s1", "name": "hq", "short_name": "x"}));

        let state = site().update(&ctx(&api), &prior, &planned).await.unwrap().unwrap();

        assert_eq!(state["short_name"], "x");
        let stored = api.entity("/sites", "s1").unwrap();
        assert_eq!(stored["shortName"], "x");
        assert_eq!(stored["created"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn update_of_vanished_entity_warns() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let ctx = ctx(&api);
        let prior = attrs(json!({"id": "gone", "name": "hq"}));
        let result = site().update(&ctx, &prior, &prior).await.unwrap();
        assert!(result.is_none());
        assert_eq!(ctx.take_warnings().len(), 1);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_entity() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        site()
            .delete(&ctx(&api), &attrs(json!({"id": "gone"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn import_reads_by_id() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert("/sites", json!({"id": "s1", "name": "hq", "tags": ["a"]}));
        let state = site().import(&ctx(&api), "s1").await.unwrap();
        assert_eq!(state["name"], "hq");
        assert_eq!(state["site_id"], "s1");

        let err = site().import(&ctx(&api), "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
