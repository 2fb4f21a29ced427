//! The Controller license.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::convert::{carry_local, from_wire, to_wire};
use crate::crud::TYPE_PREFIX;
use crate::error::{ControlError, Result};
use crate::resource::{require_id, Attrs, OpContext, Resource};
use crate::schema::{Attribute, Block, Schema};
use crate::timeouts::timeouts_block;

/// The license endpoint.
pub const LICENSE_PATH: &str = "/license";

/// Entries of a license answer: a `data` list, a bare list or one document.
fn entries(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(_) => Vec::new(),
            None if map.contains_key("id") => vec![Value::Object(map)],
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// `appgatesdp_license`.
pub struct License {
    type_name: String,
    schema: Schema,
}

impl Default for License {
    fn default() -> Self {
        Self::new()
    }
}

impl License {
    /// The resource.
    #[must_use]
    pub fn new() -> Self {
        let fields = Block::new()
            .attr("id", Attribute::string().computed())
            .attr("license", Attribute::string().required().write_only().force_new())
            .attr("license_type", Attribute::string().computed().wire("type"))
            .attr("request", Attribute::string().computed())
            .attr("expiration", Attribute::string().computed());
        Self {
            type_name: format!("{TYPE_PREFIX}license"),
            schema: Schema::new(0).with(fields).with(timeouts_block()),
        }
    }

    fn state_from_entry(&self, entry: &Value, source: &Attrs) -> Attrs {
        let mut state = entry
            .as_object()
            .map(|map| from_wire(&self.schema.block, map))
            .unwrap_or_default();
        carry_local(&self.schema.block, source, &mut state);
        state
    }

    async fn find(&self, ctx: &OpContext, id: &str) -> Result<Option<Value>> {
        let body = match ctx.api().get(LICENSE_PATH).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(entries(body)
            .into_iter()
            .find(|entry| entry.get("id").and_then(Value::as_str) == Some(id)))
    }
}

#[async_trait]
impl Resource for License {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        let body = Value::Object(to_wire(&self.schema.block, planned, None));
        let created = ctx.api().post(LICENSE_PATH, &body).await?;
        let state = self.state_from_entry(&created, planned);
        if state.get("id").and_then(Value::as_str).is_none() {
            return Err(ControlError::Internal(
                "the Controller did not return a license id".to_string(),
            ));
        }
        info!(
            id = %state.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
            "License installed"
        );
        Ok(state)
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        let id = require_id(state)?;
        let found = self.find(ctx, id).await?;
        if found.is_none() {
            debug!(id = %id, "License no longer installed");
        }
        Ok(found.map(|entry| self.state_from_entry(&entry, state)))
    }

    async fn update(&self, ctx: &OpContext, _prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        // Every configurable attribute forces replacement; only timeouts change here.
        self.read(ctx, planned).await
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        let id = require_id(state)?;
        match ctx.api().delete(LICENSE_PATH).await {
            Ok(()) => {
                info!(id = %id, "License removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Deadline;
    use crate::testing::MemoryController;
    use appgate_sdp_core::ControllerVersion;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(api: &Arc<MemoryController>) -> OpContext {
        OpContext::new(api.clone(), Deadline::after(Duration::from_secs(5)).with_pad(Duration::ZERO))
    }

    #[tokio::test]
    async fn install_read_remove() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.singleton_endpoint(LICENSE_PATH);
        let license = License::new();
        let planned = json!({"license": "BLOB"}).as_object().cloned().unwrap();

        let state = license.create(&ctx(&api), &planned).await.unwrap();
        assert_eq!(state["license"], "BLOB");
        assert_eq!(api.requests_of("POST")[0].body, Some(json!({"license": "BLOB"})));

        let read = license.read(&ctx(&api), &state).await.unwrap().unwrap();
        assert_eq!(read["id"], state["id"]);
        assert_eq!(read["license"], "BLOB");

        license.delete(&ctx(&api), &state).await.unwrap();
        assert!(license.read(&ctx(&api), &state).await.unwrap().is_none());
    }

    #[test]
    fn entries_accept_every_shape() {
        assert_eq!(entries(json!({"data": [{"id": "a"}]})).len(), 1);
        assert_eq!(entries(json!({"id": "a", "expiration": "2030-01-01"})).len(), 1);
        assert!(entries(json!({})).is_empty());
    }

    #[tokio::test]
    async fn other_license_is_not_ours() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.set_singleton(LICENSE_PATH, json!({"data": [{"id": "someone-else"}]}));
        let state = json!({"id": "mine"}).as_object().cloned().unwrap();
        assert!(License::new().read(&ctx(&api), &state).await.unwrap().is_none());
    }
}
