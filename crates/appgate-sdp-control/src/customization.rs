//! Appliance customization bundles.
//!
//! A customization is a zip uploaded from a local path. The Controller stores
//! it and reports its SHA-256; that stored checksum is what state records.
//! Planning hashes the local file and only schedules an upload when the two
//! disagree.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use appgate_sdp_core::{AttributePath, EntityId, EntityKind};

use crate::convert::{patch_wire, to_wire};
use crate::crud::{delete_entity, read_entity, state_from_remote, vanished, Endpoint, TYPE_PREFIX};
use crate::error::{ControlError, Result};
use crate::groups;
use crate::plan::{AttributeChange, PlanResult};
use crate::resource::{require_id, str_attr, Attrs, OpContext, Resource};
use crate::schema::{Attribute, Block, Schema};
use crate::timeouts::timeouts_block;

const FILE: &str = "file";
const CHECKSUM: &str = "checksum_sha256";

/// Hex SHA-256 of a file.
///
/// # Errors
///
/// Returns a validation error on the `file` attribute if the file cannot be read.
pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = read_bundle(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn unreadable(path: &Path, e: &std::io::Error) -> ControlError {
    ControlError::invalid(
        AttributePath::root(FILE),
        format!("cannot read {}: {e}", path.display()),
    )
}

// Planning is synchronous; applies go through `tokio::fs`.
fn read_bundle(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| unreadable(path, &e))
}

/// `appgatesdp_appliance_customization`.
pub struct ApplianceCustomization {
    type_name: String,
    endpoint: Endpoint,
    schema: Schema,
}

impl Default for ApplianceCustomization {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplianceCustomization {
    /// The resource.
    #[must_use]
    pub fn new() -> Self {
        let fields = Block::new()
            .attr(FILE, Attribute::string().required().local())
            .attr(CHECKSUM, Attribute::string().computed().wire("checksum"))
            .attr("size", Attribute::int().computed());
        Self {
            type_name: format!("{TYPE_PREFIX}appliance_customization"),
            endpoint: Endpoint::new(EntityKind::ApplianceCustomization, "appliance_customization_id"),
            schema: Schema::new(0)
                .with(groups::base_entity("appliance_customization_id"))
                .with(fields)
                .with(timeouts_block()),
        }
    }

    fn file(attrs: &Attrs) -> Result<&Path> {
        str_attr(attrs, FILE)
            .map(Path::new)
            .ok_or_else(|| ControlError::invalid(AttributePath::root(FILE), "file is required"))
    }

    async fn encoded(path: &Path) -> Result<(Value, String)> {
        let bytes = tokio::fs::read(path).await.map_err(|e| unreadable(path, &e))?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        Ok((Value::String(STANDARD.encode(&bytes)), checksum))
    }

    /// Fill in the checksum when the Controller answer lacks it.
    fn with_checksum(mut state: Attrs, checksum: String) -> Attrs {
        if state.get(CHECKSUM).map_or(true, Value::is_null) {
            state.insert(CHECKSUM.to_string(), Value::String(checksum));
        }
        state
    }
}

#[async_trait]
impl Resource for ApplianceCustomization {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn modify_plan(&self, plan: &mut PlanResult, prior: Option<&Attrs>) -> Result<()> {
        let Some(prior) = prior else {
            return Ok(());
        };
        let local = file_checksum(Self::file(&plan.planned_state)?)?;
        let stored = prior.get(CHECKSUM).cloned().unwrap_or(Value::Null);

        if stored.as_str() == Some(local.as_str()) {
            // Same content under another path uploads nothing.
            let path = plan.planned_state.get(FILE).cloned().unwrap_or(Value::Null);
            plan.suppress(FILE, path);
            plan.suppress(CHECKSUM, stored);
        } else {
            debug!(stored = %stored, local = %local, "Customization bundle changed");
            plan.planned_state.insert(CHECKSUM.to_string(), Value::Null);
            plan.changes.retain(|c| c.path != CHECKSUM);
            plan.changes.push(AttributeChange {
                path: CHECKSUM.to_string(),
                before: stored,
                after: Value::Null,
            });
        }
        Ok(())
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        let (content, checksum) = Self::encoded(Self::file(planned)?).await?;
        let gate = ctx.gate().await?;

        let mut body = to_wire(&self.schema.block, planned, Some(&gate));
        if !body.contains_key("id") {
            body.insert("id".to_string(), Value::String(EntityId::generate().to_string()));
        }
        body.insert(FILE.to_string(), content);
        let body = Value::Object(body);

        let created = ctx.api().post(self.endpoint.collection(), &body).await?;
        let mut remote = if created.is_object() { created } else { body };
        if let Some(map) = remote.as_object_mut() {
            map.remove(FILE);
        }
        let state = state_from_remote(&self.endpoint, &self.schema.block, &remote, planned);

        info!(
            id = %state.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
            checksum = %checksum,
            "Customization uploaded"
        );
        Ok(Self::with_checksum(state, checksum))
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        read_entity(ctx, &self.endpoint, &self.schema.block, state).await
    }

    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        let id = require_id(prior)?;
        let gate = ctx.gate().await?;
        let path = self.endpoint.entity(id);

        let mut remote = match ctx.api().get(&path).await {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ControlError::Internal(format!("{path} is not an object"))),
            Err(e) if e.is_not_found() => return Ok(vanished(ctx, &self.endpoint, id)),
            Err(e) => return Err(e),
        };
        patch_wire(&self.schema.block, &mut remote, prior, planned, Some(&gate));

        let (content, checksum) = Self::encoded(Self::file(planned)?).await?;
        let stale = remote.get("checksum").cloned();
        let upload = stale.as_ref().and_then(Value::as_str) != Some(checksum.as_str());
        if upload {
            remote.insert(FILE.to_string(), content);
        }
        let body = Value::Object(remote);

        let updated = match ctx.api().put(&path, &body).await {
            Ok(updated) if updated.is_object() => updated,
            Ok(_) => body,
            Err(e) if e.is_not_found() => return Ok(vanished(ctx, &self.endpoint, id)),
            Err(e) => return Err(e),
        };
        let mut updated = updated;
        if let Some(map) = updated.as_object_mut() {
            map.remove(FILE);
            // An echo of the old checksum is not the new bundle's.
            if upload && map.get("checksum") == stale.as_ref() {
                map.remove("checksum");
            }
        }
        info!(id = %id, uploaded = upload, "Customization updated");
        let state = state_from_remote(&self.endpoint, &self.schema.block, &updated, planned);
        Ok(Some(Self::with_checksum(state, checksum)))
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        delete_entity(ctx, &self.endpoint, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::plan;
    use crate::retry::Deadline;
    use crate::testing::MemoryController;
    use appgate_sdp_core::ControllerVersion;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn bundle(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn config(file: &NamedTempFile) -> Attrs {
        json!({"name": "branding", "file": file.path().to_str().unwrap()})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn ctx(api: &Arc<MemoryController>) -> OpContext {
        OpContext::new(api.clone(), Deadline::after(Duration::from_secs(5)).with_pad(Duration::ZERO))
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let file = bundle(b"abc");
        assert_eq!(
            file_checksum(file.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn unchanged_content_plans_nothing() {
        let resource = ApplianceCustomization::new();
        let file = bundle(b"zip-bytes");
        let mut prior = plan(resource.schema(), None, &config(&file)).planned_state;
        prior.insert("id".to_string(), json!("c1"));
        prior.insert(CHECKSUM.to_string(), json!(file_checksum(file.path()).unwrap()));

        let mut result = plan(resource.schema(), Some(&prior), &config(&file));
        resource.modify_plan(&mut result, Some(&prior)).unwrap();
        assert!(result.is_noop(), "{:?}", result.changes);
    }

    #[test]
    fn changed_content_plans_update() {
        let resource = ApplianceCustomization::new();
        let file = bundle(b"new-bytes");
        let mut prior = plan(resource.schema(), None, &config(&file)).planned_state;
        prior.insert("id".to_string(), json!("c1"));
        prior.insert(CHECKSUM.to_string(), json!("0000"));

        let mut result = plan(resource.schema(), Some(&prior), &config(&file));
        resource.modify_plan(&mut result, Some(&prior)).unwrap();
        assert!(result.changes.iter().any(|c| c.path == CHECKSUM));
        assert_eq!(result.planned_state[CHECKSUM], Value::Null);
    }

    #[test]
    fn missing_file_is_a_validation_error() {
        let resource = ApplianceCustomization::new();
        let prior = json!({"id": "c1", "file": "/nonexistent/bundle.zip", "checksum_sha256": "00"})
            .as_object()
            .cloned()
            .unwrap();
        let mut result = plan(resource.schema(), Some(&prior), &prior);
        let err = resource.modify_plan(&mut result, Some(&prior)).unwrap_err();
        assert!(matches!(err, ControlError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_with_unreadable_file_sends_nothing() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let planned = json!({"name": "branding", "file": "/nonexistent/bundle.zip"})
            .as_object()
            .cloned()
            .unwrap();

        let err = ApplianceCustomization::new()
            .create(&ctx(&api), &planned)
            .await
            .unwrap_err();
        match err {
            ControlError::Validation { path, message } => {
                assert_eq!(path.map(|p| p.to_string()).as_deref(), Some(FILE));
                assert!(message.contains("/nonexistent/bundle.zip"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(api.requests_of("POST").is_empty());
    }

    #[tokio::test]
    async fn create_uploads_base64_content() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let file = bundle(b"zip-bytes");
        let resource = ApplianceCustomization::new();
        let planned = plan(resource.schema(), None, &config(&file)).planned_state;

        let state = resource.create(&ctx(&api), &planned).await.unwrap();
        assert_eq!(state[CHECKSUM], file_checksum(file.path()).unwrap().as_str());
        assert_eq!(state[FILE], file.path().to_str().unwrap());

        let posted = &api.requests_of("POST")[0];
        let body = posted.body.as_ref().unwrap();
        assert_eq!(body["file"], STANDARD.encode(b"zip-bytes"));
        assert_eq!(body["name"], "branding");
    }

    #[tokio::test]
    async fn update_uploads_only_changed_content() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let mut file = bundle(b"v1");
        let resource = ApplianceCustomization::new();
        let planned = plan(resource.schema(), None, &config(&file)).planned_state;
        let state = resource.create(&ctx(&api), &planned).await.unwrap();
        let id = state["id"].as_str().unwrap();
        let mut stored = api.entity("/appliance-customizations", id).unwrap();
        let stored_map = stored.as_object_mut().unwrap();
        stored_map.remove("file");
        stored_map.insert("checksum".to_string(), state[CHECKSUM].clone());
        api.insert("/appliance-customizations", stored);

        let same = resource.update(&ctx(&api), &state, &state).await.unwrap().unwrap();
        assert!(api.requests_of("PUT")[0].body.as_ref().unwrap().get("file").is_none());
        assert_eq!(same[CHECKSUM], state[CHECKSUM]);

        file.write_all(b"-v2").unwrap();
        let changed = resource.update(&ctx(&api), &state, &state).await.unwrap().unwrap();
        assert_eq!(
            api.requests_of("PUT")[1].body.as_ref().unwrap()["file"],
            STANDARD.encode(b"v1-v2")
        );
        assert_eq!(changed[CHECKSUM], file_checksum(file.path()).unwrap().as_str());
    }
}
