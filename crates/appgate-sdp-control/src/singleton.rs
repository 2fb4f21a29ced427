//! Resources living inside Controller-wide singleton documents.
//!
//! ```text
//!   ┌────────────────────── /clientConnections ─────────────────────┐
//!   │ spaMode   profileHostname   profiles: [ A, B, ... ]           │
//!   └──────────────────────────────────▲────────────────────────────┘
//!          appgatesdp_client_profile ──┘ one entry, keyed on name
//!          appgatesdp_client_connections ── the document (legacy)
//!
//!   /globalSettings      ◄── appgatesdp_global_settings (id = collectiveId)
//!   /adminMfaSettings    ◄── appgatesdp_admin_mfa_settings
//! ```
//!
//! Every mutation fetches the current document, changes only its own slice
//! and writes the whole document back. Entries added by other actors in the
//! meantime survive.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use appgate_sdp_core::Diagnostic;

use crate::api::list_entries;
use crate::appliance::STATUS_PATH;
use crate::convert::{carry_local, from_wire, patch_wire, to_wire};
use crate::crud::TYPE_PREFIX;
use crate::error::{ControlError, Result};
use crate::resource::{require_id, str_attr, Attrs, OpContext, Resource};
use crate::retry::retry;
use crate::schema::{AttrType, Attribute, Block, Nesting, Presence, Schema};
use crate::timeouts::timeouts_block;

/// The client connections document.
pub const CLIENT_CONNECTIONS_PATH: &str = "/clientConnections";
/// The global settings document.
pub const GLOBAL_SETTINGS_PATH: &str = "/globalSettings";
/// The administrator MFA settings document.
pub const ADMIN_MFA_SETTINGS_PATH: &str = "/adminMfaSettings";

async fn fetch_document(ctx: &OpContext, path: &str) -> Result<Option<Map<String, Value>>> {
    match ctx.api().get(path).await {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(ControlError::Internal(format!("{path} is not an object"))),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn require_document(ctx: &OpContext, path: &str) -> Result<Map<String, Value>> {
    fetch_document(ctx, path)
        .await?
        .ok_or_else(|| ControlError::not_found("document", path))
}

/// Fail with a retriable error while any appliance of the collective is busy
/// or failing.
async fn ensure_healthy(ctx: &OpContext) -> Result<()> {
    let body = ctx.api().get(STATUS_PATH).await?;
    let unhealthy: Vec<String> = list_entries(body)
        .iter()
        .filter(|entry| {
            matches!(
                entry.get("status").and_then(Value::as_str),
                Some("busy" | "error" | "offline")
            )
        })
        .map(|entry| {
            entry
                .get("name")
                .or_else(|| entry.get("id"))
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string()
        })
        .collect();

    if unhealthy.is_empty() {
        Ok(())
    } else {
        Err(ControlError::Api {
            status: 503,
            message: format!("collective is not healthy: {}", unhealthy.join(", ")),
            detail: None,
        })
    }
}

/// Case-insensitive profile name comparison.
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

fn take_profiles(doc: &mut Map<String, Value>) -> Vec<Value> {
    match doc.remove("profiles") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn find_profile<'a>(doc: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    doc.get("profiles")
        .and_then(Value::as_array)?
        .iter()
        .find(|p| entry_name(p).is_some_and(|n| same_name(n, name)))
}

fn profile_block() -> Block {
    Block::new()
        .attr("name", Attribute::string().required().force_new())
        .attr("spa_key_name", Attribute::string().required().force_new())
        .attr("identity_provider_name", Attribute::string().required())
        .attr("url", Attribute::string().computed())
}

/// `appgatesdp_client_profile`: one entry of the client connections profiles.
pub struct ClientProfile {
    type_name: String,
    entry: Block,
    schema: Schema,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientProfile {
    /// The resource.
    #[must_use]
    pub fn new() -> Self {
        let entry = profile_block();
        let schema = Schema::new(0)
            .attr("id", Attribute::string().computed().local())
            .with(entry.clone())
            .with(timeouts_block());
        Self {
            type_name: format!("{TYPE_PREFIX}client_profile"),
            entry,
            schema,
        }
    }

    fn state_from_entry(&self, entry: &Value, source: &Attrs) -> Attrs {
        let mut state = entry
            .as_object()
            .map(|map| from_wire(&self.entry, map))
            .unwrap_or_default();
        carry_local(&self.schema.block, source, &mut state);
        if let Some(name) = entry_name(entry) {
            state.insert("id".to_string(), Value::String(name.to_string()));
        }
        state
    }

    fn name(attrs: &Attrs) -> Result<&str> {
        str_attr(attrs, "name")
            .or_else(|| str_attr(attrs, "id"))
            .ok_or_else(|| ControlError::validation("client profile name is required"))
    }

    /// Replace the entry named `name` with `wire`, or append it.
    ///
    /// `replace_only` makes a missing entry an error instead.
    async fn upsert(ctx: &OpContext, name: &str, wire: &Value, replace_only: bool) -> Result<Value> {
        retry(ctx.deadline(), ctx.backoff(), "client_profile.write", move || async move {
            ensure_healthy(ctx).await?;
            let mut doc = require_document(ctx, CLIENT_CONNECTIONS_PATH).await?;
            let mut profiles = take_profiles(&mut doc);

            match profiles
                .iter_mut()
                .find(|p| entry_name(p).is_some_and(|n| same_name(n, name)))
            {
                Some(existing) => *existing = wire.clone(),
                None if replace_only => return Err(ControlError::not_found("client profile", name)),
                None => profiles.push(wire.clone()),
            }
            doc.insert("profiles".to_string(), Value::Array(profiles));

            ctx.api()
                .put(CLIENT_CONNECTIONS_PATH, &Value::Object(doc))
                .await?;
            ensure_healthy(ctx).await?;

            let doc = require_document(ctx, CLIENT_CONNECTIONS_PATH).await?;
            find_profile(&doc, name).cloned().ok_or_else(|| {
                ControlError::Conflict(format!("client profile {name} not visible after write"))
            })
        })
        .await
    }
}

#[async_trait]
impl Resource for ClientProfile {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        let name = Self::name(planned)?;
        let wire = Value::Object(to_wire(&self.entry, planned, None));

        if let Some(doc) = fetch_document(ctx, CLIENT_CONNECTIONS_PATH).await? {
            if let Some(existing) = find_profile(&doc, name) {
                let existing_name = entry_name(existing).unwrap_or(name);
                return Err(ControlError::validation(format!(
                    "client profile {existing_name:?} already exists; profile names are case-insensitive"
                )));
            }
        }

        let entry = Self::upsert(ctx, name, &wire, false).await?;
        info!(profile = %name, "Client profile added");
        Ok(self.state_from_entry(&entry, planned))
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        let name = Self::name(state)?;
        let Some(doc) = fetch_document(ctx, CLIENT_CONNECTIONS_PATH).await? else {
            return Ok(None);
        };
        Ok(find_profile(&doc, name).map(|entry| self.state_from_entry(entry, state)))
    }

    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        let name = Self::name(prior)?;
        let wire = Value::Object(to_wire(&self.entry, planned, None));
        match Self::upsert(ctx, name, &wire, true).await {
            Ok(entry) => Ok(Some(self.state_from_entry(&entry, planned))),
            Err(e) if e.is_not_found() => {
                ctx.warn(Diagnostic::warning(format!(
                    "client profile {name} no longer exists and was removed from state"
                )));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        let name = Self::name(state)?;
        retry(ctx.deadline(), ctx.backoff(), "client_profile.delete", move || async move {
            ensure_healthy(ctx).await?;
            let Some(mut doc) = fetch_document(ctx, CLIENT_CONNECTIONS_PATH).await? else {
                return Ok(());
            };
            let mut profiles = take_profiles(&mut doc);
            let before = profiles.len();
            profiles.retain(|p| !entry_name(p).is_some_and(|n| same_name(n, name)));
            if profiles.len() == before {
                debug!(profile = %name, "Client profile already removed");
                return Ok(());
            }
            doc.insert("profiles".to_string(), Value::Array(profiles));

            ctx.api()
                .put(CLIENT_CONNECTIONS_PATH, &Value::Object(doc))
                .await?;
            ensure_healthy(ctx).await?;

            let doc = require_document(ctx, CLIENT_CONNECTIONS_PATH).await?;
            if find_profile(&doc, name).is_some() {
                return Err(ControlError::Conflict(format!(
                    "client profile {name} still present after removal"
                )));
            }
            Ok(())
        })
        .await?;
        info!(profile = %name, "Client profile removed");
        Ok(())
    }
}

/// How a document resource derives its id.
#[derive(Debug, Clone, Copy)]
pub enum Identity {
    /// Taken from a field of the document.
    Field(&'static str),
    /// A fixed value.
    Fixed(&'static str),
}

/// What deleting a document resource does.
#[derive(Debug, Clone)]
pub enum Reset {
    /// `DELETE` on the document path restores the defaults.
    Delete,
    /// Overlay these wire values and PUT the document.
    Put(Map<String, Value>),
}

/// A resource owning a whole singleton document.
///
/// Create and update share one path: fetch, overlay the changed attributes,
/// write back.
pub struct DocumentResource {
    type_name: String,
    path: &'static str,
    identity: Identity,
    reset: Reset,
    schema: Schema,
}

impl DocumentResource {
    /// A document resource over `path`.
    #[must_use]
    pub fn new(name: &str, path: &'static str, identity: Identity, reset: Reset, fields: Block) -> Self {
        let schema = Schema::new(0)
            .attr("id", Attribute::string().computed())
            .with(fields)
            .with(timeouts_block());
        Self {
            type_name: format!("{TYPE_PREFIX}{name}"),
            path,
            identity,
            reset,
            schema,
        }
    }

    fn state_from_document(&self, doc: &Map<String, Value>, source: &Attrs) -> Attrs {
        let mut state = from_wire(&self.schema.block, doc);
        carry_local(&self.schema.block, source, &mut state);
        let id = match self.identity {
            Identity::Field(field) => doc.get(field).cloned().unwrap_or(Value::Null),
            Identity::Fixed(id) => Value::String(id.to_string()),
        };
        state.insert("id".to_string(), id);
        state
    }

    async fn write(&self, ctx: &OpContext, prior: Option<&Attrs>, planned: &Attrs) -> Result<Attrs> {
        let gate = ctx.gate().await?;
        self.schema.block.check_versions(planned, &gate)?;
        let gate = &gate;

        let (doc, desired) = retry(ctx.deadline(), ctx.backoff(), "document.write", move || async move {
            let mut doc = require_document(ctx, self.path).await?;
            let fetched = doc.clone();
            let current = from_wire(&self.schema.block, &doc);
            let prior = prior.unwrap_or(&current);

            // Unset optional+computed settings keep the Controller's value.
            let mut desired = planned.clone();
            for (name, attr) in self.schema.block.iter() {
                let unset = desired.get(name).map_or(true, Value::is_null);
                if unset && attr.presence == Presence::OptionalComputed {
                    if let Some(value) = current.get(name) {
                        desired.insert(name.to_string(), value.clone());
                    }
                }
            }
            patch_wire(&self.schema.block, &mut doc, prior, &desired, Some(gate));

            ctx.api().put(self.path, &Value::Object(doc.clone())).await?;
            let stored = require_document(ctx, self.path).await?;
            if let Some(key) = unapplied_key(&fetched, &doc, &stored) {
                return Err(ControlError::Conflict(format!(
                    "{} still differs in {key} after write",
                    self.path
                )));
            }
            Ok((stored, desired))
        })
        .await?;

        info!(document = %self.path, "Settings written");
        Ok(self.state_from_document(&doc, &desired))
    }
}

/// The first key changed by a write that the stored document does not reflect.
///
/// Keys absent from `stored` are treated as write-only and skipped.
fn unapplied_key<'a>(
    fetched: &Map<String, Value>,
    written: &'a Map<String, Value>,
    stored: &Map<String, Value>,
) -> Option<&'a str> {
    written
        .iter()
        .filter(|(key, value)| fetched.get(*key) != Some(*value))
        .find(|(key, value)| stored.get(*key).is_some_and(|s| !same_value(s, value)))
        .map(|(key, _)| key.as_str())
}

/// Equality that ignores the order of array elements.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
        }
        _ => a == b,
    }
}

#[async_trait]
impl Resource for DocumentResource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        self.write(ctx, None, planned).await
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        Ok(fetch_document(ctx, self.path)
            .await?
            .map(|doc| self.state_from_document(&doc, state)))
    }

    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        self.write(ctx, Some(prior), planned).await.map(Some)
    }

    async fn delete(&self, ctx: &OpContext, _state: &Attrs) -> Result<()> {
        match &self.reset {
            Reset::Delete => match ctx.api().delete(self.path).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            },
            Reset::Put(defaults) => {
                let Some(mut doc) = fetch_document(ctx, self.path).await? else {
                    return Ok(());
                };
                doc.extend(defaults.clone());
                ctx.api().put(self.path, &Value::Object(doc)).await?;
            }
        }
        info!(document = %self.path, "Settings reset to defaults");
        Ok(())
    }

    async fn import(&self, ctx: &OpContext, _id: &str) -> Result<Attrs> {
        fetch_document(ctx, self.path)
            .await?
            .map(|doc| self.state_from_document(&doc, &Attrs::new()))
            .ok_or_else(|| ControlError::not_found("document", self.path))
    }
}

/// `appgatesdp_global_settings`.
#[must_use]
pub fn global_settings() -> DocumentResource {
    let int = || Attribute::int().optional_computed();
    let fields = Block::new()
        .attr("claims_token_expiration", int())
        .attr("entitlement_token_expiration", int())
        .attr("administration_token_expiration", int())
        .attr("vpn_certificate_expiration", int())
        .attr("spa_time_window_seconds", int())
        .attr("login_banner_message", Attribute::string().optional_computed())
        .attr("message_of_the_day", Attribute::string().optional_computed())
        .attr("backup_api_enabled", Attribute::bool().optional_computed())
        .attr("geo_ip_updates", Attribute::bool().optional_computed())
        .attr("fips", Attribute::bool().computed())
        .attr(
            "audit_log_persistence_mode",
            Attribute::string().one_of(&["Default", "Off"]).optional_computed(),
        )
        .attr(
            "app_discovery_domains",
            Attribute::list(AttrType::String).optional_computed(),
        )
        .attr("collective_id", Attribute::string().computed());

    DocumentResource::new(
        "global_settings",
        GLOBAL_SETTINGS_PATH,
        Identity::Field("collectiveId"),
        Reset::Delete,
        fields,
    )
}

/// `appgatesdp_admin_mfa_settings`.
#[must_use]
pub fn admin_mfa_settings() -> DocumentResource {
    let fields = Block::new()
        .attr("provider_id", Attribute::string())
        .attr("exempted_users", Attribute::list(AttrType::String));

    let mut defaults = Map::new();
    defaults.insert("providerId".to_string(), Value::Null);
    defaults.insert("exemptedUsers".to_string(), json!([]));

    DocumentResource::new(
        "admin_mfa_settings",
        ADMIN_MFA_SETTINGS_PATH,
        Identity::Fixed("admin_mfa_settings"),
        Reset::Put(defaults),
        fields,
    )
}

/// `appgatesdp_client_connections`: the legacy whole-document resource.
///
/// Superseded by [`ClientProfile`]. Only the profiles this resource declared
/// are added or removed; profiles managed elsewhere stay.
pub struct ClientConnections {
    type_name: String,
    profile: Block,
    schema: Schema,
}

impl Default for ClientConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConnections {
    /// Fixed id of the document.
    pub const ID: &'static str = "client_connections";

    /// The resource.
    #[must_use]
    pub fn new() -> Self {
        let profile = profile_block();
        let schema = Schema::new(0)
            .attr("id", Attribute::string().computed())
            .attr(
                "spa_mode",
                Attribute::string().one_of(&["TCP", "UDP-TCP"]).optional_computed(),
            )
            .attr("profile_hostname", Attribute::string().optional_computed())
            .attr(
                "profiles",
                Attribute::block(Nesting::List, profile.clone())
                    .deprecated("use appgatesdp_client_profile instead"),
            )
            .with(timeouts_block());
        Self {
            type_name: format!("{TYPE_PREFIX}client_connections"),
            profile,
            schema,
        }
    }

    fn declared_names(attrs: &Attrs) -> Vec<String> {
        attrs
            .get("profiles")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(entry_name).map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn state_from_document(&self, doc: &Map<String, Value>, source: &Attrs) -> Attrs {
        let mut state = Attrs::new();
        state.insert("id".to_string(), Value::String(Self::ID.to_string()));
        for (key, attr) in [("spa_mode", "spaMode"), ("profile_hostname", "profileHostname")] {
            if let Some(value) = doc.get(attr) {
                state.insert(key.to_string(), value.clone());
            }
        }
        // Only the declared profiles belong to this resource.
        let declared = Self::declared_names(source);
        let profiles: Vec<Value> = doc
            .get("profiles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|p| {
                        entry_name(p).is_some_and(|n| declared.iter().any(|d| same_name(d, n)))
                    })
                    .filter_map(Value::as_object)
                    .map(|map| Value::Object(from_wire(&self.profile, map)))
                    .collect()
            })
            .unwrap_or_default();
        state.insert("profiles".to_string(), Value::Array(profiles));
        carry_local(&self.schema.block, source, &mut state);
        state
    }

    async fn write(&self, ctx: &OpContext, prior: Option<&Attrs>, planned: &Attrs) -> Result<Attrs> {
        let owned: Vec<String> = prior.map(Self::declared_names).unwrap_or_default();
        let wanted: Vec<Value> = planned
            .get("profiles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|map| Value::Object(to_wire(&self.profile, map, None)))
                    .collect()
            })
            .unwrap_or_default();
        let owned = &owned;
        let wanted = &wanted;

        let doc = retry(ctx.deadline(), ctx.backoff(), "client_connections.write", move || async move {
            ensure_healthy(ctx).await?;
            let mut doc = require_document(ctx, CLIENT_CONNECTIONS_PATH).await?;
            for (key, attr) in [("spa_mode", "spaMode"), ("profile_hostname", "profileHostname")] {
                if let Some(value) = planned.get(key).filter(|v| !v.is_null()) {
                    doc.insert(attr.to_string(), value.clone());
                }
            }

            let mut profiles = take_profiles(&mut doc);
            profiles.retain(|p| {
                let Some(name) = entry_name(p) else { return true };
                let ours = owned.iter().any(|o| same_name(o, name))
                    || wanted.iter().filter_map(entry_name).any(|w| same_name(w, name));
                !ours
            });
            profiles.extend(wanted.iter().cloned());
            doc.insert("profiles".to_string(), Value::Array(profiles));

            ctx.api()
                .put(CLIENT_CONNECTIONS_PATH, &Value::Object(doc))
                .await?;
            ensure_healthy(ctx).await?;

            let doc = require_document(ctx, CLIENT_CONNECTIONS_PATH).await?;
            if let Some(missing) = wanted
                .iter()
                .filter_map(entry_name)
                .find(|name| find_profile(&doc, name).is_none())
            {
                return Err(ControlError::Conflict(format!(
                    "client profile {missing} not visible after write"
                )));
            }
            if let Some(stale) = owned.iter().find(|name| {
                find_profile(&doc, name).is_some()
                    && !wanted.iter().filter_map(entry_name).any(|w| same_name(w, name))
            }) {
                return Err(ControlError::Conflict(format!(
                    "client profile {stale} still present after removal"
                )));
            }
            Ok(doc)
        })
        .await?;

        info!(profiles = wanted.len(), "Client connections written");
        Ok(self.state_from_document(&doc, planned))
    }
}

#[async_trait]
impl Resource for ClientConnections {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        self.write(ctx, None, planned).await
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        Ok(fetch_document(ctx, CLIENT_CONNECTIONS_PATH)
            .await?
            .map(|doc| self.state_from_document(&doc, state)))
    }

    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        self.write(ctx, Some(prior), planned).await.map(Some)
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        let id = require_id(state)?;
        let mut cleared = state.clone();
        cleared.insert("profiles".to_string(), Value::Array(Vec::new()));
        cleared.remove("spa_mode");
        cleared.remove("profile_hostname");
        self.write(ctx, Some(state), &cleared).await?;
        debug!(id = %id, "Declared client profiles removed");
        Ok(())
    }

    async fn import(&self, ctx: &OpContext, _id: &str) -> Result<Attrs> {
        let doc = require_document(ctx, CLIENT_CONNECTIONS_PATH).await?;
        // Imported state owns every profile present at import time.
        let mut source = Attrs::new();
        source.insert(
            "profiles".to_string(),
            doc.get("profiles").cloned().unwrap_or_else(|| json!([])),
        );
        Ok(self.state_from_document(&doc, &source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Backoff, Deadline};
    use crate::testing::MemoryController;
    use appgate_sdp_core::ControllerVersion;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(api: &Arc<MemoryController>) -> OpContext {
        OpContext::new(
            api.clone(),
            Deadline::after(Duration::from_secs(2)).with_pad(Duration::ZERO),
        )
        .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(5)))
    }

    fn attrs(value: Value) -> Attrs {
        value.as_object().cloned().unwrap()
    }

    fn controller() -> Arc<MemoryController> {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.set_singleton(STATUS_PATH, json!({"data": [{"id": "c1", "status": "healthy"}]}));
        api.set_singleton(
            CLIENT_CONNECTIONS_PATH,
            json!({
                "spaMode": "TCP",
                "profileHostname": "sdp.corp",
                "profiles": [{"name": "A", "spaKeyName": "a", "identityProviderName": "local"}]
            }),
        );
        api
    }

    fn profile_names(api: &MemoryController) -> Vec<String> {
        api.singleton(CLIENT_CONNECTIONS_PATH).unwrap()["profiles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect()
    }

    fn profile_b() -> Attrs {
        attrs(json!({"name": "B", "spa_key_name": "b", "identity_provider_name": "local"}))
    }

    #[tokio::test]
    async fn append_then_remove_round_trip() {
        let api = controller();
        let resource = ClientProfile::new();

        let state = resource.create(&ctx(&api), &profile_b()).await.unwrap();
        assert_eq!(state["id"], "B");
        assert_eq!(profile_names(&api), ["A", "B"]);

        resource.delete(&ctx(&api), &state).await.unwrap();
        assert_eq!(profile_names(&api), ["A"]);
    }

    #[tokio::test]
    async fn delete_tolerates_concurrent_removal() {
        let api = controller();
        let state = attrs(json!({"id": "B", "name": "B"}));
        ClientProfile::new().delete(&ctx(&api), &state).await.unwrap();
        assert_eq!(profile_names(&api), ["A"]);
        assert!(api.requests_of("PUT").is_empty());
    }

    #[tokio::test]
    async fn names_are_case_insensitive() {
        let api = controller();
        let config = attrs(json!({"name": "a", "spa_key_name": "x", "identity_provider_name": "local"}));
        let err = ClientProfile::new().create(&ctx(&api), &config).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let read = ClientProfile::new()
            .read(&ctx(&api), &attrs(json!({"name": "a"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read["spa_key_name"], "a");
    }

    #[tokio::test]
    async fn unhealthy_collective_is_retried() {
        let api = controller();
        api.fail("GET", STATUS_PATH, 503, 2);

        ClientProfile::new().create(&ctx(&api), &profile_b()).await.unwrap();
        assert_eq!(profile_names(&api), ["A", "B"]);
    }

    #[tokio::test]
    async fn global_settings_patch_changed_fields() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.set_singleton(
            GLOBAL_SETTINGS_PATH,
            json!({
                "collectiveId": "col-1",
                "claimsTokenExpiration": 1440,
                "loginBannerMessage": "hello",
                "fips": false
            }),
        );
        let resource = global_settings();

        let state = resource
            .create(&ctx(&api), &attrs(json!({"login_banner_message": "welcome"})))
            .await
            .unwrap();
        assert_eq!(state["id"], "col-1");
        let doc = api.singleton(GLOBAL_SETTINGS_PATH).unwrap();
        assert_eq!(doc["loginBannerMessage"], "welcome");
        assert_eq!(doc["claimsTokenExpiration"], 1440);

        resource.delete(&ctx(&api), &state).await.unwrap();
        assert_eq!(api.requests_of("DELETE").len(), 1);
    }

    #[tokio::test]
    async fn admin_mfa_settings_reset_on_delete() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.set_singleton(ADMIN_MFA_SETTINGS_PATH, json!({"providerId": null, "exemptedUsers": []}));
        let resource = admin_mfa_settings();

        let state = resource
            .create(
                &ctx(&api),
                &attrs(json!({"provider_id": "mfa-1", "exempted_users": ["admin"]})),
            )
            .await
            .unwrap();
        assert_eq!(state["id"], "admin_mfa_settings");
        assert_eq!(api.singleton(ADMIN_MFA_SETTINGS_PATH).unwrap()["providerId"], "mfa-1");

        resource.delete(&ctx(&api), &state).await.unwrap();
        let doc = api.singleton(ADMIN_MFA_SETTINGS_PATH).unwrap();
        assert_eq!(doc["providerId"], Value::Null);
        assert_eq!(doc["exemptedUsers"], json!([]));
    }

    #[tokio::test]
    async fn legacy_resource_touches_only_its_profiles() {
        let api = controller();
        let resource = ClientConnections::new();
        let config = attrs(json!({
            "spa_mode": "UDP-TCP",
            "profiles": [{"name": "C", "spa_key_name": "c", "identity_provider_name": "local"}]
        }));

        let state = resource.create(&ctx(&api), &config).await.unwrap();
        assert_eq!(profile_names(&api), ["A", "C"]);
        assert_eq!(state["profiles"].as_array().unwrap().len(), 1);
        assert_eq!(api.singleton(CLIENT_CONNECTIONS_PATH).unwrap()["spaMode"], "UDP-TCP");

        resource.delete(&ctx(&api), &state).await.unwrap();
        assert_eq!(profile_names(&api), ["A"]);
    }

    #[tokio::test]
    async fn legacy_write_retries_when_overwritten() {
        let api = controller();
        let stale = api.singleton(CLIENT_CONNECTIONS_PATH).unwrap();
        api.revert_after_put(CLIENT_CONNECTIONS_PATH, stale, 1);
        let config = attrs(json!({
            "profiles": [{"name": "C", "spa_key_name": "c", "identity_provider_name": "local"}]
        }));

        let state = ClientConnections::new().create(&ctx(&api), &config).await.unwrap();
        assert_eq!(api.requests_of("PUT").len(), 2);
        assert_eq!(profile_names(&api), ["A", "C"]);
        assert_eq!(state["profiles"][0]["name"], "C");
    }

    #[tokio::test]
    async fn legacy_removal_retries_when_profile_comes_back() {
        let api = controller();
        let resource = ClientConnections::new();
        let config = attrs(json!({
            "profiles": [{"name": "C", "spa_key_name": "c", "identity_provider_name": "local"}]
        }));
        let state = resource.create(&ctx(&api), &config).await.unwrap();

        let with_c = api.singleton(CLIENT_CONNECTIONS_PATH).unwrap();
        api.revert_after_put(CLIENT_CONNECTIONS_PATH, with_c, 1);
        resource.delete(&ctx(&api), &state).await.unwrap();
        assert_eq!(profile_names(&api), ["A"]);
    }

    #[tokio::test]
    async fn legacy_write_fails_when_never_visible() {
        let api = controller();
        let stale = api.singleton(CLIENT_CONNECTIONS_PATH).unwrap();
        api.revert_after_put(CLIENT_CONNECTIONS_PATH, stale, u32::MAX);
        let config = attrs(json!({
            "profiles": [{"name": "C", "spa_key_name": "c", "identity_provider_name": "local"}]
        }));

        let ctx = OpContext::new(
            api.clone(),
            Deadline::after(Duration::from_millis(200)).with_pad(Duration::ZERO),
        )
        .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(5)));
        let err = ClientConnections::new().create(&ctx, &config).await.unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)), "{err}");
        assert_eq!(profile_names(&api), ["A"]);
    }

    #[tokio::test]
    async fn settings_write_retries_when_overwritten() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let original = json!({"collectiveId": "col-1", "loginBannerMessage": "hello"});
        api.set_singleton(GLOBAL_SETTINGS_PATH, original.clone());
        api.revert_after_put(GLOBAL_SETTINGS_PATH, original, 1);

        let state = global_settings()
            .create(&ctx(&api), &attrs(json!({"login_banner_message": "welcome"})))
            .await
            .unwrap();
        assert_eq!(api.requests_of("PUT").len(), 2);
        assert_eq!(state["login_banner_message"], "welcome");
        assert_eq!(
            api.singleton(GLOBAL_SETTINGS_PATH).unwrap()["loginBannerMessage"],
            "welcome"
        );
    }
}
