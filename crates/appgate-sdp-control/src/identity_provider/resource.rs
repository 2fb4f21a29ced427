//! Identity provider resources, one per provider type.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use appgate_sdp_core::{ControllerVersion, Diagnostic, EntityId, EntityKind, VersionGate};

use super::migrate;
use super::model::{IdentityProvider, ProviderType};
use super::schema::resource_schema;
use crate::convert::{patch_wire, to_wire};
use crate::crud::{delete_entity, state_from_remote, Endpoint, TYPE_PREFIX};
use crate::error::{ControlError, Result};
use crate::resolver;
use crate::resource::{require_id, Attrs, OpContext, Resource};
use crate::schema::Schema;

/// The resource managing identity providers of one type.
pub struct IdentityProviderResource {
    provider_type: ProviderType,
    type_name: String,
    endpoint: Endpoint,
    schema: Schema,
}

impl IdentityProviderResource {
    /// The resource for `provider_type`.
    #[must_use]
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            type_name: format!(
                "{TYPE_PREFIX}{}_identity_provider",
                provider_type.resource_prefix()
            ),
            endpoint: Endpoint::new(EntityKind::IdentityProvider, provider_type.id_attr()),
            schema: resource_schema(provider_type),
        }
    }

    /// The managed provider type.
    #[must_use]
    pub const fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    /// Planned attributes adjusted to the connected Controller.
    fn prepare(&self, planned: &Attrs, gate: &VersionGate) -> Result<Attrs> {
        let mut planned = planned.clone();
        if gate.supports(ControllerVersion::V5_5) {
            migrate::hoist_device_limit(&mut planned);
        }
        self.schema.block.check_versions(&planned, gate)?;
        Ok(planned)
    }

    /// Pass a body through the typed model.
    fn typed(&self, mut body: Map<String, Value>) -> Result<Value> {
        // A full PUT clears whatever it omits.
        body.retain(|_, v| !v.is_null());
        body.insert(
            "type".to_string(),
            Value::String(self.provider_type.as_str().to_string()),
        );
        IdentityProvider::expect_type(Value::Object(body), self.provider_type)?.to_body()
    }

    fn decode(&self, remote: Value, source: &Attrs) -> Result<Attrs> {
        let body = IdentityProvider::expect_type(remote, self.provider_type)?.to_body()?;
        Ok(state_from_remote(&self.endpoint, &self.schema.block, &body, source))
    }

    async fn fetch(&self, ctx: &OpContext, id: &str) -> Result<Option<Map<String, Value>>> {
        match ctx.api().get(&self.endpoint.entity(id)).await {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(ControlError::Internal(format!("identity provider {id} is not an object"))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_patched(
        &self,
        ctx: &OpContext,
        id: &str,
        mut remote: Map<String, Value>,
        prior: &Attrs,
        planned: &Attrs,
        gate: &VersionGate,
    ) -> Result<Option<Attrs>> {
        patch_wire(&self.schema.block, &mut remote, prior, planned, Some(gate));
        let body = self.typed(remote)?;

        let updated = match ctx.api().put(&self.endpoint.entity(id), &body).await {
            Ok(updated) => updated,
            Err(e) if e.is_not_found() => return Ok(self.vanished(ctx, id)),
            Err(e) => return Err(e),
        };
        let remote = if updated.is_object() { updated } else { body };
        Ok(Some(self.decode(remote, planned)?))
    }

    fn vanished(&self, ctx: &OpContext, id: &str) -> Option<Attrs> {
        ctx.warn(Diagnostic::warning(format!(
            "{} identity provider {id} no longer exists and was removed from state",
            self.provider_type
        )));
        None
    }

    /// Take over the built-in provider instead of creating one.
    async fn adopt(
        &self,
        ctx: &OpContext,
        builtin: &str,
        planned: &Attrs,
        gate: &VersionGate,
    ) -> Result<Attrs> {
        let remote = resolver::resolve_by_name(ctx.api(), EntityKind::IdentityProvider, builtin).await?;
        let prior = self.decode(remote.clone(), planned)?;
        let id = require_id(&prior)?.to_string();
        let Value::Object(remote) = remote else {
            return Err(ControlError::Internal(format!("identity provider {id} is not an object")));
        };

        info!(provider_type = %self.provider_type, id = %id, "Adopting built-in identity provider");
        self.put_patched(ctx, &id, remote, &prior, planned, gate)
            .await?
            .ok_or_else(|| ControlError::not_found("identity_provider", builtin))
    }
}

#[async_trait]
impl Resource for IdentityProviderResource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        let gate = ctx.gate().await?;
        let planned = self.prepare(planned, &gate)?;

        if let Some(builtin) = self.provider_type.builtin_name() {
            return self.adopt(ctx, builtin, &planned, &gate).await;
        }

        let mut body = to_wire(&self.schema.block, &planned, Some(&gate));
        if !body.contains_key("id") {
            body.insert("id".to_string(), Value::String(EntityId::generate().to_string()));
        }
        let body = self.typed(body)?;

        let created = ctx.api().post(self.endpoint.collection(), &body).await?;
        let remote = if created.is_object() { created } else { body };
        let state = self.decode(remote, &planned)?;

        info!(
            provider_type = %self.provider_type,
            id = %state.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
            "Identity provider created"
        );
        Ok(state)
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        let id = require_id(state)?;
        match self.fetch(ctx, id).await? {
            Some(remote) => Ok(Some(self.decode(Value::Object(remote), state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        let id = require_id(prior)?;
        let gate = ctx.gate().await?;
        let planned = self.prepare(planned, &gate)?;

        let Some(remote) = self.fetch(ctx, id).await? else {
            return Ok(self.vanished(ctx, id));
        };
        let state = self.put_patched(ctx, id, remote, prior, &planned, &gate).await?;
        info!(provider_type = %self.provider_type, id = %id, "Identity provider updated");
        Ok(state)
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        if self.provider_type.builtin_name().is_some() {
            info!(
                provider_type = %self.provider_type,
                "Built-in identity provider removed from state only"
            );
            return Ok(());
        }
        delete_entity(ctx, &self.endpoint, state).await
    }

    fn upgrade(
        &self,
        from_version: u64,
        state: Option<Attrs>,
        controller: Option<ControllerVersion>,
    ) -> Result<Option<Attrs>> {
        match from_version {
            0 => Ok(migrate::v0_to_v1(state, controller)),
            1 => Ok(state),
            v => Err(ControlError::validation(format!(
                "state version {v} is newer than schema version 1"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::plan;
    use crate::retry::Deadline;
    use crate::testing::MemoryController;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const PATH: &str = "/identity-providers";

    fn ctx(api: &Arc<MemoryController>) -> OpContext {
        OpContext::new(api.clone(), Deadline::after(Duration::from_secs(5)).with_pad(Duration::ZERO))
    }

    fn attrs(value: Value) -> Attrs {
        value.as_object().cloned().unwrap()
    }

    fn planned(resource: &IdentityProviderResource, config: Value) -> Attrs {
        plan(resource.schema(), None, &attrs(config)).planned_state
    }

    #[tokio::test]
    async fn ldap_round_trips_shared_fields() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let ldap = IdentityProviderResource::new(ProviderType::Ldap);
        let config = planned(
            &ldap,
            json!({
                "name": "corp",
                "hostnames": ["dc1.corp"],
                "admin_distinguished_name": "CN=admin",
                "admin_password": "pw",
                "ip_pool_v4": "pool",
                "dns_servers": ["10.0.0.53"],
                "claim_mappings": [{"attribute_name": "mail", "claim_name": "email"}]
            }),
        );

        let created = ldap.create(&ctx(&api), &config).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let stored = api.entity(PATH, &id).unwrap();
        assert_eq!(stored["type"], "Ldap");
        assert_eq!(stored["adminPassword"], "pw");
        assert_eq!(stored["claimMappings"][0]["attributeName"], "mail");

        let read = ldap.read(&ctx(&api), &created).await.unwrap().unwrap();
        assert_eq!(read["type"], "Ldap");
        for key in ["name", "ip_pool_v4", "dns_servers", "claim_mappings", "hostnames"] {
            assert_eq!(read[key], config[key], "{key}");
        }
        assert_eq!(read["admin_password"], "pw");
        assert_eq!(read["ldap_identity_provider_id"], id.as_str());
    }

    #[tokio::test]
    async fn ldap_certificate_round_trips_certificate_fields() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let certs = IdentityProviderResource::new(ProviderType::LdapCertificate);
        let config = planned(
            &certs,
            json!({
                "name": "certs",
                "hostnames": ["dc1.corp"],
                "admin_distinguished_name": "CN=admin",
                "admin_password": "pw",
                "ca_certificates": ["PEM"],
                "certificate_user_attribute": "cn",
                "skip_x509_external_checks": true
            }),
        );

        let created = certs.create(&ctx(&api), &config).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let stored = api.entity(PATH, &id).unwrap();
        assert_eq!(stored["type"], "LdapCertificate");
        assert_eq!(stored["caCertificates"], json!(["PEM"]));
        assert_eq!(stored["skipX509ExternalChecks"], true);
        assert_eq!(stored["hostnames"], json!(["dc1.corp"]));

        let read = certs.read(&ctx(&api), &created).await.unwrap().unwrap();
        assert_eq!(read["type"], "LdapCertificate");
        for key in [
            "name",
            "hostnames",
            "admin_distinguished_name",
            "ca_certificates",
            "certificate_user_attribute",
            "certificate_attribute",
            "skip_x509_external_checks",
        ] {
            assert_eq!(read[key], config[key], "{key}");
        }
        assert_eq!(read["ldap_certificate_identity_provider_id"], id.as_str());
    }

    #[tokio::test]
    async fn newer_field_on_old_controller_is_rejected() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V5_4));
        let saml = IdentityProviderResource::new(ProviderType::Saml);
        let config = planned(
            &saml,
            json!({
                "name": "s",
                "redirect_url": "https://r",
                "issuer": "i",
                "audience": "a",
                "provider_certificate": "PEM",
                "network_inactivity_timeout_enabled": true
            }),
        );

        let err = saml.create(&ctx(&api), &config).await.unwrap_err();
        match err {
            ControlError::VersionUnsupported { field, required, .. } => {
                assert_eq!(field, "network_inactivity_timeout_enabled");
                assert_eq!(required.short(), "6.1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(api.requests_of("POST").is_empty());
    }

    #[tokio::test]
    async fn nested_device_limit_moves_to_root_on_new_controllers() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_0));
        let oidc = IdentityProviderResource::new(ProviderType::Oidc);
        let config = planned(
            &oidc,
            json!({
                "name": "o",
                "issuer": "https://issuer",
                "audience": "sdp",
                "on_boarding_two_factor": {"mfa_provider_id": "m1", "device_limit_per_user": 4}
            }),
        );

        let state = oidc.create(&ctx(&api), &config).await.unwrap();
        let stored = api.entity(PATH, state["id"].as_str().unwrap()).unwrap();
        assert_eq!(stored["deviceLimitPerUser"], 4);
        assert!(stored["onBoarding2FA"].get("deviceLimitPerUser").is_none());
    }

    #[tokio::test]
    async fn builtin_is_adopted_and_never_deleted() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert(
            PATH,
            json!({"id": "local-id", "name": "local", "type": "LocalDatabase", "userCount": 12}),
        );
        let local = IdentityProviderResource::new(ProviderType::LocalDatabase);
        let config = planned(&local, json!({"user_lockout_threshold": 3}));

        let state = local.create(&ctx(&api), &config).await.unwrap();
        assert_eq!(state["id"], "local-id");
        assert!(api.requests_of("POST").is_empty());
        let stored = api.entity(PATH, "local-id").unwrap();
        assert_eq!(stored["userLockoutThreshold"], 3);
        assert_eq!(stored["userCount"], 12);

        local.delete(&ctx(&api), &state).await.unwrap();
        assert!(api.requests_of("DELETE").is_empty());
        assert!(api.entity(PATH, "local-id").is_some());
    }

    #[tokio::test]
    async fn connector_is_adopted_and_never_deleted() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert(
            PATH,
            json!({"id": "conn-id", "name": "Connector", "type": "Connector", "ipPoolV4": "old"}),
        );
        api.insert(
            PATH,
            json!({"id": "other", "name": "Connector-2", "type": "Connector"}),
        );
        let connector = IdentityProviderResource::new(ProviderType::Connector);
        let config = planned(&connector, json!({"ip_pool_v4": "pool"}));

        let state = connector.create(&ctx(&api), &config).await.unwrap();
        assert_eq!(state["id"], "conn-id");
        assert_eq!(state["type"], "Connector");
        assert!(api.requests_of("POST").is_empty());
        assert_eq!(api.entity(PATH, "conn-id").unwrap()["ipPoolV4"], "pool");
        assert!(api.entity(PATH, "other").unwrap().get("ipPoolV4").is_none());

        let read = connector.read(&ctx(&api), &state).await.unwrap().unwrap();
        assert_eq!(read["type"], "Connector");
        assert_eq!(read["ip_pool_v4"], "pool");

        connector.delete(&ctx(&api), &state).await.unwrap();
        assert!(api.requests_of("DELETE").is_empty());
        assert!(api.entity(PATH, "conn-id").is_some());
    }

    #[tokio::test]
    async fn update_keeps_unmanaged_fields() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert(
            PATH,
            json!({
                "id": "r1",
                "type": "Radius",
                "name": "radius",
                "hostnames": ["radius.corp"],
                "port": 1812,
                "created": "2024-01-01T00:00:00Z",
                "userScripts": []
            }),
        );
        let radius = IdentityProviderResource::new(ProviderType::Radius);
        let prior = radius.read(&ctx(&api), &attrs(json!({"id": "r1"}))).await.unwrap().unwrap();
        let mut next = prior.clone();
        next.insert("port".to_string(), json!(1645));

        let state = radius.update(&ctx(&api), &prior, &next).await.unwrap().unwrap();
        assert_eq!(state["port"], 1645);
        let stored = api.entity(PATH, "r1").unwrap();
        assert_eq!(stored["created"], "2024-01-01T00:00:00Z");
        assert_eq!(stored["type"], "Radius");
    }

    #[tokio::test]
    async fn reading_another_type_fails() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert(PATH, json!({"id": "x", "type": "Saml", "name": "s"}));
        let oidc = IdentityProviderResource::new(ProviderType::Oidc);
        let err = oidc.read(&ctx(&api), &attrs(json!({"id": "x"}))).await.unwrap_err();
        assert!(matches!(err, ControlError::Validation { .. }));
    }

    #[test]
    fn reordered_claim_mappings_plan_no_change() {
        let oidc = IdentityProviderResource::new(ProviderType::Oidc);
        let base = json!({
            "name": "o",
            "issuer": "https://issuer",
            "audience": "sdp",
            "claim_mappings": [
                {"attribute_name": "mail", "claim_name": "email"},
                {"attribute_name": "upn", "claim_name": "username"}
            ]
        });
        let prior = planned(&oidc, base);
        let reordered = attrs(json!({
            "name": "o",
            "issuer": "https://issuer",
            "audience": "sdp",
            "claim_mappings": [
                {"attribute_name": "upn", "claim_name": "username"},
                {"attribute_name": "mail", "claim_name": "email"}
            ]
        }));
        let result = plan(oidc.schema(), Some(&prior), &reordered);
        assert!(result.is_noop(), "{:?}", result.changes);
    }

    #[test]
    fn upgrade_dispatches_on_version() {
        let oidc = IdentityProviderResource::new(ProviderType::Oidc);
        let state = attrs(json!({"on_boarding_two_factor": {"device_limit_per_user": 6}}));
        let upgraded = oidc
            .upgrade(0, Some(state), Some(ControllerVersion::V6_0))
            .unwrap()
            .unwrap();
        assert_eq!(upgraded["device_limit_per_user"], 6);
        assert!(oidc.upgrade(2, None, None).is_err());
    }
}
