//! Provider service implementation.
//!
//! `ProviderService` is what the plugin host talks to. It owns the registry of
//! resource types and the configured Controller, builds an [`OpContext`] with
//! the right deadline for every call, and turns results into [`Outcome`]s that
//! always carry diagnostics.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use appgate_sdp_auth::{ProviderConfig, SessionRegistry};
use appgate_sdp_core::Diagnostics;

use crate::api::{ControllerApi, HttpControllerApi};
use crate::error::{status_for_kind, ControlError, Result};
use crate::plan::{plan, PlanResult};
use crate::registry::{ProviderSchema, Registry};
use crate::resource::{Attrs, OpContext, Resource};
use crate::retry::{Backoff, Deadline, SAFETY_PAD};
use crate::timeouts::{Operation, Timeouts, DEFAULT_TIMEOUT};

/// Tunables shared by every operation.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time kept free before each operation deadline.
    pub safety_pad: Duration,
    /// Backoff for retry and wait loops.
    pub backoff: Backoff,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            safety_pad: SAFETY_PAD,
            backoff: Backoff::default(),
        }
    }
}

/// Result of one host operation: a value on success plus every diagnostic
/// raised along the way.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    /// The result; `None` when an error diagnostic was raised.
    pub value: Option<T>,
    /// Errors and warnings.
    pub diagnostics: Diagnostics,
}

impl<T> Outcome<T> {
    fn success(value: T, diagnostics: Diagnostics) -> Self {
        Self {
            value: Some(value),
            diagnostics,
        }
    }

    fn failure(err: &ControlError, mut diagnostics: Diagnostics) -> Self {
        diagnostics.push(err.to_diagnostic());
        Self {
            value: None,
            diagnostics,
        }
    }

    fn from_result(result: Result<T>, diagnostics: Diagnostics) -> Self {
        match result {
            Ok(value) => Self::success(value, diagnostics),
            Err(e) => Self::failure(&e, diagnostics),
        }
    }

    /// Returns true if no error diagnostic was raised.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    /// HTTP status for the host boundary: derived from the first error, 200
    /// otherwise.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.diagnostics
            .iter()
            .find(|d| d.is_error())
            .map_or(200, |d| status_for_kind(d.kind))
    }
}

/// Entry point for every host operation.
pub struct ProviderService {
    registry: Registry,
    sessions: SessionRegistry,
    api: RwLock<Option<Arc<dyn ControllerApi>>>,
    config: ServiceConfig,
}

impl ProviderService {
    /// Create a service over `registry`. Remote operations fail until
    /// [`configure`](Self::configure) is called.
    #[must_use]
    pub fn new(registry: Registry, config: ServiceConfig) -> Self {
        Self {
            registry,
            sessions: SessionRegistry::new(),
            api: RwLock::new(None),
            config,
        }
    }

    /// Create with every standard type and default tunables.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Registry::standard(), ServiceConfig::default())
    }

    /// Use `api` as the Controller instead of one built from a provider configuration.
    #[must_use]
    pub fn with_api(self, api: Arc<dyn ControllerApi>) -> Self {
        *self.api.write() = Some(api);
        self
    }

    /// The registered types.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns true once a Controller is attached.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api.read().is_some()
    }

    // =========================================================================
    // Provider
    // =========================================================================

    /// Attach the Controller described by `config`.
    ///
    /// Sessions are shared between configurations that name the same
    /// Controller and credentials. Login happens lazily on the first call.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Auth` for unusable configuration.
    pub fn configure(&self, config: ProviderConfig) -> Result<()> {
        let manager = self.sessions.manager(config)?;
        info!(
            url = %manager.config().url,
            provider = %manager.config().provider_name,
            "Provider configured"
        );
        *self.api.write() = Some(Arc::new(HttpControllerApi::new(manager)));
        Ok(())
    }

    /// Every schema the provider exposes.
    #[must_use]
    pub fn schema(&self) -> ProviderSchema<'_> {
        self.registry.schemas()
    }

    fn api(&self) -> Result<Arc<dyn ControllerApi>> {
        self.api.read().clone().ok_or(ControlError::NotConfigured)
    }

    fn context(&self, timeout: Duration, cancel: CancellationToken) -> Result<OpContext> {
        let deadline = Deadline::after(timeout)
            .with_pad(self.config.safety_pad)
            .with_cancellation(cancel);
        Ok(OpContext::new(self.api()?, deadline).with_backoff(self.config.backoff.clone()))
    }

    /// Resource and context for `op`, honouring the instance's `timeouts` block.
    fn prepare(
        &self,
        type_name: &str,
        attrs: &Attrs,
        op: Operation,
        cancel: CancellationToken,
    ) -> Result<(Arc<dyn Resource>, OpContext)> {
        let resource = self.registry.resource(type_name)?;
        let timeouts = Timeouts::from_attrs(attrs, resource.default_timeout())?;
        let ctx = self.context(timeouts.get(op), cancel)?;
        debug!(type_name = %type_name, op = %op, timeout = ?timeouts.get(op), "Starting operation");
        Ok((resource, ctx))
    }

    fn finish<T>(type_name: &str, op: Operation, result: Result<T>, ctx: &OpContext) -> Outcome<T> {
        if let Err(e) = &result {
            warn!(type_name = %type_name, op = %op, error = %e, "Operation failed");
        }
        Outcome::from_result(result, ctx.take_warnings())
    }

    // =========================================================================
    // Resources: local operations
    // =========================================================================

    /// Local field-level validation of `config`.
    #[must_use]
    pub fn validate(&self, type_name: &str, config: &Attrs) -> Outcome<()> {
        let resource = match self.registry.resource(type_name) {
            Ok(resource) => resource,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let mut diagnostics = resource.validate(config);
        if let Err(e) = Timeouts::from_attrs(config, resource.default_timeout()) {
            diagnostics.push(e.to_diagnostic());
        }
        if diagnostics.has_errors() {
            Outcome {
                value: None,
                diagnostics,
            }
        } else {
            Outcome::success((), diagnostics)
        }
    }

    /// Plan `proposed` against `prior`. Never talks to the Controller.
    #[must_use]
    pub fn plan(&self, type_name: &str, prior: Option<&Attrs>, proposed: &Attrs) -> Outcome<PlanResult> {
        let result = self.registry.resource(type_name).and_then(|resource| {
            let mut planned = plan(resource.schema(), prior, proposed);
            resource.modify_plan(&mut planned, prior)?;
            Ok(planned)
        });
        Outcome::from_result(result, Diagnostics::new())
    }

    /// Upgrade state written under schema version `from_version`.
    ///
    /// The Controller version is consulted when a Controller is attached and
    /// reachable; otherwise version-dependent migrations are skipped.
    pub async fn upgrade(&self, type_name: &str, from_version: u64, state: Option<Attrs>) -> Outcome<Option<Attrs>> {
        let resource = match self.registry.resource(type_name) {
            Ok(resource) => resource,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let controller = match self.api() {
            Ok(api) => match api.controller_version().await {
                Ok(version) => Some(version),
                Err(e) => {
                    debug!(error = %e, "Controller version unavailable for state upgrade");
                    None
                }
            },
            Err(_) => None,
        };
        Outcome::from_result(resource.upgrade(from_version, state, controller), Diagnostics::new())
    }

    // =========================================================================
    // Resources: remote operations
    // =========================================================================

    /// Create the remote entity for `planned`.
    pub async fn create(&self, type_name: &str, planned: &Attrs, cancel: CancellationToken) -> Outcome<Attrs> {
        let (resource, ctx) = match self.prepare(type_name, planned, Operation::Create, cancel) {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let result = resource.create(&ctx, planned).await;
        Self::finish(type_name, Operation::Create, result, &ctx)
    }

    /// Refresh `state`; a `None` value means the entity is gone.
    pub async fn read(&self, type_name: &str, state: &Attrs, cancel: CancellationToken) -> Outcome<Option<Attrs>> {
        let (resource, ctx) = match self.prepare(type_name, state, Operation::Read, cancel) {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let result = resource.read(&ctx, state).await;
        if matches!(result, Ok(None)) {
            info!(type_name = %type_name, "Remote entity gone, dropping from state");
        }
        Self::finish(type_name, Operation::Read, result, &ctx)
    }

    /// Update in place from `prior` to `planned`.
    pub async fn update(
        &self,
        type_name: &str,
        prior: &Attrs,
        planned: &Attrs,
        cancel: CancellationToken,
    ) -> Outcome<Option<Attrs>> {
        let (resource, ctx) = match self.prepare(type_name, planned, Operation::Update, cancel) {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let result = resource.update(&ctx, prior, planned).await;
        Self::finish(type_name, Operation::Update, result, &ctx)
    }

    /// Delete the remote entity of `state`.
    pub async fn delete(&self, type_name: &str, state: &Attrs, cancel: CancellationToken) -> Outcome<()> {
        let (resource, ctx) = match self.prepare(type_name, state, Operation::Delete, cancel) {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let result = resource.delete(&ctx, state).await;
        Self::finish(type_name, Operation::Delete, result, &ctx)
    }

    /// Import the entity with `id`.
    pub async fn import(&self, type_name: &str, id: &str, cancel: CancellationToken) -> Outcome<Attrs> {
        let (resource, ctx) = match self.prepare(type_name, &Attrs::new(), Operation::Read, cancel) {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let result = resource.import(&ctx, id).await;
        if result.is_ok() {
            info!(type_name = %type_name, id = %id, "Imported");
        }
        Self::finish(type_name, Operation::Read, result, &ctx)
    }

    // =========================================================================
    // Data sources
    // =========================================================================

    /// Resolve a data source configuration.
    pub async fn read_data_source(&self, type_name: &str, config: &Attrs, cancel: CancellationToken) -> Outcome<Attrs> {
        let prepared = self
            .registry
            .data_source(type_name)
            .and_then(|source| Ok((source, self.context(DEFAULT_TIMEOUT, cancel)?)));
        let (source, ctx) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::failure(&e, Diagnostics::new()),
        };
        let result = source.read(&ctx, config).await;
        Self::finish(type_name, Operation::Read, result, &ctx)
    }
}

impl std::fmt::Debug for ProviderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderService")
            .field("registry", &self.registry)
            .field("configured", &self.is_configured())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryController;
    use appgate_sdp_core::{ControllerVersion, DiagnosticKind};
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attrs {
        value.as_object().cloned().unwrap()
    }

    fn service(api: &Arc<MemoryController>) -> ProviderService {
        let config = ServiceConfig {
            safety_pad: Duration::ZERO,
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
        };
        ProviderService::new(Registry::standard(), config).with_api(api.clone())
    }

    #[tokio::test]
    async fn stale_read_drops_state_without_error() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let outcome = service(&api)
            .read(
                "appgatesdp_entitlement",
                &attrs(json!({"id": "stale", "name": "e"})),
                CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.status(), 200);
        assert_eq!(outcome.value, Some(None));
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn create_then_import() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let service = service(&api);
        let created = service
            .create(
                "appgatesdp_site",
                &attrs(json!({"name": "hq", "short_name": "h"})),
                CancellationToken::new(),
            )
            .await;
        let state = created.value.unwrap();
        let id = state["id"].as_str().unwrap();

        let imported = service
            .import("appgatesdp_site", id, CancellationToken::new())
            .await;
        assert_eq!(imported.value.unwrap()["short_name"], "h");
    }

    #[tokio::test]
    async fn remote_calls_need_configuration() {
        let service = ProviderService::with_defaults();
        let outcome = service
            .read(
                "appgatesdp_site",
                &attrs(json!({"id": "s1"})),
                CancellationToken::new(),
            )
            .await;
        assert!(outcome.value.is_none());
        assert_eq!(outcome.status(), 422);
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        let service = ProviderService::with_defaults();
        let outcome = service.validate("appgatesdp_nope", &Attrs::new());
        assert_eq!(outcome.diagnostics.iter().next().unwrap().kind, DiagnosticKind::Validation);
        assert_eq!(outcome.status(), 422);
    }

    #[test]
    fn validate_reports_bad_timeouts() {
        let service = ProviderService::with_defaults();
        let outcome = service.validate(
            "appgatesdp_site",
            &attrs(json!({"name": "hq", "timeouts": {"create": "soon"}})),
        );
        assert!(!outcome.is_ok());
        let diagnostic = outcome.diagnostics.iter().find(|d| d.is_error()).unwrap();
        assert_eq!(diagnostic.path.as_ref().unwrap().to_string(), "timeouts.create");
    }

    #[test]
    fn plan_of_unchanged_config_is_noop() {
        let service = ProviderService::with_defaults();
        let prior = attrs(json!({
            "id": "s1", "site_id": "s1", "name": "hq",
            "notes": "Managed by terraform", "tags": ["b", "a"],
            "entitlement_based_routing": false
        }));
        let proposed = attrs(json!({"name": "hq", "tags": ["a", "b"]}));
        let outcome = service.plan("appgatesdp_site", Some(&prior), &proposed);
        assert!(outcome.value.unwrap().is_noop());
    }

    #[tokio::test]
    async fn upgrade_hoists_device_limit_on_new_controllers() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        let state = attrs(json!({
            "on_boarding_two_factor": {"device_limit_per_user": 6, "message": "w"}
        }));
        let outcome = service(&api)
            .upgrade("appgatesdp_local_database_identity_provider", 0, Some(state))
            .await;
        let upgraded = outcome.value.unwrap().unwrap();
        assert_eq!(upgraded["device_limit_per_user"], 6);
        assert_eq!(upgraded["on_boarding_two_factor"], json!({"message": "w"}));

        let none = service(&api)
            .upgrade("appgatesdp_local_database_identity_provider", 0, None)
            .await;
        assert_eq!(none.value, Some(None));
    }

    #[tokio::test]
    async fn cancelled_operation_reports_error() {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.fail("GET", "/stats/appliances", 503, 100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = service(&api)
            .create(
                "appgatesdp_client_profile",
                &attrs(json!({"name": "p", "spa_key_name": "k", "identity_provider_name": "local"})),
                cancel,
            )
            .await;
        assert!(!outcome.is_ok());
        assert!(outcome.value.is_none());
    }

    #[test]
    fn configure_rejects_missing_url() {
        let service = ProviderService::with_defaults();
        assert!(service.configure(ProviderConfig::new("")).is_err());
        assert!(!service.is_configured());
    }
}
