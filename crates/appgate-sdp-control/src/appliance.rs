//! Appliance controller activation.
//!
//! Enabling controller functions on an appliance is eventually consistent: the
//! Controller accepts the PUT immediately, and the appliance converges in the
//! background. The resource polls appliance status until it reports the
//! expected state, and downgrades a timeout to a warning.
//!
//! # State Machine
//!
//! ```text
//!   ┌─────────┐     ┌──────────┐     ┌─────────┐     ┌────────┐
//!   │ Unknown │────▶│ Inactive │────▶│ Seeded  │────▶│ Active │
//!   └─────────┘     └──────────┘     └─────────┘     └───┬────┘
//!                                                        │
//!                        ┌───────────────────────────────┤
//!                        ▼                               ▼
//!               ┌────────────────┐  enabled   ┌─────────────────┐
//!               │ ApplianceReady │───────────▶│ ControllerReady │
//!               │                │◀───────────│                 │
//!               └────────────────┘  disabled  └─────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use appgate_sdp_core::{AttributePath, Diagnostic, EntityKind};

use crate::api::list_entries;
use crate::convert::{carry_local, from_wire, value_to_wire};
use crate::crud::TYPE_PREFIX;
use crate::error::{ControlError, Result};
use crate::groups;
use crate::resource::{require_id, str_attr, Attrs, OpContext, Resource};
use crate::retry::{wait_for, Poll, WaitOutcome};
use crate::schema::{Attribute, Block, Nesting, Schema};
use crate::timeouts::{timeouts_block, ACTIVATION_TIMEOUT};

/// Endpoint reporting the live state of every appliance.
pub const STATUS_PATH: &str = "/stats/appliances";

/// Pause between the PUT and the first status poll.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

/// Observed appliance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplianceState {
    /// No status reported yet.
    Unknown,
    /// Registered but never seeded.
    Inactive,
    /// Seed file consumed, not yet activated.
    Seeded,
    /// Activated, services converging.
    Active,
    /// Running without controller functions.
    ApplianceReady,
    /// Running with controller functions.
    ControllerReady,
}

impl ApplianceState {
    /// Parse the `state` reported by the status endpoint.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "appliance_ready" => Self::ApplianceReady,
            "controller_ready" => Self::ControllerReady,
            "inactive" | "not_activated" => Self::Inactive,
            "seeded" => Self::Seeded,
            "active" | "activating" | "busy" => Self::Active,
            _ => Self::Unknown,
        }
    }

    /// The state an activated appliance settles in.
    #[must_use]
    pub const fn target(controller_enabled: bool) -> Self {
        if controller_enabled {
            Self::ControllerReady
        } else {
            Self::ApplianceReady
        }
    }

    /// Status name as the Controller spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Inactive => "inactive",
            Self::Seeded => "seeded",
            Self::Active => "active",
            Self::ApplianceReady => "appliance_ready",
            Self::ControllerReady => "controller_ready",
        }
    }
}

impl std::fmt::Display for ApplianceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: ApplianceState, to: ApplianceState) -> bool {
    use ApplianceState::{Active, ApplianceReady, ControllerReady, Inactive, Seeded, Unknown};

    matches!(
        (from, to),
        // First observation may land anywhere
        (Unknown, Inactive | Seeded | Active | ApplianceReady | ControllerReady)
            | (Inactive, Seeded)
            | (Seeded, Active)
            | (Active, ApplianceReady | ControllerReady)
            // Reconfiguration passes through Active or switches directly
            | (ApplianceReady | ControllerReady, Active)
            | (ApplianceReady, ControllerReady)
            | (ControllerReady, ApplianceReady)
    )
}

/// `appgatesdp_appliance_controller_activation`.
pub struct ControllerActivation {
    type_name: String,
    schema: Schema,
    settle: Duration,
}

impl Default for ControllerActivation {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerActivation {
    /// The resource with the default settle interval.
    #[must_use]
    pub fn new() -> Self {
        let block = Block::new()
            .attr("id", Attribute::string().computed())
            .attr("appliance_id", Attribute::string().required().force_new().local())
            .attr(
                "controller",
                Attribute::block(
                    Nesting::Single,
                    Block::new().attr("enabled", Attribute::bool().required()),
                )
                .required(),
            )
            .attr("admin_interface", groups::admin_interface());

        Self {
            type_name: format!("{TYPE_PREFIX}appliance_controller_activation"),
            schema: Schema::new(0).with(block).with(timeouts_block()),
            settle: DEFAULT_SETTLE,
        }
    }

    /// Replace the pause before polling starts.
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn appliance_id(attrs: &Attrs) -> Result<&str> {
        str_attr(attrs, "appliance_id").ok_or_else(|| {
            ControlError::invalid(AttributePath::root("appliance_id"), "appliance_id is required")
        })
    }

    fn controller_enabled(attrs: &Attrs) -> bool {
        attrs
            .get("controller")
            .and_then(|c| c.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    async fn fetch(ctx: &OpContext, id: &str) -> Result<Option<Map<String, Value>>> {
        match ctx.api().get(&EntityKind::Appliance.entity_path(id)).await {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(ControlError::Internal(format!("appliance {id} is not an object"))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.for_entity("appliance", id)),
        }
    }

    fn state_from_remote(&self, id: &str, remote: &Map<String, Value>, source: &Attrs) -> Attrs {
        let mut state = from_wire(&self.schema.block, remote);
        carry_local(&self.schema.block, source, &mut state);
        state.insert("id".to_string(), Value::String(id.to_string()));
        state.insert("appliance_id".to_string(), Value::String(id.to_string()));
        let enabled = Self::controller_enabled(remote);
        state.insert("controller".to_string(), json!({ "enabled": enabled }));
        state
    }

    /// Write the controller and admin interface settings onto the fetched
    /// appliance and PUT it back.
    async fn configure(
        &self,
        ctx: &OpContext,
        id: &str,
        mut remote: Map<String, Value>,
        planned: &Attrs,
    ) -> Result<()> {
        let enabled = Self::controller_enabled(planned);
        match remote.get_mut("controller") {
            Some(Value::Object(controller)) => {
                controller.insert("enabled".to_string(), Value::Bool(enabled));
            }
            _ => {
                remote.insert("controller".to_string(), json!({ "enabled": enabled }));
            }
        }

        let admin = match (planned.get("admin_interface"), self.schema.get("admin_interface")) {
            (Some(value), Some(attr)) if !value.is_null() => value_to_wire(&attr.ty, value, None),
            _ => Value::Null,
        };
        remote.insert("adminInterface".to_string(), admin);

        ctx.api()
            .put(&EntityKind::Appliance.entity_path(id), &Value::Object(remote))
            .await
            .map_err(|e| e.for_entity("appliance", id))?;
        info!(appliance_id = %id, controller_enabled = enabled, "Appliance reconfigured");
        Ok(())
    }

    /// Wait for the appliance to report `target`.
    ///
    /// Running out of time or being cancelled adds a warning to `ctx`.
    async fn await_state(&self, ctx: &OpContext, id: &str, target: ApplianceState) -> Result<()> {
        if !self.settle.is_zero() && ctx.deadline().sleep(self.settle).await.is_err() {
            self.incomplete(ctx, id, target, "cancelled before polling started");
            return Ok(());
        }

        let observed = parking_lot::Mutex::new(ApplianceState::Unknown);
        let observed = &observed;
        let outcome = wait_for(ctx.deadline(), ctx.backoff(), "appliance_activation", move || async move {
            let current = observe(ctx, id).await?;
            let mut last = observed.lock();
            if current != *last && !is_valid_transition(*last, current) {
                debug!(appliance_id = %id, from = %*last, to = %current, "Unexpected appliance transition");
            }
            *last = current;
            Ok(if current == target {
                Poll::Ready(())
            } else {
                Poll::Pending(current.to_string())
            })
        })
        .await?;

        match outcome {
            WaitOutcome::Ready(()) => {
                info!(appliance_id = %id, state = %target, "Appliance ready");
            }
            WaitOutcome::TimedOut(last) => {
                self.incomplete(ctx, id, target, &format!("last observed state: {last}"));
            }
            WaitOutcome::Cancelled(last) => {
                self.incomplete(ctx, id, target, &format!("cancelled, last observed state: {last}"));
            }
        }
        Ok(())
    }

    fn incomplete(&self, ctx: &OpContext, id: &str, target: ApplianceState, detail: &str) {
        warn!(appliance_id = %id, state = %target, detail = %detail, "Appliance did not converge in time");
        ctx.warn(
            Diagnostic::warning(format!("appliance {id} did not reach {target} before the deadline"))
                .with_detail(format!(
                    "{detail}. The configuration was applied and the appliance may still converge; \
                     {} will pick up its state on the next refresh.",
                    self.type_name
                )),
        );
    }

    async fn apply(&self, ctx: &OpContext, planned: &Attrs) -> Result<Option<Attrs>> {
        let id = Self::appliance_id(planned)?;
        let Some(remote) = Self::fetch(ctx, id).await? else {
            return Ok(None);
        };
        if !remote.get("activated").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ControlError::validation(format!(
                "appliance {id} is not activated; seed and boot it before enabling controller functions"
            )));
        }

        self.configure(ctx, id, remote, planned).await?;
        self.await_state(ctx, id, ApplianceState::target(Self::controller_enabled(planned)))
            .await?;

        let mut state = planned.clone();
        state.insert("id".to_string(), Value::String(id.to_string()));
        Ok(Some(state))
    }
}

/// Current state of appliance `id` as the status endpoint reports it.
async fn observe(ctx: &OpContext, id: &str) -> Result<ApplianceState> {
    let body = ctx.api().get(STATUS_PATH).await?;
    Ok(list_entries(body)
        .iter()
        .find(|entry| entry.get("id").and_then(Value::as_str) == Some(id))
        .and_then(|entry| entry.get("state").and_then(Value::as_str))
        .map_or(ApplianceState::Unknown, ApplianceState::from_status))
}

#[async_trait]
impl Resource for ControllerActivation {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn default_timeout(&self) -> Duration {
        ACTIVATION_TIMEOUT
    }

    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs> {
        let id = Self::appliance_id(planned)?;
        self.apply(ctx, planned)
            .await?
            .ok_or_else(|| ControlError::not_found("appliance", id))
    }

    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>> {
        let id = require_id(state)?;
        Ok(Self::fetch(ctx, id)
            .await?
            .map(|remote| self.state_from_remote(id, &remote, state)))
    }

    async fn update(&self, ctx: &OpContext, _prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>> {
        let state = self.apply(ctx, planned).await?;
        if state.is_none() {
            let id = Self::appliance_id(planned)?;
            ctx.warn(Diagnostic::warning(format!(
                "appliance {id} no longer exists and was removed from state"
            )));
        }
        Ok(state)
    }

    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()> {
        let id = require_id(state)?;
        let Some(mut remote) = Self::fetch(ctx, id).await? else {
            debug!(appliance_id = %id, "Appliance already gone");
            return Ok(());
        };
        remote.insert("controller".to_string(), json!({ "enabled": false }));
        ctx.api()
            .put(&EntityKind::Appliance.entity_path(id), &Value::Object(remote))
            .await
            .map_err(|e| e.for_entity("appliance", id))?;
        info!(appliance_id = %id, "Controller functions disabled");
        self.await_state(ctx, id, ApplianceState::ApplianceReady).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Backoff, Deadline};
    use crate::testing::MemoryController;
    use appgate_sdp_core::ControllerVersion;
    use std::sync::Arc;

    fn resource() -> ControllerActivation {
        ControllerActivation::new().with_settle(Duration::ZERO)
    }

    fn ctx(api: &Arc<MemoryController>, timeout_ms: u64) -> OpContext {
        OpContext::new(
            api.clone(),
            Deadline::after(Duration::from_millis(timeout_ms)).with_pad(Duration::ZERO),
        )
        .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(5)))
    }

    fn controller(activated: bool, state: &str) -> Arc<MemoryController> {
        let api = Arc::new(MemoryController::new(ControllerVersion::V6_2));
        api.insert(
            "/appliances",
            json!({"id": "a1", "name": "gw-1", "activated": activated, "hostname": "gw-1.corp"}),
        );
        api.set_singleton(STATUS_PATH, json!({"data": [{"id": "a1", "state": state}]}));
        api
    }

    fn planned(enabled: bool) -> Attrs {
        json!({
            "appliance_id": "a1",
            "controller": {"enabled": enabled},
            "admin_interface": {"hostname": "gw-1.corp", "https_port": 8443}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn transitions() {
        use ApplianceState::*;

        assert!(is_valid_transition(Unknown, Active));
        assert!(is_valid_transition(Seeded, Active));
        assert!(is_valid_transition(Active, ControllerReady));
        assert!(is_valid_transition(ApplianceReady, ControllerReady));
        assert!(!is_valid_transition(Inactive, ControllerReady));
        assert!(!is_valid_transition(ControllerReady, Seeded));
    }

    #[tokio::test]
    async fn reaches_controller_ready() {
        let api = controller(true, "controller_ready");
        let ctx = ctx(&api, 2_000);

        let state = resource().create(&ctx, &planned(true)).await.unwrap();
        assert_eq!(state["id"], "a1");
        assert!(ctx.take_warnings().is_empty());

        let stored = api.entity("/appliances", "a1").unwrap();
        assert_eq!(stored["controller"]["enabled"], true);
        assert_eq!(stored["adminInterface"]["httpsPort"], 8443);
        assert_eq!(stored["hostname"], "gw-1.corp");
    }

    #[tokio::test]
    async fn timeout_is_a_warning() {
        let api = controller(true, "appliance_ready");
        let ctx = ctx(&api, 100);

        let state = resource().create(&ctx, &planned(true)).await.unwrap();
        assert_eq!(state["controller"]["enabled"], true);

        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 1);
        let warning = warnings.iter().next().unwrap();
        assert!(!warning.is_error());
        assert!(warning.summary.contains("a1"));
    }

    #[tokio::test]
    async fn inactive_appliance_is_rejected() {
        let api = controller(false, "inactive");
        let err = resource().create(&ctx(&api, 1_000), &planned(true)).await.unwrap_err();
        assert!(err.to_string().contains("not activated"));
        assert!(api.requests_of("PUT").is_empty());
    }

    #[tokio::test]
    async fn removed_admin_interface_is_cleared() {
        let api = controller(true, "appliance_ready");
        let mut config = planned(false);
        config.remove("admin_interface");

        resource().create(&ctx(&api, 1_000), &config).await.unwrap();
        let stored = api.entity("/appliances", "a1").unwrap();
        assert_eq!(stored["adminInterface"], Value::Null);
    }

    #[tokio::test]
    async fn delete_disables_controller() {
        let api = controller(true, "appliance_ready");
        let mut state = planned(true);
        state.insert("id".to_string(), json!("a1"));

        resource().delete(&ctx(&api, 1_000), &state).await.unwrap();
        let stored = api.entity("/appliances", "a1").unwrap();
        assert_eq!(stored["controller"]["enabled"], false);
    }

    #[tokio::test]
    async fn read_reflects_remote() {
        let api = controller(true, "controller_ready");
        let state = resource().import(&ctx(&api, 1_000), "a1").await.unwrap();
        assert_eq!(state["appliance_id"], "a1");
        assert_eq!(state["controller"]["enabled"], false);
    }
}
