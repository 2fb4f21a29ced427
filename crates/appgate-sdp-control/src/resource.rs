//! Resource and data source traits, and the context every operation runs in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use appgate_sdp_core::{ControllerVersion, Diagnostic, Diagnostics, VersionGate};

use crate::api::ControllerApi;
use crate::error::{ControlError, Result};
use crate::plan::PlanResult;
use crate::retry::{Backoff, Deadline};
use crate::schema::Schema;
use crate::timeouts::DEFAULT_TIMEOUT;

/// Attribute values of one resource instance.
pub type Attrs = Map<String, Value>;

/// Everything an operation needs: the Controller, its deadline and a sink for
/// warnings.
pub struct OpContext {
    api: Arc<dyn ControllerApi>,
    deadline: Deadline,
    backoff: Backoff,
    warnings: Mutex<Diagnostics>,
}

impl OpContext {
    /// A context with default backoff.
    #[must_use]
    pub fn new(api: Arc<dyn ControllerApi>, deadline: Deadline) -> Self {
        Self {
            api,
            deadline,
            backoff: Backoff::default(),
            warnings: Mutex::new(Diagnostics::new()),
        }
    }

    /// Replace the backoff parameters.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// The Controller.
    #[must_use]
    pub fn api(&self) -> &dyn ControllerApi {
        self.api.as_ref()
    }

    /// The operation deadline.
    #[must_use]
    pub const fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    /// Backoff parameters for retry and wait loops.
    #[must_use]
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// The version gate of the connected Controller.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be established.
    pub async fn gate(&self) -> Result<VersionGate> {
        Ok(VersionGate::new(self.api.controller_version().await?))
    }

    /// Record a warning for the orchestrator.
    pub fn warn(&self, diagnostic: Diagnostic) {
        self.warnings.lock().push(diagnostic);
    }

    /// Take the collected warnings.
    #[must_use]
    pub fn take_warnings(&self) -> Diagnostics {
        std::mem::take(&mut *self.warnings.lock())
    }
}

/// A managed resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Registered type name, e.g. `appgatesdp_site`.
    fn type_name(&self) -> &str;

    /// Attribute schema.
    fn schema(&self) -> &Schema;

    /// Timeout used when the instance does not override it.
    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Local validation of a configuration.
    fn validate(&self, config: &Attrs) -> Diagnostics {
        self.schema().validate(config)
    }

    /// Adjust a computed plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be computed.
    fn modify_plan(&self, _plan: &mut PlanResult, _prior: Option<&Attrs>) -> Result<()> {
        Ok(())
    }

    /// Create the remote entity and return the new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the Controller refuses or cannot be reached.
    async fn create(&self, ctx: &OpContext, planned: &Attrs) -> Result<Attrs>;

    /// Refresh state; `None` means the entity is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the Controller cannot be reached.
    async fn read(&self, ctx: &OpContext, state: &Attrs) -> Result<Option<Attrs>>;

    /// Update in place; `None` means the entity vanished meanwhile.
    ///
    /// # Errors
    ///
    /// Returns an error if the Controller refuses or cannot be reached.
    async fn update(&self, ctx: &OpContext, prior: &Attrs, planned: &Attrs) -> Result<Option<Attrs>>;

    /// Delete the remote entity. A missing entity is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the Controller refuses or cannot be reached.
    async fn delete(&self, ctx: &OpContext, state: &Attrs) -> Result<()>;

    /// Import an existing entity by id.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotFound` when no entity has that id.
    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Attrs> {
        let mut seed = Attrs::new();
        seed.insert("id".to_string(), Value::String(id.to_string()));
        self.read(ctx, &seed)
            .await?
            .ok_or_else(|| ControlError::not_found(self.type_name(), id))
    }

    /// Upgrade state written under schema version `from_version`.
    ///
    /// # Errors
    ///
    /// Returns an error for state versions newer than the schema.
    fn upgrade(
        &self,
        from_version: u64,
        state: Option<Attrs>,
        _controller: Option<ControllerVersion>,
    ) -> Result<Option<Attrs>> {
        if from_version > self.schema().version {
            return Err(ControlError::validation(format!(
                "state version {from_version} is newer than schema version {}",
                self.schema().version
            )));
        }
        Ok(state)
    }
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Registered type name, e.g. `appgatesdp_site`.
    fn type_name(&self) -> &str;

    /// Attribute schema.
    fn schema(&self) -> &Schema;

    /// Resolve `config` to attribute values.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails or is ambiguous.
    async fn read(&self, ctx: &OpContext, config: &Attrs) -> Result<Attrs>;
}

/// The `id` attribute of `attrs`.
///
/// # Errors
///
/// Returns a validation error if the state has no id.
pub fn require_id(attrs: &Attrs) -> Result<&str> {
    attrs
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ControlError::validation("state has no id"))
}

/// A string attribute.
#[must_use]
pub fn str_attr<'a>(attrs: &'a Attrs, name: &str) -> Option<&'a str> {
    attrs.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}
