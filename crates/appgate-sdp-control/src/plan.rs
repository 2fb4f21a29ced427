//! Planning: proposed configuration plus prior state to planned state.
//!
//! Planning never talks to the Controller. It fills defaults, keeps values the
//! Controller computed, and reports which attributes change and which of those
//! force a replacement.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::schema::{values_equal, Presence, Schema};

/// One changed attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    /// Attribute name.
    pub path: String,
    /// Value in prior state.
    pub before: Value,
    /// Planned value.
    pub after: Value,
}

/// The outcome of planning one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanResult {
    /// State expected after apply.
    pub planned_state: Map<String, Value>,
    /// Attributes whose value changes.
    pub changes: Vec<AttributeChange>,
    /// Changed attributes that force a replacement.
    pub requires_replace: Vec<String>,
}

impl PlanResult {
    /// Returns true when apply has nothing to do.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drop the change recorded for `path`, keeping `value` as planned.
    pub fn suppress(&mut self, path: &str, value: Value) {
        self.changes.retain(|c| c.path != path);
        self.requires_replace.retain(|p| p != path);
        self.planned_state.insert(path.to_string(), value);
    }
}

/// Plan `proposed` against `prior` under `schema`.
///
/// With no prior state every set attribute counts as a change.
#[must_use]
pub fn plan(schema: &Schema, prior: Option<&Map<String, Value>>, proposed: &Map<String, Value>) -> PlanResult {
    let mut planned = proposed.clone();
    schema.block.apply_defaults(&mut planned);

    if let Some(prior) = prior {
        for (name, attr) in schema.block.iter() {
            let keep_prior = match attr.presence {
                Presence::Computed => true,
                Presence::OptionalComputed => planned.get(name).map_or(true, Value::is_null),
                Presence::Required | Presence::Optional => false,
            };
            if keep_prior {
                if let Some(value) = prior.get(name) {
                    planned.insert(name.to_string(), value.clone());
                }
            }
        }
    }

    let mut changes = Vec::new();
    let mut requires_replace = Vec::new();
    for (name, attr) in schema.block.iter() {
        let after = planned.get(name).cloned().unwrap_or(Value::Null);
        let before = prior
            .and_then(|p| p.get(name))
            .cloned()
            .unwrap_or(Value::Null);
        if values_equal(&attr.ty, &before, &after) {
            continue;
        }
        if prior.is_some() && attr.force_new {
            requires_replace.push(name.to_string());
        }
        changes.push(AttributeChange {
            path: name.to_string(),
            before,
            after,
        });
    }

    PlanResult {
        planned_state: planned,
        changes,
        requires_replace,
    }
}
