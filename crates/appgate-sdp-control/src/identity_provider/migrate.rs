//! Identity provider state migration.
//!
//! Version 0 state kept `device_limit_per_user` inside
//! `on_boarding_two_factor`. From Controller 5.5 on it lives at the provider
//! root, so version 1 moves it there.

use serde_json::Value;

use appgate_sdp_core::ControllerVersion;

use crate::resource::Attrs;

const FIELD: &str = "device_limit_per_user";
const NESTED: &str = "on_boarding_two_factor";

/// Upgrade version 0 state to version 1.
///
/// Applying the migration to already migrated state changes nothing.
#[must_use]
pub fn v0_to_v1(state: Option<Attrs>, controller: Option<ControllerVersion>) -> Option<Attrs> {
    let mut state = state?;
    if controller.is_some_and(|v| v >= ControllerVersion::V5_5) {
        hoist_device_limit(&mut state);
    }
    Some(state)
}

/// Move a nested device limit to the root, unless the root already has one.
///
/// Returns true if the state changed.
pub fn hoist_device_limit(state: &mut Attrs) -> bool {
    let nested = match state.get_mut(NESTED) {
        Some(Value::Object(map)) => map.remove(FIELD),
        // Older state stored the block as a one-element list.
        Some(Value::Array(items)) => items
            .first_mut()
            .and_then(Value::as_object_mut)
            .and_then(|map| map.remove(FIELD)),
        _ => None,
    };
    let Some(value) = nested.filter(|v| !v.is_null()) else {
        return false;
    };

    let root_unset = state.get(FIELD).map_or(true, Value::is_null);
    if root_unset {
        state.insert(FIELD.to_string(), value);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attrs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn moves_nested_counter_to_root() {
        let state = attrs(json!({
            "on_boarding_two_factor": {"device_limit_per_user": 6, "message": "w"}
        }));
        let migrated = v0_to_v1(Some(state), Some(ControllerVersion::V5_5)).unwrap();
        assert_eq!(
            Value::Object(migrated),
            json!({"on_boarding_two_factor": {"message": "w"}, "device_limit_per_user": 6})
        );
    }

    #[test]
    fn missing_state_stays_missing() {
        assert!(v0_to_v1(None, Some(ControllerVersion::V6_2)).is_none());
    }

    #[test]
    fn old_controllers_keep_nested_counter() {
        let state = attrs(json!({"on_boarding_two_factor": {"device_limit_per_user": 6}}));
        let migrated = v0_to_v1(Some(state.clone()), Some(ControllerVersion::V5_4)).unwrap();
        assert_eq!(migrated, state);
    }

    #[test]
    fn migration_is_idempotent() {
        let inputs = [
            json!({"on_boarding_two_factor": {"device_limit_per_user": 6, "message": "w"}}),
            json!({"on_boarding_two_factor": [{"device_limit_per_user": 3}]}),
            json!({"device_limit_per_user": 2, "on_boarding_two_factor": {"device_limit_per_user": 9}}),
            json!({"name": "plain"}),
        ];
        for input in inputs {
            let once = v0_to_v1(Some(attrs(input.clone())), Some(ControllerVersion::V6_0));
            let twice = v0_to_v1(once.clone(), Some(ControllerVersion::V6_0));
            assert_eq!(once, twice, "{input}");
        }
    }

    #[test]
    fn root_value_wins() {
        let state = attrs(json!({
            "device_limit_per_user": 2,
            "on_boarding_two_factor": {"device_limit_per_user": 9}
        }));
        let migrated = v0_to_v1(Some(state), Some(ControllerVersion::V6_0)).unwrap();
        assert_eq!(migrated["device_limit_per_user"], 2);
        assert!(migrated["on_boarding_two_factor"].get("device_limit_per_user").is_none());
    }
}
