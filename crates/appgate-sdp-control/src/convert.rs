//! Conversion between resource attributes and Controller bodies.
//!
//! Attributes are `snake_case`; the Controller speaks `camelCase`. Nested
//! blocks are converted recursively. State-only attributes never reach the
//! wire and write-only attributes are never read back from it.

use serde_json::{Map, Value};

use appgate_sdp_core::VersionGate;

use crate::schema::{AttrType, Attribute, Block, Nesting};

/// `snake_case` to `camelCase`.
#[must_use]
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// The wire key of an attribute.
#[must_use]
pub fn wire_key(name: &str, attr: &Attribute) -> String {
    attr.wire_name.clone().unwrap_or_else(|| camel_case(name))
}

/// Whether `attr` may be sent to the connected Controller.
fn sendable(attr: &Attribute, gate: Option<&VersionGate>) -> bool {
    !attr.local
        && attr.is_configurable()
        && match (attr.min_version, gate) {
            (Some(min), Some(gate)) => gate.supports(min),
            _ => true,
        }
}

/// Build a Controller body from attributes.
///
/// Unset values are omitted, as are attributes the gate says the Controller
/// does not know.
#[must_use]
pub fn to_wire(block: &Block, attrs: &Map<String, Value>, gate: Option<&VersionGate>) -> Map<String, Value> {
    let mut body = Map::new();
    for (name, attr) in block.iter() {
        if !sendable(attr, gate) && name != "id" {
            continue;
        }
        match attrs.get(name) {
            None | Some(Value::Null) => {}
            Some(value) => {
                body.insert(wire_key(name, attr), value_to_wire(&attr.ty, value, gate));
            }
        }
    }
    body
}

/// Convert one attribute value to its wire form.
#[must_use]
pub fn value_to_wire(ty: &AttrType, value: &Value, gate: Option<&VersionGate>) -> Value {
    match (ty, value) {
        (AttrType::Block { block, .. }, Value::Object(map)) => Value::Object(to_wire(block, map, gate)),
        (AttrType::Block { block, .. }, Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(to_wire(block, map, gate)),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Read attributes from a Controller body.
///
/// Only attributes present in `block` are populated; anything else the
/// Controller returns is ignored.
#[must_use]
pub fn from_wire(block: &Block, body: &Map<String, Value>) -> Map<String, Value> {
    let mut attrs = Map::new();
    for (name, attr) in block.iter() {
        if attr.local || attr.write_only {
            continue;
        }
        if let Some(value) = body.get(&wire_key(name, attr)) {
            attrs.insert(name.to_string(), value_from_wire(&attr.ty, value));
        }
    }
    attrs
}

/// Convert one wire value to its attribute form.
#[must_use]
pub fn value_from_wire(ty: &AttrType, value: &Value) -> Value {
    match (ty, value) {
        (AttrType::Block { nesting, block }, Value::Object(map)) => {
            let converted = Value::Object(from_wire(block, map));
            if *nesting == Nesting::Single {
                converted
            } else {
                Value::Array(vec![converted])
            }
        }
        (AttrType::Block { block, .. }, Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(from_wire(block, map)),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Copy state-only and write-only attributes from `source` into `state`.
///
/// The Controller never echoes them, so they come from configuration.
pub fn carry_local(block: &Block, source: &Map<String, Value>, state: &mut Map<String, Value>) {
    for (name, attr) in block.iter() {
        if attr.local || attr.write_only {
            if let Some(value) = source.get(name) {
                state.insert(name.to_string(), value.clone());
            }
        }
    }
}

/// Overlay the changed attributes of `planned` onto a fetched Controller body.
///
/// Fields the Controller computed, and fields this resource does not manage,
/// stay as they were fetched. An attribute that became unset is sent as
/// `null` so the Controller clears it.
pub fn patch_wire(
    block: &Block,
    remote: &mut Map<String, Value>,
    prior: &Map<String, Value>,
    planned: &Map<String, Value>,
    gate: Option<&VersionGate>,
) {
    for (name, attr) in block.iter() {
        if !sendable(attr, gate) || name == "id" {
            continue;
        }
        let before = prior.get(name).unwrap_or(&Value::Null);
        let after = planned.get(name).unwrap_or(&Value::Null);
        // The fetched body never carries secrets; resend them while configured.
        let resend = attr.write_only && !after.is_null();
        if !resend && crate::schema::values_equal(&attr.ty, before, after) {
            continue;
        }
        let key = wire_key(name, attr);
        if after.is_null() {
            remote.insert(key, Value::Null);
        } else {
            remote.insert(key, value_to_wire(&attr.ty, after, gate));
        }
    }
}
