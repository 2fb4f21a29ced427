//! Resource schemas and local validation.
//!
//! A [`Schema`] describes the attribute tree of one resource or data source:
//! types, presence, defaults, enumerations, conflicts and the Controller
//! version each attribute needs. The same description drives validation,
//! planning, wire conversion and the schema document served to the host.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use appgate_sdp_core::{AttributePath, ControllerVersion, Diagnostic, Diagnostics, VersionGate};

use crate::error::{ControlError, Result};

/// Attribute value types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Ordered list.
    List(Box<AttrType>),
    /// Unordered set.
    Set(Box<AttrType>),
    /// String-keyed map.
    Map(Box<AttrType>),
    /// Nested block.
    Block {
        /// How many instances the block holds.
        nesting: Nesting,
        /// Attributes of each instance.
        block: Box<Block>,
    },
}

impl AttrType {
    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "number",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Block { nesting, .. } => match nesting {
                Nesting::Single => "object",
                Nesting::List => "list of objects",
                Nesting::Set => "set of objects",
            },
        }
    }
}

/// Nesting mode of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nesting {
    /// At most one instance, stored as an object.
    Single,
    /// Ordered instances.
    List,
    /// Unordered instances.
    Set,
}

/// Who sets an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Set by the user, always.
    Required,
    /// Set by the user, may be absent.
    Optional,
    /// Set by the Controller only.
    Computed,
    /// Set by the user or, when absent, by the Controller.
    OptionalComputed,
}

/// One attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub ty: AttrType,
    /// Presence.
    pub presence: Presence,
    /// Never shown in plans or logs.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
    /// Kept from configuration, never read back from the Controller.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub write_only: bool,
    /// Exists only in state, never sent to the Controller.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
    /// Value used when the user leaves the attribute unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Closed enumeration of accepted string values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    /// Dotted paths that must not be set together with this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    /// Dotted paths of which exactly one must be set.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exactly_one_of: Vec<String>,
    /// Oldest Controller accepting the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<ControllerVersion>,
    /// Changing the value replaces the resource.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_new: bool,
    /// Deprecation message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    /// Key on the wire when it is not the camel-case form of the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wire_name: Option<String>,
    /// Human description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Attribute {
    /// An optional attribute of the given type.
    #[must_use]
    pub const fn new(ty: AttrType) -> Self {
        Self {
            ty,
            presence: Presence::Optional,
            sensitive: false,
            write_only: false,
            local: false,
            default: None,
            allowed: Vec::new(),
            conflicts_with: Vec::new(),
            exactly_one_of: Vec::new(),
            min_version: None,
            force_new: false,
            deprecated: None,
            wire_name: None,
            description: String::new(),
        }
    }

    /// A string attribute.
    #[must_use]
    pub const fn string() -> Self {
        Self::new(AttrType::String)
    }

    /// A boolean attribute.
    #[must_use]
    pub const fn bool() -> Self {
        Self::new(AttrType::Bool)
    }

    /// An integer attribute.
    #[must_use]
    pub const fn int() -> Self {
        Self::new(AttrType::Int)
    }

    /// A list of `elem`.
    #[must_use]
    pub fn list(elem: AttrType) -> Self {
        Self::new(AttrType::List(Box::new(elem)))
    }

    /// A set of `elem`.
    #[must_use]
    pub fn set(elem: AttrType) -> Self {
        Self::new(AttrType::Set(Box::new(elem)))
    }

    /// A map of `elem`.
    #[must_use]
    pub fn map(elem: AttrType) -> Self {
        Self::new(AttrType::Map(Box::new(elem)))
    }

    /// A nested block.
    #[must_use]
    pub fn block(nesting: Nesting, block: Block) -> Self {
        Self::new(AttrType::Block {
            nesting,
            block: Box::new(block),
        })
    }

    /// Mark required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    /// Mark computed.
    #[must_use]
    pub fn computed(mut self) -> Self {
        self.presence = Presence::Computed;
        self
    }

    /// Mark optional and computed.
    #[must_use]
    pub fn optional_computed(mut self) -> Self {
        self.presence = Presence::OptionalComputed;
        self
    }

    /// Mark sensitive.
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Mark write-only (and sensitive).
    #[must_use]
    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self.sensitive = true;
        self
    }

    /// Mark state-only.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restrict string values to `values`.
    #[must_use]
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| (*v).to_string()).collect();
        self
    }

    /// Declare conflicting attributes.
    #[must_use]
    pub fn conflicts_with(mut self, paths: &[&str]) -> Self {
        self.conflicts_with = paths.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Declare an exactly-one-of group (including this attribute).
    #[must_use]
    pub fn exactly_one_of(mut self, paths: &[&str]) -> Self {
        self.exactly_one_of = paths.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Require a minimum Controller version.
    #[must_use]
    pub fn min_version(mut self, version: ControllerVersion) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Changing the value replaces the resource.
    #[must_use]
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Mark deprecated.
    #[must_use]
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }

    /// Override the wire key.
    #[must_use]
    pub fn wire(mut self, name: impl Into<String>) -> Self {
        self.wire_name = Some(name.into());
        self
    }

    /// Add a description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the user may set the attribute.
    #[must_use]
    pub const fn is_configurable(&self) -> bool {
        !matches!(self.presence, Presence::Computed)
    }

    /// Whether the Controller may supply the value.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self.presence, Presence::Computed | Presence::OptionalComputed)
    }

    /// The nested block, if this attribute is one.
    #[must_use]
    pub fn nested(&self) -> Option<(Nesting, &Block)> {
        match &self.ty {
            AttrType::Block { nesting, block } => Some((*nesting, block)),
            _ => None,
        }
    }
}

/// An ordered set of attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Block {
    attributes: BTreeMap<String, Attribute>,
}

impl Block {
    /// An empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// Add every attribute of `other`, replacing same-named ones.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.attributes.extend(other.attributes);
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Iterate over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Validate `config` against this block.
    #[must_use]
    pub fn validate(&self, config: &Map<String, Value>) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.validate_at(config, config, &AttributePath::default(), &mut diags);
        diags
    }

    fn validate_at(
        &self,
        root: &Map<String, Value>,
        config: &Map<String, Value>,
        path: &AttributePath,
        diags: &mut Diagnostics,
    ) {
        for key in config.keys() {
            if !self.attributes.contains_key(key) {
                diags.push(Diagnostic::invalid(
                    child(path, key),
                    format!("unsupported attribute {key:?}"),
                ));
            }
        }

        for (name, attr) in &self.attributes {
            let here = child(path, name);
            let value = config.get(name).filter(|v| !v.is_null());

            if attr.presence == Presence::Required && value.is_none() && attr.default.is_none() {
                diags.push(Diagnostic::invalid(here.clone(), format!("{here} is required")));
            }

            let Some(value) = value else {
                continue;
            };

            if let Some(message) = &attr.deprecated {
                diags.push(
                    Diagnostic::warning(format!("{here} is deprecated"))
                        .with_detail(message.clone())
                        .with_path(here.clone()),
                );
            }

            check_type(root, &attr.ty, value, &here, diags);

            if !attr.allowed.is_empty() {
                check_allowed(&attr.allowed, value, &here, diags);
            }

            for other in &attr.conflicts_with {
                if lookup(root, other).is_some() {
                    diags.push(Diagnostic::invalid(
                        here.clone(),
                        format!("{here} conflicts with {other}"),
                    ));
                }
            }
        }

        for (name, attr) in &self.attributes {
            if attr.exactly_one_of.is_empty() || attr.exactly_one_of.first() != Some(name) {
                continue;
            }
            let set: Vec<&String> = attr
                .exactly_one_of
                .iter()
                .filter(|p| lookup_relative(config, p).is_some())
                .collect();
            if set.len() != 1 {
                diags.push(Diagnostic::invalid(
                    child(path, name),
                    format!(
                        "exactly one of {} must be set",
                        attr.exactly_one_of.join(", ")
                    ),
                ));
            }
        }
    }

    /// Fill defaults for unset attributes, recursing into nested blocks.
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        for (name, attr) in &self.attributes {
            let unset = config.get(name).map_or(true, Value::is_null);
            if unset {
                if let Some(default) = &attr.default {
                    config.insert(name.clone(), default.clone());
                }
                continue;
            }

            if let (Some((_, block)), Some(value)) = (attr.nested(), config.get_mut(name)) {
                match value {
                    Value::Object(map) => block.apply_defaults(map),
                    Value::Array(items) => {
                        for item in items {
                            if let Value::Object(map) = item {
                                block.apply_defaults(map);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Fail for user-set attributes the connected Controller does not know.
    ///
    /// A value equal to the attribute's default counts as unset.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::VersionUnsupported` for the first offending attribute.
    pub fn check_versions(&self, config: &Map<String, Value>, gate: &VersionGate) -> Result<()> {
        self.check_versions_at(config, gate, &AttributePath::default())
    }

    fn check_versions_at(
        &self,
        config: &Map<String, Value>,
        gate: &VersionGate,
        path: &AttributePath,
    ) -> Result<()> {
        for (name, attr) in &self.attributes {
            let Some(value) = config.get(name).filter(|v| !is_empty(v)) else {
                continue;
            };
            let here = child(path, name);
            if let Some(min) = attr.min_version {
                if attr.default.as_ref() != Some(value) {
                    gate.require(&here.to_string(), min)
                        .map_err(ControlError::from)?;
                }
            }
            if let Some((_, block)) = attr.nested() {
                for (i, map) in objects(value).into_iter().enumerate() {
                    let nested = if value.is_array() { here.clone().index(i) } else { here.clone() };
                    block.check_versions_at(map, gate, &nested)?;
                }
            }
        }
        Ok(())
    }
}

/// The schema of one resource or data source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// State schema version.
    pub version: u64,
    /// Top-level attributes.
    pub block: Block,
}

impl Schema {
    /// An empty schema at `version`.
    #[must_use]
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.block = self.block.attr(name, attribute);
        self
    }

    /// Add a reusable group of attributes.
    #[must_use]
    pub fn with(mut self, group: Block) -> Self {
        self.block = self.block.merge(group);
        self
    }

    /// Look up a top-level attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.block.get(name)
    }

    /// Validate a configuration.
    #[must_use]
    pub fn validate(&self, config: &Map<String, Value>) -> Diagnostics {
        self.block.validate(config)
    }
}

fn child(path: &AttributePath, name: &str) -> AttributePath {
    if path.steps().is_empty() {
        AttributePath::root(name)
    } else {
        path.clone().attr(name)
    }
}

/// Returns true for null, empty strings and empty collections.
#[must_use]
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// The objects inside a block value.
fn objects(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

/// Resolve a dotted path such as `on_boarding_two_factor.device_limit_per_user`.
///
/// List-nested blocks are entered through their first element.
#[must_use]
pub fn lookup<'a>(root: &'a Map<String, Value>, dotted: &str) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    let mut map = root;
    for step in dotted.split('.') {
        let value = map.get(step).filter(|v| !is_empty(v))?;
        current = Some(value);
        if let Some(next) = objects(value).into_iter().next() {
            map = next;
        }
    }
    current
}

fn lookup_relative<'a>(config: &'a Map<String, Value>, dotted: &str) -> Option<&'a Value> {
    let last = dotted.rsplit('.').next().unwrap_or(dotted);
    config.get(last).filter(|v| !is_empty(v))
}

fn check_type(
    root: &Map<String, Value>,
    ty: &AttrType,
    value: &Value,
    path: &AttributePath,
    diags: &mut Diagnostics,
) {
    let ok = match (ty, value) {
        (AttrType::String, Value::String(_))
        | (AttrType::Bool, Value::Bool(_))
        | (AttrType::Int, Value::Number(_)) => true,
        (AttrType::List(elem) | AttrType::Set(elem), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_type(root, elem, item, &path.clone().index(i), diags);
            }
            true
        }
        (AttrType::Map(elem), Value::Object(map)) => {
            for (k, v) in map {
                check_type(root, elem, v, &path.clone().attr(k), diags);
            }
            true
        }
        (AttrType::Block { nesting, block }, value) => match (nesting, value) {
            (Nesting::Single, Value::Object(map)) => {
                block.validate_at(root, map, path, diags);
                true
            }
            (Nesting::List | Nesting::Set, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let here = path.clone().index(i);
                    match item {
                        Value::Object(map) => block.validate_at(root, map, &here, diags),
                        _ => diags.push(Diagnostic::invalid(here, "expected an object")),
                    }
                }
                true
            }
            _ => false,
        },
        _ => false,
    };

    if !ok {
        diags.push(Diagnostic::invalid(
            path.clone(),
            format!("{path} must be a {}", ty.name()),
        ));
    }
}

fn check_allowed(allowed: &[String], value: &Value, path: &AttributePath, diags: &mut Diagnostics) {
    let values: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for v in values {
        if let Some(s) = v.as_str() {
            if !allowed.iter().any(|a| a == s) {
                diags.push(Diagnostic::invalid(
                    path.clone(),
                    format!("{s:?} is not one of {}", allowed.join(", ")),
                ));
            }
        }
    }
}

/// Compare two values under `ty`, treating sets as unordered.
#[must_use]
pub fn values_equal(ty: &AttrType, a: &Value, b: &Value) -> bool {
    match (ty, a, b) {
        (_, Value::Null, other) | (_, other, Value::Null) => is_empty(other),
        (AttrType::Set(elem), Value::Array(x), Value::Array(y)) => set_equal(x, y, |p, q| {
            values_equal(elem, p, q)
        }),
        (AttrType::List(elem), Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(elem, p, q))
        }
        (AttrType::Block { nesting, block }, _, _) => match (nesting, a, b) {
            (Nesting::Single, Value::Object(x), Value::Object(y)) => blocks_equal(block, x, y),
            (Nesting::List, Value::Array(x), Value::Array(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y).all(|(p, q)| block_values_equal(block, p, q))
            }
            (Nesting::Set, Value::Array(x), Value::Array(y)) => {
                set_equal(x, y, |p, q| block_values_equal(block, p, q))
            }
            _ => a == b,
        },
        _ => a == b,
    }
}

fn block_values_equal(block: &Block, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => blocks_equal(block, x, y),
        _ => a == b,
    }
}

fn blocks_equal(block: &Block, a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    block.iter().all(|(name, attr)| {
        let x = a.get(name).unwrap_or(&Value::Null);
        let y = b.get(name).unwrap_or(&Value::Null);
        values_equal(&attr.ty, x, y)
    })
}

fn set_equal(x: &[Value], y: &[Value], eq: impl Fn(&Value, &Value) -> bool) -> bool {
    x.len() == y.len()
        && x.iter().all(|p| y.iter().any(|q| eq(p, q)))
        && y.iter().all(|q| x.iter().any(|p| eq(p, q)))
}
