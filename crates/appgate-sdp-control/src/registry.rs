//! Registered resource and data source types.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use appgate_sdp_core::EntityKind;

use crate::appliance::ControllerActivation;
use crate::customization::ApplianceCustomization;
use crate::data_source::EntityDataSource;
use crate::entities::generic_resources;
use crate::error::{ControlError, Result};
use crate::identity_provider;
use crate::license::License;
use crate::resource::{DataSource, Resource};
use crate::schema::Schema;
use crate::singleton::{admin_mfa_settings, global_settings, ClientConnections, ClientProfile};

/// Lookup table from type name to implementation.
#[derive(Clone, Default)]
pub struct Registry {
    resources: BTreeMap<String, Arc<dyn Resource>>,
    data_sources: BTreeMap<String, Arc<dyn DataSource>>,
}

/// Every schema the provider exposes, keyed by type name.
#[derive(Debug, Serialize)]
pub struct ProviderSchema<'a> {
    /// Resource schemas.
    pub resources: BTreeMap<&'a str, &'a Schema>,
    /// Data source schemas.
    pub data_sources: BTreeMap<&'a str, &'a Schema>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every resource and data source the provider ships.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for resource in generic_resources() {
            registry.add_resource(resource);
        }
        for resource in identity_provider::resources() {
            registry.add_resource(resource);
        }
        registry.add_resource(ApplianceCustomization::new());
        registry.add_resource(License::new());
        registry.add_resource(ControllerActivation::new());
        registry.add_resource(ClientProfile::new());
        registry.add_resource(ClientConnections::new());
        registry.add_resource(global_settings());
        registry.add_resource(admin_mfa_settings());

        for kind in EntityKind::ALL {
            registry.add_data_source(EntityDataSource::new(kind));
        }
        registry
    }

    /// Register a resource under its type name, replacing any previous one.
    pub fn add_resource(&mut self, resource: impl Resource + 'static) {
        self.resources
            .insert(resource.type_name().to_string(), Arc::new(resource));
    }

    /// Register a data source under its type name.
    pub fn add_data_source(&mut self, data_source: impl DataSource + 'static) {
        self.data_sources
            .insert(data_source.type_name().to_string(), Arc::new(data_source));
    }

    /// The resource registered as `type_name`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::UnknownType` if nothing is registered under that name.
    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn Resource>> {
        self.resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ControlError::UnknownType(type_name.to_string()))
    }

    /// The data source registered as `type_name`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::UnknownType` if nothing is registered under that name.
    pub fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>> {
        self.data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ControlError::UnknownType(type_name.to_string()))
    }

    /// Registered resource type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Registered data source type names, sorted.
    pub fn data_source_types(&self) -> impl Iterator<Item = &str> {
        self.data_sources.keys().map(String::as_str)
    }

    /// All schemas.
    #[must_use]
    pub fn schemas(&self) -> ProviderSchema<'_> {
        ProviderSchema {
            resources: self
                .resources
                .iter()
                .map(|(name, r)| (name.as_str(), r.schema()))
                .collect(),
            data_sources: self
                .data_sources
                .iter()
                .map(|(name, d)| (name.as_str(), d.schema()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}
