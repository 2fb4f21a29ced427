//! Entity kinds managed through the Controller REST API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A collection of named entities exposed by the Controller.
///
/// Every kind lives under a collection endpoint (`/{path}`) with single entity
/// endpoints at `/{path}/{id}`, and every kind supports name queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Access rules granting hosts and ports.
    Entitlement,
    /// Policies assigning entitlements and ringfence rules.
    Policy,
    /// Conditions evaluated before entitlement access.
    Condition,
    /// Sites grouping gateways.
    Site,
    /// Ringfence rules restricting client traffic.
    RingfenceRule,
    /// Scripts evaluated on claims.
    CriteriaScript,
    /// Scripts pushed to client devices.
    DeviceScript,
    /// Scripts producing entitlement hosts.
    EntitlementScript,
    /// IP address pools.
    IpPool,
    /// Administrative roles.
    AdministrativeRole,
    /// Trusted CA certificates.
    TrustedCertificate,
    /// MFA providers.
    MfaProvider,
    /// Users in the local database provider.
    LocalUser,
    /// Appliances (controllers, gateways, ...).
    Appliance,
    /// Appliance customization bundles.
    ApplianceCustomization,
    /// Identity providers.
    IdentityProvider,
}

impl EntityKind {
    /// All kinds, in registration order.
    pub const ALL: [Self; 16] = [
        Self::Entitlement,
        Self::Policy,
        Self::Condition,
        Self::Site,
        Self::RingfenceRule,
        Self::CriteriaScript,
        Self::DeviceScript,
        Self::EntitlementScript,
        Self::IpPool,
        Self::AdministrativeRole,
        Self::TrustedCertificate,
        Self::MfaProvider,
        Self::LocalUser,
        Self::Appliance,
        Self::ApplianceCustomization,
        Self::IdentityProvider,
    ];

    /// The snake-case name used in resource and data source type names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entitlement => "entitlement",
            Self::Policy => "policy",
            Self::Condition => "condition",
            Self::Site => "site",
            Self::RingfenceRule => "ringfence_rule",
            Self::CriteriaScript => "criteria_script",
            Self::DeviceScript => "device_script",
            Self::EntitlementScript => "entitlement_script",
            Self::IpPool => "ip_pool",
            Self::AdministrativeRole => "administrative_role",
            Self::TrustedCertificate => "trusted_certificate",
            Self::MfaProvider => "mfa_provider",
            Self::LocalUser => "local_user",
            Self::Appliance => "appliance",
            Self::ApplianceCustomization => "appliance_customization",
            Self::IdentityProvider => "identity_provider",
        }
    }

    /// The collection endpoint, relative to the Controller admin API root.
    #[must_use]
    pub const fn api_path(self) -> &'static str {
        match self {
            Self::Entitlement => "/entitlements",
            Self::Policy => "/policies",
            Self::Condition => "/conditions",
            Self::Site => "/sites",
            Self::RingfenceRule => "/ringfence-rules",
            Self::CriteriaScript => "/criteria-scripts",
            Self::DeviceScript => "/device-scripts",
            Self::EntitlementScript => "/entitlement-scripts",
            Self::IpPool => "/ip-pools",
            Self::AdministrativeRole => "/administrative-roles",
            Self::TrustedCertificate => "/trusted-certificates",
            Self::MfaProvider => "/mfa-providers",
            Self::LocalUser => "/local-users",
            Self::Appliance => "/appliances",
            Self::ApplianceCustomization => "/appliance-customizations",
            Self::IdentityProvider => "/identity-providers",
        }
    }

    /// The endpoint of a single entity.
    #[must_use]
    pub fn entity_path(self, id: &str) -> String {
        format!("{}/{id}", self.api_path())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Returned when parsing an unknown entity kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind: {0}")]
pub struct UnknownKind(pub String);
