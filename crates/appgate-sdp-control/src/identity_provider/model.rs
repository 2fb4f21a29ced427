//! Typed wire model of identity providers.
//!
//! The Controller returns every provider from one collection, discriminated by
//! `type`. Each variant is the shared [`CommonFields`] plus its own fields plus
//! a remainder map holding whatever else the Controller sent, so a body that
//! goes through the model keeps fields this provider does not manage.
//!
//! Field names mirror the Controller API and are not documented one by one.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ControlError, Result};

/// Provider type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// The built-in local user database.
    LocalDatabase,
    /// RADIUS.
    Radius,
    /// LDAP.
    Ldap,
    /// LDAP with client certificates.
    LdapCertificate,
    /// SAML 2.0.
    Saml,
    /// OpenID Connect.
    Oidc,
    /// The built-in connector provider.
    Connector,
}

impl ProviderType {
    /// All variants.
    pub const ALL: [Self; 7] = [
        Self::LocalDatabase,
        Self::Radius,
        Self::Ldap,
        Self::LdapCertificate,
        Self::Saml,
        Self::Oidc,
        Self::Connector,
    ];

    /// The wire discriminator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalDatabase => "LocalDatabase",
            Self::Radius => "Radius",
            Self::Ldap => "Ldap",
            Self::LdapCertificate => "LdapCertificate",
            Self::Saml => "Saml",
            Self::Oidc => "Oidc",
            Self::Connector => "Connector",
        }
    }

    /// Snake-case prefix of the resource type name.
    #[must_use]
    pub const fn resource_prefix(self) -> &'static str {
        match self {
            Self::LocalDatabase => "local_database",
            Self::Radius => "radius",
            Self::Ldap => "ldap",
            Self::LdapCertificate => "ldap_certificate",
            Self::Saml => "saml",
            Self::Oidc => "oidc",
            Self::Connector => "connector",
        }
    }

    /// Computed id mirror attribute of the resource.
    #[must_use]
    pub const fn id_attr(self) -> &'static str {
        match self {
            Self::LocalDatabase => "local_database_identity_provider_id",
            Self::Radius => "radius_identity_provider_id",
            Self::Ldap => "ldap_identity_provider_id",
            Self::LdapCertificate => "ldap_certificate_identity_provider_id",
            Self::Saml => "saml_identity_provider_id",
            Self::Oidc => "oidc_identity_provider_id",
            Self::Connector => "connector_identity_provider_id",
        }
    }

    /// Reserved name of the built-in instance, for types that cannot be
    /// created or deleted.
    #[must_use]
    pub const fn builtin_name(self) -> Option<&'static str> {
        match self {
            Self::LocalDatabase => Some("local"),
            Self::Connector => Some("Connector"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by all provider types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommonFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_provider: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_limit_per_user: Option<u32>,
    #[serde(rename = "onBoarding2FA", skip_serializing_if = "Option::is_none")]
    pub on_boarding_two_factor: Option<OnBoardingTwoFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_inactivity_timeout_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_pool_v4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_pool_v6: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_scripts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_search_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_local_dns_requests: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claim_mappings: Vec<ClaimMapping>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub on_demand_claim_mappings: Vec<OnDemandClaimMapping>,
}

/// Onboarding multi-factor settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnBoardingTwoFactor {
    pub mfa_provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Only accepted by Controllers older than 5.5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_limit_per_user: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_required: Option<bool>,
}

/// Maps an upstream attribute to a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMapping {
    pub attribute_name: String,
    pub claim_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
}

/// Commands a client can run to produce on-demand claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnDemandCommand {
    FileSize,
    FileExists,
    FileCreated,
    FileUpdated,
    FileVersion,
    FileSha512,
    ProcessRunning,
    ProcessList,
    ServiceRunning,
    ServiceList,
    RegExists,
    RegQuery,
    RunScript,
}

impl OnDemandCommand {
    /// Accepted wire values.
    pub const NAMES: [&'static str; 13] = [
        "fileSize",
        "fileExists",
        "fileCreated",
        "fileUpdated",
        "fileVersion",
        "fileSha512",
        "processRunning",
        "processList",
        "serviceRunning",
        "serviceList",
        "regExists",
        "regQuery",
        "runScript",
    ];
}

/// Platforms an on-demand claim applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnDemandPlatform {
    #[serde(rename = "desktop.windows.all")]
    Windows,
    #[serde(rename = "desktop.macos.all")]
    MacOs,
    #[serde(rename = "desktop.linux.all")]
    Linux,
    #[serde(rename = "desktop.all")]
    Desktop,
    #[serde(rename = "mobile.android.all")]
    Android,
    #[serde(rename = "mobile.ios.all")]
    Ios,
    #[serde(rename = "mobile.all")]
    Mobile,
    #[serde(rename = "all")]
    All,
}

impl OnDemandPlatform {
    /// Accepted wire values.
    pub const NAMES: [&'static str; 8] = [
        "desktop.windows.all",
        "desktop.macos.all",
        "desktop.linux.all",
        "desktop.all",
        "mobile.android.all",
        "mobile.ios.all",
        "mobile.all",
        "all",
    ];
}

/// A claim computed on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandClaimMapping {
    pub command: OnDemandCommand,
    pub claim_name: String,
    #[serde(default)]
    pub parameters: OnDemandParameters,
    pub platform: OnDemandPlatform,
}

/// Command parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnDemandParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

/// Password expiry warning shown to users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalDatabaseFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_lockout_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_lockout_duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_password_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_warning: Option<PasswordWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RadiusFields {
    pub hostnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LdapFields {
    pub hostnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_distinguished_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_base_dn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_warning: Option<PasswordWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CertificateFields {
    pub ca_certificates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_user_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_x509_external_checks: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamlFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decryption_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_authn: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OidcFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorFields {}

/// One provider variant: shared fields, variant fields, and the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant<F> {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(flatten)]
    pub fields: F,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// LDAP with certificates: the LDAP fields plus certificate matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LdapCertificateVariant {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(flatten)]
    pub ldap: LdapFields,
    #[serde(flatten)]
    pub fields: CertificateFields,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An identity provider as the Controller stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IdentityProvider {
    LocalDatabase(Variant<LocalDatabaseFields>),
    Radius(Variant<RadiusFields>),
    Ldap(Variant<LdapFields>),
    LdapCertificate(LdapCertificateVariant),
    Saml(Variant<SamlFields>),
    Oidc(Variant<OidcFields>),
    Connector(Variant<ConnectorFields>),
}

impl IdentityProvider {
    /// Parse a Controller body.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown types or malformed fields.
    pub fn from_body(body: Value) -> Result<Self> {
        serde_json::from_value(body)
            .map_err(|e| ControlError::validation(format!("invalid identity provider: {e}")))
    }

    /// Encode as a Controller body.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_body(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// The variant discriminator.
    #[must_use]
    pub const fn provider_type(&self) -> ProviderType {
        match self {
            Self::LocalDatabase(_) => ProviderType::LocalDatabase,
            Self::Radius(_) => ProviderType::Radius,
            Self::Ldap(_) => ProviderType::Ldap,
            Self::LdapCertificate(_) => ProviderType::LdapCertificate,
            Self::Saml(_) => ProviderType::Saml,
            Self::Oidc(_) => ProviderType::Oidc,
            Self::Connector(_) => ProviderType::Connector,
        }
    }

    /// The shared fields.
    #[must_use]
    pub const fn common(&self) -> &CommonFields {
        match self {
            Self::LocalDatabase(v) => &v.common,
            Self::Radius(v) => &v.common,
            Self::Ldap(v) => &v.common,
            Self::LdapCertificate(v) => &v.common,
            Self::Saml(v) => &v.common,
            Self::Oidc(v) => &v.common,
            Self::Connector(v) => &v.common,
        }
    }

    /// The fields the Controller sent that no variant models.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        match self {
            Self::LocalDatabase(v) => &v.extra,
            Self::Radius(v) => &v.extra,
            Self::Ldap(v) => &v.extra,
            Self::LdapCertificate(v) => &v.extra,
            Self::Saml(v) => &v.extra,
            Self::Oidc(v) => &v.extra,
            Self::Connector(v) => &v.extra,
        }
    }

    /// Parse a body and require it to be of type `expected`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the body is of another type.
    pub fn expect_type(body: Value, expected: ProviderType) -> Result<Self> {
        let provider = Self::from_body(body)?;
        if provider.provider_type() == expected {
            Ok(provider)
        } else {
            Err(ControlError::validation(format!(
                "identity provider {:?} is of type {}, not {expected}",
                provider.common().name,
                provider.provider_type()
            )))
        }
    }
}
