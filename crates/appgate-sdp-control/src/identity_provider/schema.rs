//! Schemas of the identity provider resources.
//!
//! ```text
//!   base entity ─┐
//!   common ──────┼─► variant schema (one per provider type)
//!   variant ─────┘
//! ```

use appgate_sdp_core::ControllerVersion;

use super::model::{OnDemandCommand, OnDemandPlatform, ProviderType};
use crate::groups;
use crate::schema::{AttrType, Attribute, Block, Nesting, Schema};
use crate::timeouts::timeouts_block;

/// Current state schema version.
pub const SCHEMA_VERSION: u64 = 1;

fn strings() -> Attribute {
    Attribute::list(AttrType::String)
}

fn on_boarding_two_factor() -> Attribute {
    Attribute::block(
        Nesting::Single,
        Block::new()
            .attr("mfa_provider_id", Attribute::string().required())
            .attr("message", Attribute::string())
            .attr(
                "device_limit_per_user",
                Attribute::int()
                    .conflicts_with(&["device_limit_per_user"])
                    .deprecated("use device_limit_per_user at the provider root on Controller 5.5 and newer"),
            )
            .attr("claim_suffix", Attribute::string())
            .attr("always_required", Attribute::bool()),
    )
    .wire("onBoarding2FA")
}

fn claim_mappings() -> Attribute {
    Attribute::block(
        Nesting::Set,
        Block::new()
            .attr("attribute_name", Attribute::string().required())
            .attr("claim_name", Attribute::string().required())
            .attr("list", Attribute::bool().default(false))
            .attr("encrypted", Attribute::bool().default(false).wire("encrypt")),
    )
}

fn on_demand_claim_mappings() -> Attribute {
    Attribute::block(
        Nesting::List,
        Block::new()
            .attr("command", Attribute::string().required().one_of(&OnDemandCommand::NAMES))
            .attr("claim_name", Attribute::string().required())
            .attr(
                "parameters",
                Attribute::block(
                    Nesting::Single,
                    Block::new()
                        .attr("name", Attribute::string())
                        .attr("path", Attribute::string())
                        .attr("args", Attribute::string()),
                ),
            )
            .attr("platform", Attribute::string().required().one_of(&OnDemandPlatform::NAMES)),
    )
}

/// Attributes every provider type carries.
#[must_use]
pub fn common() -> Block {
    Block::new()
        .attr("type", Attribute::string().computed())
        .attr("admin_provider", Attribute::bool().default(false))
        .attr(
            "device_limit_per_user",
            Attribute::int()
                .optional_computed()
                .min_version(ControllerVersion::V5_5)
                .conflicts_with(&["on_boarding_two_factor.device_limit_per_user"]),
        )
        .attr("on_boarding_two_factor", on_boarding_two_factor())
        .attr("inactivity_timeout_minutes", Attribute::int().default(0))
        .attr(
            "network_inactivity_timeout_enabled",
            Attribute::bool().min_version(ControllerVersion::V6_1),
        )
        .attr("ip_pool_v4", Attribute::string())
        .attr("ip_pool_v6", Attribute::string())
        .attr("user_scripts", strings())
        .attr("dns_servers", strings())
        .attr("dns_search_domains", strings())
        .attr("block_local_dns_requests", Attribute::bool().default(false))
        .attr("claim_mappings", claim_mappings())
        .attr("on_demand_claim_mappings", on_demand_claim_mappings())
}

fn password_warning() -> Attribute {
    Attribute::block(
        Nesting::Single,
        Block::new()
            .attr("enabled", Attribute::bool().default(false))
            .attr("threshold_days", Attribute::int().default(5))
            .attr("message", Attribute::string()),
    )
    .optional_computed()
}

fn ldap() -> Block {
    Block::new()
        .attr("hostnames", strings().required())
        .attr("port", Attribute::int().default(389))
        .attr("ssl_enabled", Attribute::bool().default(false))
        .attr("admin_distinguished_name", Attribute::string().required())
        .attr("admin_password", Attribute::string().write_only())
        .attr("base_dn", Attribute::string())
        .attr("object_class", Attribute::string().default("user"))
        .attr("username_attribute", Attribute::string().default("sAMAccountName"))
        .attr("membership_filter", Attribute::string().default("(objectCategory=group)"))
        .attr("membership_base_dn", Attribute::string())
        .attr("password_warning", password_warning())
}

/// Attributes specific to `provider_type`.
#[must_use]
pub fn variant(provider_type: ProviderType) -> Block {
    match provider_type {
        ProviderType::LocalDatabase => Block::new()
            .attr("user_lockout_threshold", Attribute::int().default(5))
            .attr("user_lockout_duration_minutes", Attribute::int().default(1))
            .attr("min_password_length", Attribute::int().optional_computed())
            .attr("password_warning", password_warning()),
        ProviderType::Radius => Block::new()
            .attr("hostnames", strings().required())
            .attr("port", Attribute::int().default(1812))
            .attr("shared_secret", Attribute::string().write_only())
            .attr(
                "authentication_protocol",
                Attribute::string().one_of(&["PAP", "CHAP"]).default("CHAP"),
            ),
        ProviderType::Ldap => ldap(),
        ProviderType::LdapCertificate => ldap()
            .attr("ca_certificates", strings().required())
            .attr("certificate_user_attribute", Attribute::string())
            .attr("certificate_attribute", Attribute::string().default("userCertificate"))
            .attr("skip_x509_external_checks", Attribute::bool().default(false)),
        ProviderType::Saml => Block::new()
            .attr("redirect_url", Attribute::string().required())
            .attr("issuer", Attribute::string().required())
            .attr("audience", Attribute::string().required())
            .attr("provider_certificate", Attribute::string().required())
            .attr("decryption_key", Attribute::string().write_only())
            .attr("force_authn", Attribute::bool()),
        ProviderType::Oidc => Block::new()
            .attr("issuer", Attribute::string().required())
            .attr("audience", Attribute::string().required())
            .attr("scope", Attribute::string())
            .attr("google", Attribute::bool().default(false)),
        ProviderType::Connector => Block::new(),
    }
}

/// The full schema of the `provider_type` resource.
#[must_use]
pub fn resource_schema(provider_type: ProviderType) -> Schema {
    let mut schema = Schema::new(SCHEMA_VERSION)
        .with(groups::base_entity(provider_type.id_attr()))
        .with(common())
        .with(variant(provider_type))
        .with(timeouts_block());
    if let Some(builtin) = provider_type.builtin_name() {
        schema = schema.attr("name", Attribute::string().default(builtin));
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variants_share_common_attributes() {
        for t in ProviderType::ALL {
            let schema = resource_schema(t);
            assert!(schema.get("claim_mappings").is_some(), "{t}");
            assert!(schema.get(t.id_attr()).is_some(), "{t}");
        }
        assert!(resource_schema(ProviderType::Saml).get("hostnames").is_none());
        assert!(resource_schema(ProviderType::LdapCertificate).get("base_dn").is_some());
    }

    #[test]
    fn builtins_default_their_name() {
        let schema = resource_schema(ProviderType::Connector);
        let diags = schema.validate(json!({}).as_object().unwrap());
        assert!(!diags.has_errors());
    }

    #[test]
    fn root_and_nested_device_limit_conflict() {
        let schema = resource_schema(ProviderType::Oidc);
        let diags = schema.validate(
            json!({
                "name": "o",
                "issuer": "https://issuer",
                "audience": "sdp",
                "device_limit_per_user": 4,
                "on_boarding_two_factor": {"mfa_provider_id": "m", "device_limit_per_user": 4}
            })
            .as_object()
            .unwrap(),
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn on_demand_platform_is_validated_locally() {
        let schema = resource_schema(ProviderType::Saml);
        let diags = schema.validate(
            json!({
                "name": "s",
                "redirect_url": "https://r",
                "issuer": "i",
                "audience": "a",
                "provider_certificate": "PEM",
                "on_demand_claim_mappings": [
                    {"command": "fileExists", "claim_name": "c", "platform": "desktop.beos.all"}
                ]
            })
            .as_object()
            .unwrap(),
        );
        assert!(diags.iter().any(|d| d.summary.contains("desktop.beos.all")));
    }
}
