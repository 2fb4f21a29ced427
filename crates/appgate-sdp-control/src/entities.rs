//! Field mappings of the entity kinds managed by the generic skeleton.
//!
//! Only the fields listed here are managed; anything else the Controller
//! returns is preserved on update and ignored on read.

use appgate_sdp_core::EntityKind;

use crate::crud::GenericResource;
use crate::groups;
use crate::schema::{AttrType, Attribute, Block, Nesting};

fn strings() -> Attribute {
    Attribute::set(AttrType::String)
}

fn entitlement() -> Block {
    Block::new()
        .attr("site", Attribute::string().required())
        .attr("disabled", Attribute::bool().default(false))
        .attr("conditions", strings())
        .attr(
            "condition_logic",
            Attribute::string().one_of(&["and", "or"]).default("and"),
        )
        .attr(
            "actions",
            Attribute::block(
                Nesting::Set,
                Block::new()
                    .attr("subtype", Attribute::string().required())
                    .attr("action", Attribute::string().required().one_of(&["allow", "block", "alert"]))
                    .attr("hosts", strings().required())
                    .attr("ports", strings())
                    .attr("types", strings()),
            )
            .required(),
        )
        .attr("app_shortcut_scripts", strings())
        .attr("risk_sensitivity", Attribute::string().one_of(&["low", "medium", "high"]))
}

fn policy() -> Block {
    Block::new()
        .attr(
            "type",
            Attribute::string()
                .one_of(&["Access", "Device", "Dns", "Admin", "Stop"])
                .default("Access"),
        )
        .attr("disabled", Attribute::bool().default(false))
        .attr("expression", Attribute::string().required())
        .attr("entitlements", strings())
        .attr("entitlement_links", strings())
        .attr("ringfence_rules", strings())
        .attr("ringfence_rule_links", strings())
        .attr("administrative_roles", strings())
        .attr("tamper_proofing", Attribute::bool().default(true))
        .attr("override_site", Attribute::string())
        .attr(
            "dns_settings",
            Attribute::block(
                Nesting::Set,
                Block::new()
                    .attr("domain", Attribute::string().required())
                    .attr("servers", strings()),
            ),
        )
}

fn condition() -> Block {
    Block::new()
        .attr("expression", Attribute::string().required())
        .attr("repeat_schedules", strings())
        .attr(
            "remedy_methods",
            Attribute::block(
                Nesting::List,
                Block::new()
                    .attr(
                        "type",
                        Attribute::string().required().one_of(&[
                            "DisplayMessage",
                            "OtpAuthentication",
                            "PasswordAuthentication",
                            "Reason",
                        ]),
                    )
                    .attr("message", Attribute::string().required())
                    .attr("claim_suffix", Attribute::string())
                    .attr("provider_id", Attribute::string()),
            ),
        )
}

fn site() -> Block {
    Block::new()
        .attr("short_name", Attribute::string())
        .attr("description", Attribute::string())
        .attr("network_subnets", strings())
        .attr("entitlement_based_routing", Attribute::bool().default(false))
        .attr(
            "ip_pool_mappings",
            Attribute::block(
                Nesting::Set,
                Block::new()
                    .attr("from", Attribute::string().required())
                    .attr("to", Attribute::string().required()),
            ),
        )
        .attr(
            "default_gateway",
            Attribute::block(
                Nesting::Single,
                Block::new()
                    .attr("enabled_v4", Attribute::bool().default(false))
                    .attr("enabled_v6", Attribute::bool().default(false))
                    .attr("excluded_subnets", strings()),
            )
            .optional_computed(),
        )
}

fn ringfence_rule() -> Block {
    Block::new().attr(
        "actions",
        Attribute::block(
            Nesting::Set,
            Block::new()
                .attr(
                    "protocol",
                    Attribute::string().required().one_of(&["icmp", "icmpv6", "udp", "tcp"]),
                )
                .attr("direction", Attribute::string().required().one_of(&["up", "down"]))
                .attr("action", Attribute::string().required().one_of(&["allow", "block"]))
                .attr("hosts", strings().required())
                .attr("ports", strings())
                .attr("types", strings()),
        )
        .required(),
    )
}

fn expression_only() -> Block {
    Block::new().attr("expression", Attribute::string().required())
}

fn device_script() -> Block {
    Block::new()
        .attr("filename", Attribute::string().required())
        .attr("content", Attribute::string().required().wire("file"))
        .attr("checksum_sha256", Attribute::string().computed().wire("checksum"))
}

fn entitlement_script() -> Block {
    Block::new()
        .attr(
            "type",
            Attribute::string()
                .one_of(&["host", "portOrType", "appShortcut", "appShortcutHref"])
                .default("host"),
        )
        .attr("expression", Attribute::string().required())
}

fn ip_pool() -> Block {
    Block::new()
        .attr("ip_version6", Attribute::bool().default(false).force_new())
        .attr("lease_time_days", Attribute::int().default(30))
        .attr(
            "ranges",
            Attribute::block(
                Nesting::List,
                Block::new()
                    .attr("first", Attribute::string().required())
                    .attr("last", Attribute::string().required()),
            ),
        )
        .attr("total", Attribute::int().computed())
        .attr("currently_used", Attribute::int().computed())
}

fn administrative_role() -> Block {
    Block::new().attr(
        "privileges",
        Attribute::block(
            Nesting::List,
            Block::new()
                .attr("type", Attribute::string().required())
                .attr("target", Attribute::string().required())
                .attr("default_tags", strings())
                .attr(
                    "scope",
                    Attribute::block(
                        Nesting::Single,
                        Block::new()
                            .attr("all", Attribute::bool().default(false))
                            .attr("ids", strings())
                            .attr("tags", strings()),
                    ),
                ),
        ),
    )
}

fn trusted_certificate() -> Block {
    Block::new()
        .attr("pem", Attribute::string().required())
        .attr(
            "details",
            Attribute::block(
                Nesting::Single,
                Block::new()
                    .attr("issuer", Attribute::string().computed())
                    .attr("subject", Attribute::string().computed())
                    .attr("valid_from", Attribute::string().computed())
                    .attr("valid_to", Attribute::string().computed())
                    .attr("fingerprint", Attribute::string().computed()),
            )
            .computed(),
        )
}

fn mfa_provider() -> Block {
    Block::new()
        .attr(
            "type",
            Attribute::string()
                .required()
                .one_of(&["Radius", "DefaultTimeBased"])
                .force_new(),
        )
        .attr("hostnames", strings())
        .attr("port", Attribute::int().default(1812))
        .attr(
            "input_type",
            Attribute::string().one_of(&["Masked", "Numeric", "Text"]).default("Masked"),
        )
        .attr("shared_secret", Attribute::string().write_only())
        .attr(
            "authentication_protocol",
            Attribute::string().one_of(&["PAP", "CHAP"]).default("CHAP"),
        )
        .attr("timeout", Attribute::int().default(10))
        .attr(
            "mode",
            Attribute::string().one_of(&["OneFactor", "Challenge", "Push"]).default("OneFactor"),
        )
        .attr("use_user_password", Attribute::bool())
}

fn local_user() -> Block {
    Block::new()
        .attr("first_name", Attribute::string().required())
        .attr("last_name", Attribute::string().required())
        .attr("password", Attribute::string().write_only())
        .attr("email", Attribute::string())
        .attr("phone", Attribute::string())
        .attr("failed_login_attempts", Attribute::int().computed())
        .attr("lock_start", Attribute::string().computed())
}

fn appliance() -> Block {
    Block::new()
        .attr("hostname", Attribute::string().required())
        .attr("site", Attribute::string())
        .attr("customization", Attribute::string())
        .attr("connect_to_peers_using_client_port_with_spa", Attribute::bool().default(false))
        .attr("activated", Attribute::bool().computed())
        .attr("pending_certificate_renewal", Attribute::bool().computed())
        .attr(
            "client_interface",
            Attribute::block(
                Nesting::Single,
                Block::new()
                    .attr("hostname", Attribute::string().required())
                    .attr("proxy_protocol", Attribute::bool().default(false))
                    .attr("https_port", Attribute::int().default(443))
                    .attr("dtls_port", Attribute::int().default(443))
                    .attr("allow_sources", groups::allow_sources())
                    .attr("override_spa_mode", Attribute::string().one_of(&["TCP", "UDP-TCP"])),
            )
            .required(),
        )
        .attr(
            "peer_interface",
            Attribute::block(
                Nesting::Single,
                Block::new()
                    .attr("hostname", Attribute::string().required())
                    .attr("https_port", Attribute::int().default(444))
                    .attr("allow_sources", groups::allow_sources()),
            )
            .required(),
        )
        .attr("admin_interface", groups::admin_interface())
}

/// Resources for every kind handled by the generic skeleton.
#[must_use]
pub fn generic_resources() -> Vec<GenericResource> {
    vec![
        GenericResource::new(EntityKind::Entitlement, "entitlement_id", entitlement()),
        GenericResource::new(EntityKind::Policy, "policy_id", policy()),
        GenericResource::new(EntityKind::Condition, "condition_id", condition()),
        GenericResource::new(EntityKind::Site, "site_id", site()),
        GenericResource::new(EntityKind::RingfenceRule, "ringfence_rule_id", ringfence_rule()),
        GenericResource::new(EntityKind::CriteriaScript, "criteria_script_id", expression_only()),
        GenericResource::new(EntityKind::DeviceScript, "device_script_id", device_script()),
        GenericResource::new(
            EntityKind::EntitlementScript,
            "entitlement_script_id",
            entitlement_script(),
        ),
        GenericResource::new(EntityKind::IpPool, "ip_pool_id", ip_pool()),
        GenericResource::new(
            EntityKind::AdministrativeRole,
            "administrative_role_id",
            administrative_role(),
        ),
        GenericResource::new(
            EntityKind::TrustedCertificate,
            "trusted_certificate_id",
            trusted_certificate(),
        ),
        GenericResource::new(EntityKind::MfaProvider, "mfa_provider_id", mfa_provider()),
        GenericResource::new(EntityKind::LocalUser, "local_user_id", local_user()),
        GenericResource::new(EntityKind::Appliance, "appliance_id", appliance()),
    ]
}
