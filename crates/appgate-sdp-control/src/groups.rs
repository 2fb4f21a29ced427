//! Reusable attribute groups shared by resource schemas.

use crate::schema::{AttrType, Attribute, Block, Nesting};

/// Default `notes` value marking entities created by this provider.
pub const DEFAULT_NOTES: &str = "Managed by terraform";

/// Attributes every Controller entity carries.
///
/// `id_attr` is the computed mirror of `id` (e.g. `entitlement_id`) that other
/// resources reference.
#[must_use]
pub fn base_entity(id_attr: &str) -> Block {
    Block::new()
        .attr(
            "id",
            Attribute::string()
                .optional_computed()
                .force_new()
                .describe("Entity id; generated unless pinned."),
        )
        .attr(id_attr, Attribute::string().computed().local())
        .attr("name", Attribute::string().required())
        .attr("notes", notes())
        .attr("tags", tags())
}

/// `notes`, defaulting to the provider marker.
#[must_use]
pub fn notes() -> Attribute {
    Attribute::string().default(DEFAULT_NOTES)
}

/// `tags`, an unordered set of strings.
#[must_use]
pub fn tags() -> Attribute {
    Attribute::set(AttrType::String)
}

/// `allow_sources`, the address ranges an interface accepts.
#[must_use]
pub fn allow_sources() -> Attribute {
    Attribute::block(
        Nesting::List,
        Block::new()
            .attr("address", Attribute::string().required())
            .attr("netmask", Attribute::int().required())
            .attr("nic", Attribute::string()),
    )
}

/// `admin_interface`, the appliance's administrative listener.
#[must_use]
pub fn admin_interface() -> Attribute {
    Attribute::block(
        Nesting::Single,
        Block::new()
            .attr("hostname", Attribute::string().required())
            .attr("https_port", Attribute::int().default(8443))
            .attr("https_ciphers", Attribute::list(AttrType::String))
            .attr("allow_sources", allow_sources()),
    )
}
