//! Identity providers.
//!
//! ```text
//!   attributes ──► to_wire ──► typed model ──► Controller
//!                                  │
//!   state ◄──── from_wire ◄────────┘
//! ```
//!
//! All provider types share one Controller collection. Every body passes
//! through [`model::IdentityProvider`] on its way in and out, which rejects
//! bodies of the wrong type and keeps fields no attribute maps.

pub mod migrate;
pub mod model;
mod resource;
pub mod schema;

pub use model::{IdentityProvider, ProviderType};
pub use resource::IdentityProviderResource;

/// One resource per provider type.
#[must_use]
pub fn resources() -> Vec<IdentityProviderResource> {
    ProviderType::ALL
        .into_iter()
        .map(IdentityProviderResource::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    #[test]
    fn type_names_follow_provider_prefix() {
        let names: Vec<String> = resources().iter().map(|r| r.type_name().to_string()).collect();
        assert!(names.contains(&"appgatesdp_ldap_certificate_identity_provider".to_string()));
        assert!(names.contains(&"appgatesdp_local_database_identity_provider".to_string()));
        assert_eq!(names.len(), 7);
    }
}
