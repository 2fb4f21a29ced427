//! Controller versions, protocol versions and the version gate.
//!
//! The Controller reports its appliance version at login. That version decides
//! which attributes may be sent: fields introduced in a later release are
//! rejected by older Controllers, so every write consults a [`VersionGate`].
//! Reads are never gated; fields an older gate does not know about are simply
//! accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// A Controller (appliance) release version.
///
/// Only `major.minor.patch` participate in comparisons; build suffixes such as
/// `-31415-release` are accepted and dropped.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControllerVersion {
    major: u16,
    minor: u16,
    patch: u16,
}

impl ControllerVersion {
    /// 5.2, the oldest release the plugin talks to.
    pub const V5_2: Self = Self::new(5, 2, 0);
    /// 5.3.
    pub const V5_3: Self = Self::new(5, 3, 0);
    /// 5.4.
    pub const V5_4: Self = Self::new(5, 4, 0);
    /// 5.5, introduces `device_limit_per_user` at the identity provider root.
    pub const V5_5: Self = Self::new(5, 5, 0);
    /// 6.0.
    pub const V6_0: Self = Self::new(6, 0, 0);
    /// 6.1, introduces `network_inactivity_timeout_enabled`.
    pub const V6_1: Self = Self::new(6, 1, 0);
    /// 6.2.
    pub const V6_2: Self = Self::new(6, 2, 0);
    /// 6.3.
    pub const V6_3: Self = Self::new(6, 3, 0);
    /// 6.4.
    pub const V6_4: Self = Self::new(6, 4, 0);

    /// Build a version from its components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The major component.
    #[must_use]
    pub const fn major(&self) -> u16 {
        self.major
    }

    /// The minor component.
    #[must_use]
    pub const fn minor(&self) -> u16 {
        self.minor
    }

    /// `major.minor`, the form used in user-facing messages.
    #[must_use]
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl FromStr for ControllerVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let core = trimmed
            .split(['-', '+', ' '])
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');

        let mut component = |required: bool| -> Result<u16> {
            match parts.next() {
                Some(p) => p
                    .parse::<u16>()
                    .map_err(|_| CoreError::InvalidVersion(trimmed.to_string())),
                None if required => Err(CoreError::InvalidVersion(trimmed.to_string())),
                None => Ok(0),
            }
        };

        let major = component(true)?;
        let minor = component(true)?;
        let patch = component(false)?;
        if parts.next().is_some() {
            return Err(CoreError::InvalidVersion(trimmed.to_string()));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Debug for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerVersion({self})")
    }
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for ControllerVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ControllerVersion> for String {
    fn from(v: ControllerVersion) -> Self {
        v.to_string()
    }
}

/// The peer API protocol version negotiated through the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u16);

/// Protocol versions known to the plugin and the Controller release each one
/// shipped with.
const PROTOCOL_TABLE: [(u16, ControllerVersion); 9] = [
    (12, ControllerVersion::V5_2),
    (13, ControllerVersion::V5_3),
    (14, ControllerVersion::V5_4),
    (15, ControllerVersion::V5_5),
    (16, ControllerVersion::V6_0),
    (17, ControllerVersion::V6_1),
    (18, ControllerVersion::V6_2),
    (19, ControllerVersion::V6_3),
    (20, ControllerVersion::V6_4),
];

impl ProtocolVersion {
    /// Oldest protocol version the plugin speaks.
    pub const MIN: Self = Self(12);
    /// Newest protocol version the plugin speaks; the default.
    pub const MAX: Self = Self(20);

    /// Wrap a raw protocol number.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownProtocol` if the plugin does not know the version.
    pub fn new(version: u16) -> Result<Self> {
        if PROTOCOL_TABLE.iter().any(|(v, _)| *v == version) {
            Ok(Self(version))
        } else {
            Err(CoreError::UnknownProtocol(version))
        }
    }

    /// The raw protocol number.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// The Controller release that introduced this protocol version.
    #[must_use]
    pub fn controller_version(self) -> ControllerVersion {
        PROTOCOL_TABLE
            .iter()
            .find(|(v, _)| *v == self.0)
            .map_or(ControllerVersion::V5_2, |(_, c)| *c)
    }

    /// The vendor media type carrying this version.
    #[must_use]
    pub fn media_type(self) -> String {
        format!("application/vnd.appgate.peer-v{}+json", self.0)
    }

    /// Pick the newest known protocol not above `preferred` that lies within
    /// the range a Controller reported as supported.
    #[must_use]
    pub fn negotiate(preferred: Self, min_supported: u16, max_supported: u16) -> Option<Self> {
        PROTOCOL_TABLE
            .iter()
            .rev()
            .map(|(v, _)| *v)
            .find(|v| *v <= preferred.0 && *v >= min_supported && *v <= max_supported)
            .map(Self)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Decides whether a field or operation is available on the connected Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGate {
    current: ControllerVersion,
}

impl VersionGate {
    /// Create a gate for the given Controller version.
    #[must_use]
    pub const fn new(current: ControllerVersion) -> Self {
        Self { current }
    }

    /// The Controller version the gate was built for.
    #[must_use]
    pub const fn current(&self) -> ControllerVersion {
        self.current
    }

    /// Returns true when the Controller is at least `min`.
    #[must_use]
    pub fn supports(&self, min: ControllerVersion) -> bool {
        self.current >= min
    }

    /// Fail when a user-supplied `field` needs a newer Controller.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::VersionUnsupported` naming the field and the minimum version.
    pub fn require(&self, field: &str, min: ControllerVersion) -> Result<()> {
        if self.supports(min) {
            Ok(())
        } else {
            Err(CoreError::VersionUnsupported {
                field: field.to_string(),
                required: min,
                current: self.current,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_strings() {
        let v: ControllerVersion = "6.2.1-31415-release".parse().unwrap();
        assert_eq!(v, ControllerVersion::new(6, 2, 1));

        let v: ControllerVersion = "5.4".parse().unwrap();
        assert_eq!(v, ControllerVersion::V5_4);
    }

    #[test]
    fn rejects_malformed_versions() {
        for input in ["", "six", "5", "5.x.1", "5.4.0.1"] {
            assert!(
                input.parse::<ControllerVersion>().is_err(),
                "{input:?} should not parse"
            );
        }
    }

    #[test]
    fn orders_by_components() {
        assert!(ControllerVersion::V5_5 > ControllerVersion::V5_4);
        assert!(ControllerVersion::new(6, 0, 3) < ControllerVersion::V6_1);
        assert!(ControllerVersion::new(6, 1, 2) >= ControllerVersion::V6_1);
    }

    #[test]
    fn gate_rejects_newer_fields() {
        let gate = VersionGate::new("5.4.0".parse().unwrap());
        let err = gate
            .require("network_inactivity_timeout_enabled", ControllerVersion::V6_1)
            .unwrap_err();

        match err {
            CoreError::VersionUnsupported {
                field, required, ..
            } => {
                assert_eq!(field, "network_inactivity_timeout_enabled");
                assert_eq!(required.short(), "6.1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(gate.require("device_limit_per_user", ControllerVersion::V5_4).is_ok());
    }

    #[test]
    fn protocol_media_type() {
        assert_eq!(
            ProtocolVersion::MAX.media_type(),
            "application/vnd.appgate.peer-v20+json"
        );
        assert_eq!(
            ProtocolVersion::new(17).unwrap().controller_version(),
            ControllerVersion::V6_1
        );
        assert!(ProtocolVersion::new(11).is_err());
    }

    #[test]
    fn negotiation_picks_highest_common_version() {
        let preferred = ProtocolVersion::MAX;
        assert_eq!(
            ProtocolVersion::negotiate(preferred, 13, 18).map(ProtocolVersion::get),
            Some(18)
        );
        assert_eq!(
            ProtocolVersion::negotiate(ProtocolVersion::new(15).unwrap(), 13, 18)
                .map(ProtocolVersion::get),
            Some(15)
        );
        assert_eq!(ProtocolVersion::negotiate(preferred, 21, 30), None);
    }

    #[test]
    fn version_serde_as_string() {
        let json = serde_json::to_string(&ControllerVersion::V6_1).unwrap();
        assert_eq!(json, "\"6.1.0\"");
    }
}
