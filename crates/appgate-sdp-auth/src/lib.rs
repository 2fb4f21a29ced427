//! Controller authentication for the Appgate SDP provider.
//!
//! This crate turns a [`ProviderConfig`] into an authenticated [`Session`]:
//!
//! - builds the HTTP transport (timeouts, user agent, TLS verification)
//! - logs in with a per-process device id
//! - negotiates the peer API protocol version through the `Accept` header
//! - captures the bearer token and the Controller version
//! - refreshes the token lazily, at most once per concurrent burst
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Resource ops    │────▶│  SessionManager  │
//! │  (control crate) │     │  (single-flight) │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │   LoginClient    │
//!                          │   POST /login    │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │   Controller     │
//!                          │   admin API      │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use appgate_sdp_auth::{ProviderConfig, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::new("https://controller.example.com:8443/admin")
//!     .with_credentials("admin", "admin");
//! let manager = SessionManager::new(config)?;
//!
//! let session = manager.session().await?;
//! println!("Controller version: {}", session.controller_version());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod session;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use appgate_sdp_core::ProtocolVersion;

pub use client::{build_http_client, LoginClient, LoginRequest, LoginResponse, USER_AGENT};
pub use error::{AuthError, Result};
pub use session::{Session, SessionKey, SessionManager, SessionRegistry};

/// Environment variable holding the Controller admin API URL.
pub const ENV_ADDRESS: &str = "APPGATE_ADDRESS";
/// Environment variable holding the admin username.
pub const ENV_USERNAME: &str = "APPGATE_USERNAME";
/// Environment variable holding the admin password.
pub const ENV_PASSWORD: &str = "APPGATE_PASSWORD";
/// Environment variable holding the identity provider used for login.
pub const ENV_PROVIDER: &str = "APPGATE_PROVIDER";
/// Environment variable toggling TLS verification.
pub const ENV_INSECURE: &str = "APPGATE_INSECURE";
/// Environment variable holding the HTTP timeout in seconds.
pub const ENV_TIMEOUT: &str = "APPGATE_TIMEOUT";
/// Environment variable holding the peer API protocol version.
pub const ENV_VERSION: &str = "APPGATE_VERSION";

/// Top-level provider configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Controller admin API URL, e.g. `https://controller:8443/admin`.
    #[serde(default)]
    pub url: String,

    /// Admin username.
    #[serde(default)]
    pub username: Option<String>,

    /// Admin password.
    #[serde(default)]
    pub password: Option<String>,

    /// Identity provider the admin logs in through.
    #[serde(default = "ProviderConfig::default_provider_name")]
    pub provider_name: String,

    /// Skip TLS certificate verification.
    #[serde(default = "ProviderConfig::default_insecure")]
    pub insecure: bool,

    /// HTTP timeout in seconds.
    #[serde(default = "ProviderConfig::default_timeout")]
    pub timeout: u64,

    /// Verbose request logging.
    #[serde(default)]
    pub debug: bool,

    /// Preferred peer API protocol version; defaults to the newest known.
    #[serde(default)]
    pub version: Option<u16>,

    /// How long login keeps retrying an unreachable Controller, in seconds.
    #[serde(default = "ProviderConfig::default_login_timeout")]
    pub login_timeout: u64,
}

impl ProviderConfig {
    fn default_provider_name() -> String {
        "local".to_string()
    }

    const fn default_insecure() -> bool {
        true
    }

    const fn default_timeout() -> u64 {
        20
    }

    const fn default_login_timeout() -> u64 {
        20
    }

    /// Configuration for the given URL with every other field at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            provider_name: Self::default_provider_name(),
            insecure: Self::default_insecure(),
            timeout: Self::default_timeout(),
            debug: false,
            version: None,
            login_timeout: Self::default_login_timeout(),
        }
    }

    /// Set username and password.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Fill unset fields from `APPGATE_*` variables using the given lookup.
    ///
    /// Explicit configuration always wins over the environment.
    #[must_use]
    pub fn with_env_fallback<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.url.is_empty() {
            if let Some(url) = lookup(ENV_ADDRESS) {
                self.url = url;
            }
        }
        if self.username.is_none() {
            self.username = lookup(ENV_USERNAME);
        }
        if self.password.is_none() {
            self.password = lookup(ENV_PASSWORD);
        }
        if let Some(provider) = lookup(ENV_PROVIDER) {
            if self.provider_name == Self::default_provider_name() {
                self.provider_name = provider;
            }
        }
        if let Some(insecure) = lookup(ENV_INSECURE).and_then(|v| v.parse().ok()) {
            self.insecure = insecure;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT).and_then(|v| v.parse().ok()) {
            if self.timeout == Self::default_timeout() {
                self.timeout = timeout;
            }
        }
        if self.version.is_none() {
            self.version = lookup(ENV_VERSION).and_then(|v| v.parse().ok());
        }
        self
    }

    /// Fill unset fields from the process environment.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env_fallback(|key| std::env::var(key).ok())
    }

    /// Check the configuration and normalise the URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ConfigInvalid` when the URL, credentials, timeout or
    /// protocol version are unusable.
    pub fn validate(&mut self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(AuthError::ConfigInvalid(format!(
                "url is required (or set {ENV_ADDRESS})"
            )));
        }
        let parsed = reqwest::Url::parse(self.url.trim())
            .map_err(|e| AuthError::ConfigInvalid(format!("url {:?}: {e}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::ConfigInvalid(format!(
                "url scheme must be http or https, got {:?}",
                parsed.scheme()
            )));
        }
        self.url = self.url.trim().trim_end_matches('/').to_string();

        if self.username.as_deref().unwrap_or_default().is_empty() {
            return Err(AuthError::ConfigInvalid(format!(
                "username is required (or set {ENV_USERNAME})"
            )));
        }
        if self.password.as_deref().unwrap_or_default().is_empty() {
            return Err(AuthError::ConfigInvalid(format!(
                "password is required (or set {ENV_PASSWORD})"
            )));
        }
        if self.timeout == 0 {
            return Err(AuthError::ConfigInvalid(
                "timeout must be greater than zero".to_string(),
            ));
        }
        self.protocol()?;
        Ok(())
    }

    /// The preferred protocol version.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ConfigInvalid` for versions the plugin does not know.
    pub fn protocol(&self) -> Result<ProtocolVersion> {
        match self.version {
            None => Ok(ProtocolVersion::default()),
            Some(v) => ProtocolVersion::new(v).map_err(|e| AuthError::ConfigInvalid(e.to_string())),
        }
    }

    /// The HTTP timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// The login retry window as a `Duration`.
    #[must_use]
    pub const fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout)
    }

    /// The login endpoint.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/login", self.url)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("insecure", &self.insecure)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("version", &self.version)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}
