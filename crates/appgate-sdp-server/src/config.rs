//! Server configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding the listen address.
pub const ENV_LISTEN: &str = "APPGATE_SDP_LISTEN";

/// Configuration for the plugin host endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address; port 0 picks a free port.
    #[serde(default = "ServerConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Request timeout in seconds. Must exceed the longest operation deadline.
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Maximum request body size in bytes.
    #[serde(default = "ServerConfig::default_max_body")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    fn default_listen_addr() -> String {
        "127.0.0.1:0".to_string()
    }

    const fn default_request_timeout() -> u64 {
        3600 // 1 hour
    }

    const fn default_max_body() -> usize {
        8 * 1024 * 1024 // 8 MiB
    }

    /// Defaults with the listen address taken from `APPGATE_SDP_LISTEN` if set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var(ENV_LISTEN) {
            if !addr.trim().is_empty() {
                config.listen_addr = addr.trim().to_string();
            }
        }
        config
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            request_timeout_seconds: Self::default_request_timeout(),
            max_body_bytes: Self::default_max_body(),
        }
    }
}
