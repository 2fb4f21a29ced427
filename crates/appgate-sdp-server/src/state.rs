//! Server application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use appgate_sdp_control::ProviderService;

use crate::config::ServerConfig;

/// Shared application state for the server.
#[derive(Debug, Clone)]
pub struct ServerState {
    /// The provider every operation is dispatched to.
    pub service: Arc<ProviderService>,
    /// Server configuration.
    pub config: ServerConfig,
    /// Cancelled when the server shuts down; every operation runs under a child token.
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// Create a new server state.
    #[must_use]
    pub fn new(service: Arc<ProviderService>, config: ServerConfig) -> Self {
        Self {
            service,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// A cancellation token for one operation.
    #[must_use]
    pub fn operation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
