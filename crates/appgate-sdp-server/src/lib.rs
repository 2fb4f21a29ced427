//! Plugin host endpoint for the Appgate SDP provider.
//!
//! The host spawns the provider binary, reads one handshake line from its
//! stdout and then drives every operation over JSON-over-HTTP:
//!
//! ```text
//! APPGATE_SDP_PROVIDER|1|127.0.0.1:50123
//! ```
//!
//! Format: `APPGATE_SDP_PROVIDER|<protocol_version>|<address>`. Logs go to
//! stderr so that stdout carries nothing but the handshake.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Host orchestrator                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ JSON over HTTP
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   appgate-sdp-server                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Router     │ │  Handlers   │ │  Diagnostics ⇄      │   │
//! │  │  + limits   │ │  per op     │ │  HTTP status        │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │  ProviderService    │
//!                   └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use appgate_sdp_control::ProviderService;
//! use appgate_sdp_server::{serve, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(ProviderService::with_defaults());
//! serve(service, ServerConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appgate_sdp_control::ProviderService;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::ServerState;

/// First field of the handshake line.
pub const HANDSHAKE_PREFIX: &str = "APPGATE_SDP_PROVIDER";

/// Version of the host protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// The line announcing `addr` to the host.
#[must_use]
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{HANDSHAKE_PREFIX}|{PROTOCOL_VERSION}|{addr}")
}

/// Install the global subscriber: `RUST_LOG` if set, otherwise `info`, or
/// debug output for the provider crates when `debug` is true. Writes to stderr.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "info,appgate_sdp=debug" } else { "info" };
    // A second initialisation (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Bind, print the handshake line and serve until Ctrl-C.
///
/// In-flight operations are cancelled on shutdown and answer with whatever
/// diagnostics they collected.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(service: Arc<ProviderService>, config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr).await?;
    let addr = listener.local_addr()?;

    let state = ServerState::new(service, config);
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", handshake_line(addr))?;
        stdout.flush()?;
    }
    tracing::info!(addr = %addr, "Provider listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Cannot listen for shutdown signal");
                return;
            }
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_format() {
        let addr: SocketAddr = "127.0.0.1:50123".parse().unwrap();
        assert_eq!(handshake_line(addr), "APPGATE_SDP_PROVIDER|1|127.0.0.1:50123");
    }
}
