//! Appgate SDP provider - plugin host endpoint.
//!
//! Spawned by the host orchestrator. Prints the handshake line to stdout and
//! serves JSON operations until interrupted.
//!
//! # Environment
//!
//! - `APPGATE_SDP_LISTEN` - listen address (default `127.0.0.1:0`)
//! - `APPGATE_SDP_DEBUG` - `true` for debug logging of the provider crates
//! - `RUST_LOG` - overrides the log filter entirely

use std::sync::Arc;

use appgate_sdp_control::ProviderService;
use appgate_sdp_server::{init_tracing, serve, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let debug = std::env::var("APPGATE_SDP_DEBUG")
        .is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    init_tracing(debug);

    let config = ServerConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        request_timeout_seconds = config.request_timeout_seconds,
        "Starting Appgate SDP provider"
    );

    let service = Arc::new(ProviderService::with_defaults());
    tracing::info!(
        resources = service.registry().resource_types().count(),
        data_sources = service.registry().data_source_types().count(),
        "Provider initialized"
    );

    serve(service, config).await?;
    Ok(())
}
