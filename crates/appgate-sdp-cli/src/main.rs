//! Appgate SDP provider CLI.
//!
//! This is the entry point for the `appgatesdp` binary: run the plugin host
//! endpoint, import an existing entity, resolve a reference, or dump schemas.

mod commands;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use appgate_sdp_auth::{
    ProviderConfig, ENV_ADDRESS, ENV_INSECURE, ENV_PASSWORD, ENV_PROVIDER, ENV_TIMEOUT,
    ENV_USERNAME, ENV_VERSION,
};
use appgate_sdp_control::ProviderService;
use appgate_sdp_core::EntityKind;
use appgate_sdp_server::{init_tracing, serve, ServerConfig};

/// Appgate SDP provider tooling.
#[derive(Parser, Debug)]
#[command(name = "appgatesdp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true, env = "APPGATE_SDP_DEBUG", default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the plugin host endpoint and print the handshake line.
    Serve {
        /// Listen address; port 0 picks a free port.
        #[arg(long, env = "APPGATE_SDP_LISTEN", default_value = "127.0.0.1:0")]
        listen: String,
    },
    /// Import an existing entity and print its state.
    Import {
        /// Resource type, e.g. `appgatesdp_site`.
        type_name: String,
        /// Entity id.
        id: String,
        #[command(flatten)]
        controller: ControllerArgs,
    },
    /// Resolve an entity by id or exact name.
    Lookup {
        /// Entity kind, e.g. `entitlement`.
        kind: EntityKind,
        /// Entity id.
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,
        /// Exact entity name.
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        controller: ControllerArgs,
    },
    /// Print every resource and data source schema as JSON.
    Schema,
}

/// Controller connection flags.
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Controller admin API URL.
    #[arg(long, env = ENV_ADDRESS)]
    url: String,
    /// Admin username.
    #[arg(long, env = ENV_USERNAME)]
    username: String,
    /// Admin password.
    #[arg(long, env = ENV_PASSWORD, hide_env_values = true)]
    password: String,
    /// Identity provider the admin logs in through.
    #[arg(long, env = ENV_PROVIDER, default_value = "local")]
    provider: String,
    /// Skip TLS certificate verification.
    #[arg(long, env = ENV_INSECURE, default_value = "true", action = clap::ArgAction::Set)]
    insecure: bool,
    /// HTTP timeout in seconds.
    #[arg(long, env = ENV_TIMEOUT, default_value = "20")]
    timeout: u64,
    /// Peer API protocol version; defaults to the newest known.
    #[arg(long = "api-version", env = ENV_VERSION)]
    api_version: Option<u16>,
}

impl ControllerArgs {
    fn provider_config(&self, debug: bool) -> ProviderConfig {
        let mut config = ProviderConfig::new(&self.url).with_credentials(&self.username, &self.password);
        config.provider_name.clone_from(&self.provider);
        config.insecure = self.insecure;
        config.timeout = self.timeout;
        config.version = self.api_version;
        config.debug = debug;
        config
    }

    fn service(&self, debug: bool) -> anyhow::Result<ProviderService> {
        let service = ProviderService::with_defaults();
        service.configure(self.provider_config(debug))?;
        Ok(service)
    }
}

fn print(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Serve { listen } => {
            let config = ServerConfig {
                listen_addr: listen,
                ..ServerConfig::default()
            };
            serve(Arc::new(ProviderService::with_defaults()), config).await?;
        }
        Command::Import {
            type_name,
            id,
            controller,
        } => {
            let service = controller.service(cli.debug)?;
            print(&commands::import(&service, &type_name, &id).await?)?;
        }
        Command::Lookup {
            kind,
            id,
            name,
            controller,
        } => {
            let service = controller.service(cli.debug)?;
            let found = commands::lookup(&service, kind, id.as_deref(), name.as_deref()).await?;
            print(&found)?;
        }
        Command::Schema => {
            print(&commands::schema(&ProviderService::with_defaults())?)?;
        }
    }
    Ok(())
}
