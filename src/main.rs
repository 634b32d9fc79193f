use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vhostd::{load_config, Server};

/// Multi-virtual-host HTTP/1.1 server.
#[derive(Debug, Parser)]
#[command(name = "vhostd", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "vhostd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vhostd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %args.config.display(), error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        servers = config.servers.len(),
        max_connections = config.limits.max_connections,
        "configuration loaded"
    );

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    server.run().await;
    ExitCode::SUCCESS
}
