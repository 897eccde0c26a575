//! CFD trading simulator server - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Leveraged crypto-CFD trading simulator server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via CFD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any WS connections
    cfd_feed::init_crypto();

    let args = Args::parse();

    cfd_server::init_logging();

    info!("Starting CFD simulator server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("CFD_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = cfd_server::AppConfig::load(&config_path)?;

    let app = cfd_server::Application::new(config)?;
    app.run().await?;

    Ok(())
}
