//! GitHub API Mock - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use github_api_mock::{MockApi, MockConfig, MockListener, MockRouter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "github-api-mock",
    about = "Mock GitHub REST API - repository and release endpoints for client tests",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-server.yaml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        MockConfig::default()
    };

    if args.validate {
        // Also compiles the templates
        MockApi::new(config.clone())?;
        println!(
            "Configuration is valid ({} repositories, {} release tiers)",
            config.catalog.repositories.len(),
            config.catalog.releases.len()
        );
        return Ok(());
    }

    let api = Arc::new(MockApi::new(config)?);
    let listener = MockListener::serve(args.listen, MockRouter::new(api)).await?;
    info!(addr = %listener.addr(), "GitHub API mock listening");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let log = listener.shutdown().await;
    info!(
        requests = log.requests,
        failures = log.failures.len(),
        "GitHub API mock stopped"
    );

    Ok(())
}
