//! Conformance-test agent binary.
//!
//! Connects to a Test Manager socket and drives a messaging transport on
//! its behalf. Configuration comes from CLI flags, `TCA_*` environment
//! variables, and an optional `tca.toml`, in that order of precedence.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tca_agent::manager;
use tca_agent::transport::create_transport;
use tca_core::config::{resolve_config, ConfigOverrides};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "tca-agent", about = "Transport conformance agent", version)]
struct Args {
    /// Path to a TOML config file (default: ./tca.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Test Manager host to connect to
    #[arg(long)]
    manager_host: Option<String>,

    /// Test Manager port to connect to
    #[arg(long)]
    manager_port: Option<u16>,

    /// Transport implementation to drive
    #[arg(long)]
    transport: Option<String>,

    /// Enable debug logging regardless of TCA_LOG
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tca_core::logging::init_with_level(tracing::Level::DEBUG);
    } else {
        tca_core::logging::init();
    }

    let overrides = ConfigOverrides {
        config_path: args.config,
        manager_host: args.manager_host,
        manager_port: args.manager_port,
        transport: args.transport,
    };
    let config = resolve_config(&overrides).context("failed to resolve configuration")?;
    info!(
        "starting agent: manager {}:{}, transport {}",
        config.manager_host, config.manager_port, config.transport
    );

    // An unknown transport is the one unrecoverable startup error.
    let transport = create_transport(&config.transport)
        .with_context(|| format!("failed to create transport {:?}", config.transport))?;

    if let Err(cause) = manager::run(&config, transport).await {
        error!("session ended with error: {cause:#}");
    }

    info!("agent shut down");
    Ok(())
}
