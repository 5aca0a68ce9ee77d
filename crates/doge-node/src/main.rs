//! Doge Node - peer discovery for the Dogecoin P2P network.
//!
//! This is the main entry point for the doge-node binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// Dogecoin peer discovery node.
#[derive(Parser, Debug)]
#[command(name = "doge-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "doge-node.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Network to connect to
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Handshake with this peer and mark it manually updated
    #[arg(long)]
    connect: Option<String>,

    /// Clear the peer catalog before starting
    #[arg(long)]
    reset: bool,

    /// Run a single discovery cycle and exit
    #[arg(long)]
    once: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Doge Node v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = NodeConfig::load(&args.config, &args)?;
    if args.write_config {
        config.save(&args.config)?;
        info!("Configuration written to {:?}", args.config);
        return Ok(());
    }

    info!("Network: {}", config.network);
    info!("Data directory: {:?}", config.data_dir);

    let node = Node::new(config)?;

    if args.reset {
        node.reset().await?;
    }

    if let Some(ref address) = args.connect {
        node.connect(address).await?;
        if !args.once {
            node.shutdown();
            return Ok(());
        }
    }

    if args.once {
        node.run_once().await?;
        node.shutdown();
        return Ok(());
    }

    // Run until shutdown
    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!("Node error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    node.shutdown();
    info!("Doge node stopped");

    Ok(())
}
