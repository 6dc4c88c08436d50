//! CSR Daemon - checkpoint governance service
//!
//! The daemon provides:
//! - REST API for programs, checkpoints and the sponsor directory
//! - Outbox worker that delivers checkpoint notifications
//! - Server-sent realtime events per user

use anyhow::Context;
use clap::Parser;
use csr_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CSR Daemon CLI
#[derive(Parser)]
#[command(name = "csrd")]
#[command(about = "CSR Daemon - checkpoint governance service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CSR_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "CSR_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "CSR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CSR_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    println!(
        r#"
  CSR Checkpoints
  Version: {}
  Delivery: {:?}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.delivery.mode,
        config.server.listen_addr
    );

    // Create and run server
    let server = Server::new(config)
        .await
        .context("Failed to start CSR daemon")?;
    server.run().await?;

    Ok(())
}
