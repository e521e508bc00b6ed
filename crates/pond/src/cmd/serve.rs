//! Serve command - run the broker in daemon mode

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pond_broker::{Database, PondServer};

use crate::config::Config;

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bind address (overrides config file)
    #[arg(long, value_name = "ADDRESS")]
    pub address: Option<String>,

    /// Listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Maximum records kept in memory (overrides config file)
    #[arg(long, value_name = "N")]
    pub capacity: Option<usize>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let mut broker_config = config.broker_config();
    if let Some(address) = args.address {
        broker_config.address = address;
    }
    if let Some(port) = args.port {
        broker_config.port = port;
    }
    if let Some(capacity) = args.capacity {
        broker_config.capacity = capacity;
    }

    let database = Arc::new(Database::new(broker_config.capacity));
    let server = PondServer::bind(broker_config, Arc::clone(&database))
        .await
        .context("failed to bind listen socket")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    server.run(cancel).await?;

    let stats = database.stats();
    info!(
        appended = stats.appended_total,
        evicted = stats.evicted_total,
        "shut down"
    );

    Ok(())
}
