//! Pond - a broker for HTTP access-log datagrams
//!
//! # Usage
//!
//! ```bash
//! # Run the broker (daemon mode)
//! pond serve
//! pond serve --config /etc/pond/pond.toml
//!
//! # Replay matching history from a running broker
//! pond query localhost site=blog
//!
//! # Live-tail a site
//! pond query localhost --follow site=blog
//!
//! # Send test records to a running broker
//! pond inject localhost --site blog --count 10
//! ```

mod client;
mod cmd;
mod config;
mod output;
mod result_writer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;

/// Broker for HTTP access-log datagrams
#[derive(Parser, Debug)]
#[command(name = "pond")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the broker (daemon mode)
    Serve(cmd::serve::ServeArgs),

    /// Query records from a running broker
    Query(cmd::query::QueryArgs),

    /// Send log records to a running broker
    Inject(cmd::inject::InjectArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let log_level = resolve_log_level(cli.log_level.as_deref(), args.config.as_deref());
            init_logging(&log_level)?;
            cmd::serve::run(args).await
        }
        Command::Query(args) => {
            // Records go to stdout; keep diagnostics quiet by default
            init_logging(cli.log_level.as_deref().unwrap_or("warn"))?;
            cmd::query::run(args).await
        }
        Command::Inject(args) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"))?;
            cmd::inject::run(args).await
        }
    }
}

/// Resolve log level: CLI flag > config file > default "info"
fn resolve_log_level(cli_level: Option<&str>, config_path: Option<&std::path::Path>) -> String {
    if let Some(level) = cli_level {
        return level.to_string();
    }

    if let Some(path) = config_path
        && path.exists()
        && let Ok(config) = Config::from_file(path)
    {
        return config.log.level.as_str().to_string();
    }

    "info".to_string()
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}
