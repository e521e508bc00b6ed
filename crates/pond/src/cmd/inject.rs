//! Inject command - send test records to a running broker
//!
//! Builds access-log datagrams and pushes them over the wire, useful for
//! verifying a broker end to end:
//!
//! ```bash
//! pond inject localhost --site blog --uri /test --count 100
//! ```

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use tracing::info;

use pond_protocol::{Datagram, Method, RequestCommand};

use crate::client::PondClient;

/// Inject command arguments
#[derive(Args, Debug)]
pub struct InjectArgs {
    /// Broker to connect to, SERVER[:PORT]
    #[arg(value_name = "SERVER[:PORT]")]
    pub server: String,

    /// Site name of the generated records
    #[arg(long, default_value = "test")]
    pub site: String,

    /// Host name of the generated records
    #[arg(long)]
    pub host: Option<String>,

    /// Request URI of the generated records
    #[arg(long, default_value = "/")]
    pub uri: String,

    /// HTTP status of the generated records
    #[arg(long, default_value_t = 200)]
    pub status: u16,

    /// Free-form message instead of an HTTP access record
    #[arg(long, conflicts_with_all = ["host", "uri"])]
    pub message: Option<String>,

    /// Number of records to send
    #[arg(long, default_value_t = 1)]
    pub count: u32,

    /// Pause between records in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub interval: u64,
}

/// Run the inject command
pub async fn run(args: InjectArgs) -> Result<()> {
    if args.count == 0 {
        bail!("nothing to send");
    }

    let mut client = PondClient::connect(&args.server).await?;

    for sequence in 0..args.count {
        let timestamp = u64::try_from(Utc::now().timestamp_micros())
            .context("system clock before the epoch")?;

        let mut datagram = Datagram::new()
            .with_timestamp(timestamp)
            .with_site(args.site.clone());

        datagram = match args.message {
            Some(ref message) => datagram.with_message(message.clone()),
            None => {
                let mut access = datagram
                    .with_method(Method::Get)
                    .with_uri(args.uri.clone())
                    .with_status(args.status)
                    .with_length(u64::from(sequence));
                if let Some(ref host) = args.host {
                    access = access.with_host(host.clone());
                }
                access
            }
        };

        client
            .send(0, RequestCommand::InjectLogRecord, &datagram.encode())
            .await?;

        if args.interval > 0 && sequence + 1 < args.count {
            tokio::time::sleep(Duration::from_millis(args.interval)).await;
        }
    }

    info!(count = args.count, site = %args.site, "records sent");
    Ok(())
}
