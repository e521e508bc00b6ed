//! Query command - replay and follow records from a running broker
//!
//! Filters are given as `KEY=VALUE` arguments, e.g.:
//!
//! ```bash
//! pond query localhost site=blog status=5xx
//! pond query localhost --follow uri=/api/ since=2024-01-15T00:00:00Z
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::Args;
use tracing::info;

use pond_protocol::{RequestCommand, ResponseCommand};

use crate::client::PondClient;
use crate::result_writer::ResultWriter;

/// Query command arguments
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Broker to connect to, SERVER[:PORT]
    #[arg(value_name = "SERVER[:PORT]")]
    pub server: String,

    /// Filters: site=NAME, host=NAME, uri=SUBSTRING, status=NNN|Nxx,
    /// since=RFC3339, until=RFC3339
    #[arg(value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Keep the query open and stream new matching records
    #[arg(long)]
    pub follow: bool,

    /// Emit raw framed datagrams on stdout instead of text lines
    #[arg(long)]
    pub raw: bool,

    /// Omit the site prefix from output lines
    #[arg(long)]
    pub single_site: bool,

    /// Append one line per record to DIR/<site> instead of stdout
    #[arg(long, value_name = "DIR")]
    pub per_site_append: Option<PathBuf>,
}

/// One parsed KEY=VALUE filter argument
enum FilterArg {
    Text(RequestCommand, String),
    Time(RequestCommand, u64),
}

/// Run the query command
pub async fn run(args: QueryArgs) -> Result<()> {
    let filters = args
        .filters
        .iter()
        .map(|raw| parse_filter(raw))
        .collect::<Result<Vec<_>>>()?;

    let mut client = PondClient::connect(&args.server).await?;
    let id = client.next_id();

    client.send(id, RequestCommand::Query, b"").await?;

    for filter in &filters {
        match filter {
            FilterArg::Text(command, value) => {
                client.send(id, *command, value.as_bytes()).await?;
            }
            FilterArg::Time(command, usec) => {
                client.send(id, *command, &usec.to_be_bytes()).await?;
            }
        }
    }

    if args.follow {
        client.send(id, RequestCommand::Follow, b"").await?;
    }

    client.send(id, RequestCommand::Commit, b"").await?;
    info!(server = %args.server, id, "query committed");

    let mut writer = ResultWriter::new(args.raw, args.single_site, args.per_site_append);

    loop {
        let Some(frame) = client.recv().await? else {
            bail!("premature end of stream");
        };

        if frame.id != id {
            continue;
        }

        let command = ResponseCommand::try_from(frame.command)
            .context("unknown response command")?;

        match command {
            ResponseCommand::Nop => {}
            ResponseCommand::End => return Ok(()),
            ResponseCommand::Error => {
                bail!("server error: {}", String::from_utf8_lossy(&frame.payload))
            }
            ResponseCommand::LogRecord => writer.write(&frame.payload)?,
        }
    }
}

/// Parse one KEY=VALUE filter argument
fn parse_filter(raw: &str) -> Result<FilterArg> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("unrecognized query argument: {raw}");
    };

    let filter = match key {
        "site" => FilterArg::Text(RequestCommand::FilterSite, value.to_string()),
        "host" => FilterArg::Text(RequestCommand::FilterHost, value.to_string()),
        "uri" => FilterArg::Text(RequestCommand::FilterUri, value.to_string()),
        "status" => FilterArg::Text(RequestCommand::FilterStatus, value.to_string()),
        "since" => FilterArg::Time(RequestCommand::FilterSince, parse_time(value)?),
        "until" => FilterArg::Time(RequestCommand::FilterUntil, parse_time(value)?),
        _ => bail!("unrecognized filter: {key}"),
    };

    Ok(filter)
}

/// Parse an RFC 3339 timestamp into epoch microseconds
fn parse_time(value: &str) -> Result<u64> {
    let time = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp: {value}"))?;

    u64::try_from(time.timestamp_micros())
        .map_err(|_| anyhow::anyhow!("timestamp before the epoch: {value}"))
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
