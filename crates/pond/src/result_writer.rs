//! Result writer for the query command
//!
//! Routes received `LOG_RECORD` payloads to one of three destinations:
//!
//! - **Line mode** (default): parse and print one access-log line per
//!   record to stdout
//! - **Raw mode** (`--raw`): re-emit the records as framed datagrams on
//!   stdout, suitable for piping into another tool
//! - **Per-site append** (`--per-site-append DIR`): write one line per
//!   record into `DIR/<site>`, with the site name sanitized to
//!   `[A-Za-z0-9_]` and files opened append-only, refusing symlinks
//!
//! A record that fails to parse is reported on stderr and skipped; the
//! stream continues.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use tracing::{debug, error};

use pond_protocol::{Datagram, Frame, ResponseCommand};

use crate::output::Formatter;

/// Longest accepted site name in per-site append mode
const MAX_SITE_NAME: usize = 255;

enum Destination {
    Line(Formatter),
    Raw,
    PerSiteAppend {
        directory: PathBuf,
        last_site: String,
        file: Option<File>,
    },
}

/// Sink for received query results
pub struct ResultWriter {
    destination: Destination,
}

impl ResultWriter {
    /// Pick the destination from the CLI flags
    pub fn new(raw: bool, single_site: bool, per_site_append: Option<PathBuf>) -> Self {
        let destination = match per_site_append {
            Some(directory) => Destination::PerSiteAppend {
                directory,
                last_site: String::new(),
                file: None,
            },
            None if raw => Destination::Raw,
            None => Destination::Line(Formatter::new(!single_site)),
        };

        Self { destination }
    }

    /// Write one received record payload
    pub fn write(&mut self, payload: &Bytes) -> Result<()> {
        match &mut self.destination {
            Destination::Raw => {
                let frame = Frame::response(1, ResponseCommand::LogRecord, payload.clone())
                    .context("record too large for a frame")?;
                let mut buf = BytesMut::with_capacity(frame.encoded_len());
                frame.encode_into(&mut buf);
                std::io::stdout()
                    .write_all(&buf)
                    .context("failed to write to stdout")?;
                Ok(())
            }

            Destination::Line(formatter) => {
                let datagram = match Datagram::parse(payload) {
                    Ok(datagram) => datagram,
                    Err(e) => {
                        error!(error = %e, "failed to parse log record");
                        return Ok(());
                    }
                };
                println!("{}", formatter.format(&datagram));
                Ok(())
            }

            Destination::PerSiteAppend {
                directory,
                last_site,
                file,
            } => {
                let datagram = match Datagram::parse(payload) {
                    Ok(datagram) => datagram,
                    Err(e) => {
                        error!(error = %e, "failed to parse log record");
                        return Ok(());
                    }
                };

                let Some(site) = datagram.site.as_deref() else {
                    // Records without a site have no destination file
                    debug!("dropping record without a site");
                    return Ok(());
                };

                let Some(filename) = sanitize_site_name(site) else {
                    debug!(site, "dropping record with unusable site name");
                    return Ok(());
                };

                let out = match file {
                    Some(open) if *last_site == filename => open,
                    _ => {
                        let path = directory.join(&filename);
                        let opened = open_append(&path)
                            .with_context(|| format!("failed to open {}", path.display()))?;
                        *last_site = filename;
                        file.insert(opened)
                    }
                };

                let line = Formatter::new(false).format(&datagram);
                writeln!(out, "{line}").context("failed to write")?;
                Ok(())
            }
        }
    }
}

/// Replace everything outside `[A-Za-z0-9]` with `_`
///
/// Returns `None` for empty or overlong names.
fn sanitize_site_name(site: &str) -> Option<String> {
    if site.is_empty() || site.len() > MAX_SITE_NAME {
        return None;
    }

    Some(
        site.chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
            .collect(),
    )
}

/// Open a file for appending, never following symlinks
#[cfg(unix)]
fn open_append(path: &std::path::Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

#[cfg(not(unix))]
fn open_append(path: &std::path::Path) -> std::io::Result<File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
#[path = "result_writer_test.rs"]
mod tests;
