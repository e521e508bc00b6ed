//! One-line text output for log records
//!
//! Renders a parsed datagram as a single access-log line, close to the
//! common log format:
//!
//! ```text
//! blog 192.0.2.7 [2024-01-15T12:00:00Z] "GET /index.html" 200 5120 "ref" "agent"
//! ```
//!
//! Absent fields print as `-`. Records carrying only a free-form message
//! render as `site [timestamp] message`.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};

use pond_protocol::Datagram;

/// One-line record formatter
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    /// Prefix each line with the site name
    show_site: bool,
}

impl Formatter {
    pub fn new(show_site: bool) -> Self {
        Self { show_site }
    }

    /// Render one record as a single line (no trailing newline)
    pub fn format(&self, datagram: &Datagram) -> String {
        let mut line = String::with_capacity(128);

        if self.show_site {
            line.push_str(datagram.site.as_deref().unwrap_or("-"));
            line.push(' ');
        }

        if let Some(ref message) = datagram.message {
            let _ = write!(line, "[{}] {message}", format_time(datagram.timestamp));
            return line;
        }

        let _ = write!(
            line,
            "{} [{}] \"{} {}\" {} {}",
            datagram.remote_host.as_deref().unwrap_or("-"),
            format_time(datagram.timestamp),
            datagram.method.map_or("-", |m| m.as_str()),
            datagram.uri.as_deref().unwrap_or("-"),
            datagram
                .status
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
            datagram
                .length
                .map_or_else(|| "-".to_string(), |l| l.to_string()),
        );

        if datagram.referer.is_some() || datagram.user_agent.is_some() {
            let _ = write!(
                line,
                " \"{}\" \"{}\"",
                datagram.referer.as_deref().unwrap_or("-"),
                datagram.user_agent.as_deref().unwrap_or("-"),
            );
        }

        line
    }
}

fn format_time(usec: Option<u64>) -> String {
    let Some(usec) = usec else {
        return "-".to_string();
    };

    match DateTime::<Utc>::from_timestamp_micros(usec as i64) {
        Some(time) => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => "-".to_string(),
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod tests;
