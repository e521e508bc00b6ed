//! Command taxonomy of the pond protocol
//!
//! Every frame carries a 16-bit command. Clients send `RequestCommand`s,
//! the broker answers with `ResponseCommand`s under the same frame id.
//! The numeric values are part of the wire contract and must not change.

use std::fmt;

use crate::ProtocolError;

/// Client → server commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestCommand {
    /// Begin building a query under a fresh id
    Query = 1,
    /// Freeze the filter set and start streaming
    Commit = 2,
    /// Abort the query in any state
    Cancel = 3,
    /// Restrict to one exact site (payload: UTF-8 site name)
    FilterSite = 4,
    /// Restrict to one exact host (payload: UTF-8 host name)
    FilterHost = 5,
    /// Restrict to URIs containing a substring (payload: UTF-8)
    FilterUri = 6,
    /// Restrict by HTTP status, exact `NNN` or class `Nxx` (payload: ASCII)
    FilterStatus = 7,
    /// Lower time bound (payload: 8-byte big-endian microseconds)
    FilterSince = 8,
    /// Upper time bound (payload: 8-byte big-endian microseconds)
    FilterUntil = 9,
    /// Keep the query open after history is exhausted
    Follow = 10,
    /// Append a raw log datagram to the database (payload: datagram)
    InjectLogRecord = 11,
}

/// Server → client commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCommand {
    /// Heartbeat / nothing to report; clients skip these
    Nop = 0,
    /// Per-query failure (payload: UTF-8 diagnostic)
    Error = 1,
    /// One matching record (payload: raw datagram)
    LogRecord = 2,
    /// The query is finished (payload empty)
    End = 3,
}

impl TryFrom<u16> for RequestCommand {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Query),
            2 => Ok(Self::Commit),
            3 => Ok(Self::Cancel),
            4 => Ok(Self::FilterSite),
            5 => Ok(Self::FilterHost),
            6 => Ok(Self::FilterUri),
            7 => Ok(Self::FilterStatus),
            8 => Ok(Self::FilterSince),
            9 => Ok(Self::FilterUntil),
            10 => Ok(Self::Follow),
            11 => Ok(Self::InjectLogRecord),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl TryFrom<u16> for ResponseCommand {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Nop),
            1 => Ok(Self::Error),
            2 => Ok(Self::LogRecord),
            3 => Ok(Self::End),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl From<RequestCommand> for u16 {
    fn from(command: RequestCommand) -> u16 {
        command as u16
    }
}

impl From<ResponseCommand> for u16 {
    fn from(command: ResponseCommand) -> u16 {
        command as u16
    }
}

impl fmt::Display for RequestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "QUERY",
            Self::Commit => "COMMIT",
            Self::Cancel => "CANCEL",
            Self::FilterSite => "FILTER_SITE",
            Self::FilterHost => "FILTER_HOST",
            Self::FilterUri => "FILTER_URI",
            Self::FilterStatus => "FILTER_STATUS",
            Self::FilterSince => "FILTER_SINCE",
            Self::FilterUntil => "FILTER_UNTIL",
            Self::Follow => "FOLLOW",
            Self::InjectLogRecord => "INJECT_LOG_RECORD",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ResponseCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nop => "NOP",
            Self::Error => "ERROR",
            Self::LogRecord => "LOG_RECORD",
            Self::End => "END",
        };
        f.write_str(name)
    }
}
