//! Access-log datagram codec
//!
//! A log datagram is the opaque payload carried by `INJECT_LOG_RECORD` and
//! `LOG_RECORD` frames. On the wire it is a version byte followed by TLV
//! attributes:
//!
//! ```text
//! ┌─────────┬──────────────────────────────────┐
//! │ 1 byte  │ repeated: tag(1) len(2 BE) value │
//! │ version │                                  │
//! └─────────┴──────────────────────────────────┘
//! ```
//!
//! All attributes are optional. Unknown tags are skipped so newer
//! producers keep working against older brokers; truncated or wrongly
//! sized values reject the whole datagram.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ProtocolError, Result};

/// Current datagram format version
const VERSION: u8 = 1;

/// Attribute tags
const TAG_TIMESTAMP: u8 = 1;
const TAG_SITE: u8 = 2;
const TAG_HOST: u8 = 3;
const TAG_REMOTE_HOST: u8 = 4;
const TAG_METHOD: u8 = 5;
const TAG_URI: u8 = 6;
const TAG_REFERER: u8 = 7;
const TAG_USER_AGENT: u8 = 8;
const TAG_STATUS: u8 = 9;
const TAG_LENGTH: u8 = 10;
const TAG_DURATION: u8 = 11;
const TAG_MESSAGE: u8 = 12;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    Get = 0,
    Head = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
    Options = 5,
    Trace = 6,
    Patch = 7,
    Connect = 8,
}

impl Method {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
        }
    }
}

impl TryFrom<u8> for Method {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Get),
            1 => Ok(Self::Head),
            2 => Ok(Self::Post),
            3 => Ok(Self::Put),
            4 => Ok(Self::Delete),
            5 => Ok(Self::Options),
            6 => Ok(Self::Trace),
            7 => Ok(Self::Patch),
            8 => Ok(Self::Connect),
            other => Err(ProtocolError::malformed(format!(
                "unknown HTTP method: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed view of one access-log datagram
///
/// Every field is optional; producers send whatever they know. Timestamps
/// and durations are microseconds (since the Unix epoch / per request).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Datagram {
    /// Request time, microseconds since the Unix epoch
    pub timestamp: Option<u64>,
    /// Site the request was served for
    pub site: Option<String>,
    /// Host header value
    pub host: Option<String>,
    /// Peer address the request came from
    pub remote_host: Option<String>,
    /// HTTP request method
    pub method: Option<Method>,
    /// Request URI
    pub uri: Option<String>,
    /// Referer header value
    pub referer: Option<String>,
    /// User-Agent header value
    pub user_agent: Option<String>,
    /// HTTP response status
    pub status: Option<u16>,
    /// Response body length in bytes
    pub length: Option<u64>,
    /// Request wallclock duration in microseconds
    pub duration: Option<u64>,
    /// Free-form message for non-HTTP log lines
    pub message: Option<String>,
}

impl Datagram {
    /// Create an empty datagram
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp (microseconds since the Unix epoch)
    pub fn with_timestamp(mut self, usec: u64) -> Self {
        self.timestamp = Some(usec);
        self
    }

    /// Set the site name
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// Set the host name
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the remote host
    pub fn with_remote_host(mut self, remote: impl Into<String>) -> Self {
        self.remote_host = Some(remote.into());
        self
    }

    /// Set the HTTP method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the request URI
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the referer
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the response body length
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the request duration (microseconds)
    pub fn with_duration(mut self, usec: u64) -> Self {
        self.duration = Some(usec);
        self
    }

    /// Set the free-form message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Parse a datagram from its wire form
    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(ProtocolError::malformed("empty datagram"));
        }

        let version = buf.get_u8();
        if version != VERSION {
            return Err(ProtocolError::malformed(format!(
                "unsupported datagram version: {version}"
            )));
        }

        let mut datagram = Self::default();

        while buf.has_remaining() {
            let tag = buf.get_u8();

            if buf.remaining() < 2 {
                return Err(ProtocolError::too_short(2, buf.remaining()));
            }
            let len = buf.get_u16() as usize;

            if buf.remaining() < len {
                return Err(ProtocolError::too_short(len, buf.remaining()));
            }
            let value = &buf[..len];

            match tag {
                TAG_TIMESTAMP => datagram.timestamp = Some(decode_u64(value)?),
                TAG_SITE => datagram.site = Some(decode_string(value)?),
                TAG_HOST => datagram.host = Some(decode_string(value)?),
                TAG_REMOTE_HOST => datagram.remote_host = Some(decode_string(value)?),
                TAG_METHOD => datagram.method = Some(decode_method(value)?),
                TAG_URI => datagram.uri = Some(decode_string(value)?),
                TAG_REFERER => datagram.referer = Some(decode_string(value)?),
                TAG_USER_AGENT => datagram.user_agent = Some(decode_string(value)?),
                TAG_STATUS => datagram.status = Some(decode_u16(value)?),
                TAG_LENGTH => datagram.length = Some(decode_u64(value)?),
                TAG_DURATION => datagram.duration = Some(decode_u64(value)?),
                TAG_MESSAGE => datagram.message = Some(decode_string(value)?),
                // Unknown attribute from a newer producer - skip
                _ => {}
            }

            buf.advance(len);
        }

        Ok(datagram)
    }

    /// Encode the datagram into its wire form
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(VERSION);

        if let Some(usec) = self.timestamp {
            encode_u64(TAG_TIMESTAMP, usec, &mut buf);
        }
        if let Some(ref site) = self.site {
            encode_string(TAG_SITE, site, &mut buf);
        }
        if let Some(ref host) = self.host {
            encode_string(TAG_HOST, host, &mut buf);
        }
        if let Some(ref remote) = self.remote_host {
            encode_string(TAG_REMOTE_HOST, remote, &mut buf);
        }
        if let Some(method) = self.method {
            buf.put_u8(TAG_METHOD);
            buf.put_u16(1);
            buf.put_u8(method as u8);
        }
        if let Some(ref uri) = self.uri {
            encode_string(TAG_URI, uri, &mut buf);
        }
        if let Some(ref referer) = self.referer {
            encode_string(TAG_REFERER, referer, &mut buf);
        }
        if let Some(ref user_agent) = self.user_agent {
            encode_string(TAG_USER_AGENT, user_agent, &mut buf);
        }
        if let Some(status) = self.status {
            buf.put_u8(TAG_STATUS);
            buf.put_u16(2);
            buf.put_u16(status);
        }
        if let Some(length) = self.length {
            encode_u64(TAG_LENGTH, length, &mut buf);
        }
        if let Some(usec) = self.duration {
            encode_u64(TAG_DURATION, usec, &mut buf);
        }
        if let Some(ref message) = self.message {
            encode_string(TAG_MESSAGE, message, &mut buf);
        }

        buf.freeze()
    }
}

// ============================================================================
// Attribute helpers
// ============================================================================

fn encode_string(tag: u8, s: &str, buf: &mut BytesMut) {
    // Attribute values share the 16-bit length field limit; truncation
    // must not split a multi-byte character, or the peer rejects the
    // whole datagram as invalid UTF-8
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }

    let bytes = &s.as_bytes()[..end];
    buf.put_u8(tag);
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

fn encode_u64(tag: u8, value: u64, buf: &mut BytesMut) {
    buf.put_u8(tag);
    buf.put_u16(8);
    buf.put_u64(value);
}

fn decode_string(value: &[u8]) -> Result<String> {
    std::str::from_utf8(value)
        .map(str::to_owned)
        .map_err(|e| ProtocolError::malformed(format!("invalid UTF-8: {e}")))
}

fn decode_u64(value: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| ProtocolError::malformed(format!("expected 8 bytes, got {}", value.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_u16(value: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = value
        .try_into()
        .map_err(|_| ProtocolError::malformed(format!("expected 2 bytes, got {}", value.len())))?;
    Ok(u16::from_be_bytes(bytes))
}

fn decode_method(value: &[u8]) -> Result<Method> {
    if value.len() != 1 {
        return Err(ProtocolError::malformed(format!(
            "expected 1 byte, got {}",
            value.len()
        )));
    }
    Method::try_from(value[0])
}
