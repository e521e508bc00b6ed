//! Framed client - connects to a running pond broker

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use pond_protocol::{DEFAULT_PORT, Frame, RequestCommand};

/// Client for the pond wire protocol
pub struct PondClient {
    stream: TcpStream,
    read_buf: BytesMut,
    last_id: u16,
}

impl PondClient {
    /// Connect to `SERVER[:PORT]`; the default port is appended when none
    /// is given
    pub async fn connect(server: &str) -> Result<Self> {
        let addr = if server.contains(':') {
            server.to_string()
        } else {
            format!("{server}:{DEFAULT_PORT}")
        };

        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;

        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(64 * 1024),
            last_id: 0,
        })
    }

    /// Allocate the next query id
    pub fn next_id(&mut self) -> u16 {
        self.last_id = self.last_id.wrapping_add(1).max(1);
        self.last_id
    }

    /// Send one request frame
    pub async fn send(&mut self, id: u16, command: RequestCommand, payload: &[u8]) -> Result<()> {
        let frame = Frame::request(id, command, Bytes::copy_from_slice(payload))
            .context("payload too large for a frame")?;

        self.stream
            .write_all(&frame.encode())
            .await
            .with_context(|| format!("failed to send {command}"))?;

        Ok(())
    }

    /// Receive the next frame from the server
    ///
    /// Returns `Ok(None)` if the connection is closed.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = Frame::split_from(&mut self.read_buf) {
                return Ok(Some(frame));
            }

            let n = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .context("failed to read from socket")?;

            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                anyhow::bail!("connection closed mid-frame");
            }
        }
    }
}
