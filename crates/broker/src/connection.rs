//! Per-connection query state machine
//!
//! Each connection owns a set of queries keyed by the client-chosen
//! 16-bit frame id. A query is *building* while it accumulates filter
//! settings, *streaming* while history drains into the outbound buffer,
//! and parked as an append listener once a follow-mode stream runs dry.
//!
//! # Backpressure
//!
//! Records are only pulled from the database while the outbound buffer
//! is below the high-water mark; above it, draining pauses until the
//! socket makes write progress. A parked follow query is re-armed after
//! each drain, so new records arriving while the previous batch is still
//! buffered are picked up by a scan, not a notification.
//!
//! # Error policy
//!
//! Per-query failures (wrong-state command, unknown command, malformed
//! injected record, duplicate id) answer with an `ERROR` frame and the
//! connection lives on; I/O failures tear the whole connection down.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use pond_protocol::{Frame, RequestCommand, ResponseCommand};

use crate::config::BrokerConfig;
use crate::database::{AppendSink, Database, ListenerToken};
use crate::error::BrokerError;
use crate::filter::{Filter, StatusFilter};
use crate::record::Record;
use crate::selection::Selection;

/// One append delivery routed back into the owning connection task
struct AppendEvent {
    query_id: u16,
    token: ListenerToken,
    record: Arc<Record>,
}

/// Listener half handed to the database for a parked follow query
struct QuerySink {
    query_id: u16,
    tx: mpsc::UnboundedSender<AppendEvent>,
}

impl AppendSink for QuerySink {
    fn on_append(&self, token: ListenerToken, record: &Arc<Record>) {
        // The receiver may be gone when the connection is shutting down
        let _ = self.tx.send(AppendEvent {
            query_id: self.query_id,
            token,
            record: Arc::clone(record),
        });
    }
}

/// Per-query state
enum QueryState {
    /// Accumulating filter settings until COMMIT
    Building { filter: Filter, follow: bool },
    /// Draining the selection; `linked` is set while the query is parked
    /// as an append listener (follow mode, stream exhausted)
    Streaming {
        selection: Selection,
        follow: bool,
        linked: Option<ListenerToken>,
    },
}

/// A client connection with its in-flight queries
pub(crate) struct Connection {
    database: Arc<Database>,
    config: BrokerConfig,
    peer: SocketAddr,
    queries: HashMap<u16, QueryState>,
    append_tx: mpsc::UnboundedSender<AppendEvent>,
    append_rx: mpsc::UnboundedReceiver<AppendEvent>,
    in_buf: BytesMut,
    out: BytesMut,
}

enum Event {
    Read(usize),
    Wrote,
    Append(AppendEvent),
    Heartbeat,
}

impl Connection {
    pub(crate) fn new(database: Arc<Database>, config: BrokerConfig, peer: SocketAddr) -> Self {
        let read_buffer_size = config.read_buffer_size;
        let (append_tx, append_rx) = mpsc::unbounded_channel();

        Self {
            database,
            config,
            peer,
            queries: HashMap::new(),
            append_tx,
            append_rx,
            in_buf: BytesMut::with_capacity(read_buffer_size),
            out: BytesMut::new(),
        }
    }

    /// Serve the connection until EOF, error or cancellation by drop
    pub(crate) async fn run<S>(mut self, stream: S) -> Result<(), BrokerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.serve(stream).await;
        self.cleanup();
        result
    }

    async fn serve<S>(&mut self, stream: S) -> Result<(), BrokerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        let heartbeat_enabled = self.config.heartbeat_interval_secs > 0;
        let mut heartbeat = tokio::time::interval(Duration::from_secs(
            self.config.heartbeat_interval_secs.max(1),
        ));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; swallow it
        heartbeat.tick().await;

        loop {
            self.pump()?;

            let can_write = self.out.has_remaining();
            let event = tokio::select! {
                result = reader.read_buf(&mut self.in_buf) => Event::Read(result?),
                result = writer.write_buf(&mut self.out), if can_write => {
                    result?;
                    Event::Wrote
                }
                Some(append) = self.append_rx.recv() => Event::Append(append),
                _ = heartbeat.tick(), if heartbeat_enabled => Event::Heartbeat,
            };

            match event {
                Event::Read(0) => {
                    debug!(peer = %self.peer, "connection closed by peer");
                    // Flush whatever is already queued before going away
                    while self.out.has_remaining() {
                        if writer.write_buf(&mut self.out).await? == 0 {
                            break;
                        }
                    }
                    return Ok(());
                }
                Event::Read(_) => self.process_input()?,
                Event::Wrote => {}
                Event::Append(append) => self.handle_append(append),
                Event::Heartbeat => {
                    if self.out.len() < self.config.high_water {
                        push_frame(&mut self.out, 0, ResponseCommand::Nop, Bytes::new())?;
                    }
                }
            }
        }
    }

    /// Unlink every parked query on the way out
    fn cleanup(&mut self) {
        for state in self.queries.values() {
            if let QueryState::Streaming {
                linked: Some(token),
                ..
            } = state
            {
                self.database.remove_listener(*token);
            }
        }
        self.queries.clear();
    }

    /// Split and handle every complete frame in the read buffer
    fn process_input(&mut self) -> Result<(), BrokerError> {
        while let Some(frame) = Frame::split_from(&mut self.in_buf) {
            self.handle_frame(frame)?;
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<(), BrokerError> {
        let id = frame.id;

        let command = match RequestCommand::try_from(frame.command) {
            Ok(command) => command,
            Err(_) => {
                debug!(peer = %self.peer, id, command = frame.command, "unknown command");
                return self.fail_query(id, "unknown command");
            }
        };

        trace!(peer = %self.peer, id, %command, "frame received");

        match command {
            RequestCommand::Query => self.handle_query(id),
            RequestCommand::Commit => self.handle_commit(id),
            RequestCommand::Cancel => self.handle_cancel(id),
            RequestCommand::Follow => self.handle_follow(id),
            RequestCommand::InjectLogRecord => self.handle_inject(id, frame.payload),
            RequestCommand::FilterSite
            | RequestCommand::FilterHost
            | RequestCommand::FilterUri
            | RequestCommand::FilterStatus
            | RequestCommand::FilterSince
            | RequestCommand::FilterUntil => self.handle_filter(id, command, frame.payload),
        }
    }

    fn handle_query(&mut self, id: u16) -> Result<(), BrokerError> {
        if self.queries.contains_key(&id) {
            // The existing query stays untouched
            return self.answer_error(id, "duplicate id");
        }

        if self.queries.len() >= self.config.max_queries_per_connection {
            return self.answer_error(id, "too many queries");
        }

        self.queries.insert(
            id,
            QueryState::Building {
                filter: Filter::new(),
                follow: false,
            },
        );
        Ok(())
    }

    fn handle_filter(
        &mut self,
        id: u16,
        command: RequestCommand,
        payload: Bytes,
    ) -> Result<(), BrokerError> {
        let Some(QueryState::Building { filter, .. }) = self.queries.get_mut(&id) else {
            return self.fail_query(id, "misplaced filter");
        };

        match command {
            RequestCommand::FilterSite => match utf8_payload(payload) {
                Some(site) => filter.site = Some(site),
                None => return self.fail_query(id, "malformed site filter"),
            },
            RequestCommand::FilterHost => match utf8_payload(payload) {
                Some(host) => filter.host = Some(host),
                None => return self.fail_query(id, "malformed host filter"),
            },
            RequestCommand::FilterUri => match utf8_payload(payload) {
                Some(substring) => filter.uri_substring = Some(substring),
                None => return self.fail_query(id, "malformed URI filter"),
            },
            RequestCommand::FilterStatus => {
                let parsed = std::str::from_utf8(&payload)
                    .ok()
                    .and_then(StatusFilter::parse);
                match parsed {
                    Some(status) => filter.status = Some(status),
                    None => return self.fail_query(id, "malformed status filter"),
                }
            }
            RequestCommand::FilterSince => match timestamp_payload(&payload) {
                Some(since) => filter.since = since,
                None => return self.fail_query(id, "malformed time filter"),
            },
            RequestCommand::FilterUntil => match timestamp_payload(&payload) {
                Some(until) => filter.until = until,
                None => return self.fail_query(id, "malformed time filter"),
            },
            _ => unreachable!("non-filter command routed to handle_filter"),
        }

        Ok(())
    }

    fn handle_follow(&mut self, id: u16) -> Result<(), BrokerError> {
        let Some(QueryState::Building { follow, .. }) = self.queries.get_mut(&id) else {
            return self.fail_query(id, "misplaced FOLLOW");
        };

        *follow = true;
        Ok(())
    }

    fn handle_commit(&mut self, id: u16) -> Result<(), BrokerError> {
        let Some(QueryState::Building { .. }) = self.queries.get(&id) else {
            return self.fail_query(id, "misplaced COMMIT");
        };

        let Some(QueryState::Building { filter, follow }) = self.queries.remove(&id) else {
            unreachable!("checked above");
        };

        let mut selection = Selection::new(Arc::clone(&self.database), filter);
        selection.rewind();

        self.queries.insert(
            id,
            QueryState::Streaming {
                selection,
                follow,
                linked: None,
            },
        );

        // The pump call at the top of the event loop starts the drain
        Ok(())
    }

    fn handle_cancel(&mut self, id: u16) -> Result<(), BrokerError> {
        if let Some(QueryState::Streaming {
            linked: Some(token),
            ..
        }) = self.queries.remove(&id)
        {
            self.database.remove_listener(token);
        }

        push_frame(&mut self.out, id, ResponseCommand::End, Bytes::new())
    }

    fn handle_inject(&mut self, id: u16, payload: Bytes) -> Result<(), BrokerError> {
        match self.database.emplace(payload) {
            Ok(record) => {
                trace!(peer = %self.peer, id = record.id(), "record injected");
                Ok(())
            }
            Err(BrokerError::MalformedRecord(e)) => {
                debug!(peer = %self.peer, error = %e, "malformed record dropped");
                self.answer_error(id, "malformed record")
            }
            Err(e) => Err(e),
        }
    }

    /// Record an append delivery for a parked query
    fn handle_append(&mut self, append: AppendEvent) {
        let Some(QueryState::Streaming {
            selection, linked, ..
        }) = self.queries.get_mut(&append.query_id)
        else {
            return;
        };

        // A superseded registration may still deliver; the scan that
        // replaced it covers the record, so dropping the event keeps
        // delivery at-most-once.
        if *linked != Some(append.token) {
            return;
        }

        // The listener unlinked itself by firing
        *linked = None;

        // On a match the cursor takes the record as its position and the
        // pump drains it; on a mismatch the pump re-registers.
        selection.on_append(&append.record);
    }

    /// Move every unparked streaming query forward
    ///
    /// Fills the outbound buffer up to the high-water mark, emits END for
    /// exhausted non-follow queries and parks exhausted follow queries as
    /// append listeners.
    fn pump(&mut self) -> Result<(), BrokerError> {
        if self.queries.is_empty() {
            return Ok(());
        }

        let ids: Vec<u16> = self.queries.keys().copied().collect();

        for id in ids {
            if self.out.len() >= self.config.high_water {
                break;
            }

            loop {
                let Some(QueryState::Streaming {
                    selection,
                    follow,
                    linked,
                }) = self.queries.get_mut(&id)
                else {
                    break;
                };

                if linked.is_some() {
                    // Parked; the append listener will wake it
                    break;
                }

                // Repair a position that eviction may have invalidated
                // while the query was paused, then pick up records that
                // arrived while it held no position at all.
                selection.fix_deleted();
                selection.resume();

                while self.out.len() < self.config.high_water {
                    let Some(record) = selection.current() else {
                        break;
                    };
                    let raw = record.raw().clone();
                    push_frame(&mut self.out, id, ResponseCommand::LogRecord, raw)?;
                    selection.advance();
                }

                if selection.is_active() {
                    // Backpressure pause; resumed on write progress
                    break;
                }

                if *follow && !selection.is_bounded() {
                    // Park as an append listener, then re-check: a record
                    // appended between the drain above and the
                    // registration would otherwise be missed.
                    let token = self.database.add_listener(Box::new(QuerySink {
                        query_id: id,
                        tx: self.append_tx.clone(),
                    }));
                    *linked = Some(token);

                    selection.fix_deleted();
                    selection.resume();

                    if selection.is_active() {
                        // Raced with an append; prefer the scan. A
                        // delivery the listener already queued is dropped
                        // by the token check in handle_append.
                        self.database.remove_listener(token);
                        *linked = None;
                        continue;
                    }

                    break;
                }

                // Historical query (or bounded follow) finished
                push_frame(&mut self.out, id, ResponseCommand::End, Bytes::new())?;
                self.queries.remove(&id);
                break;
            }
        }

        Ok(())
    }

    /// Queue an ERROR frame, leaving any query under this id untouched
    fn answer_error(&mut self, id: u16, message: &str) -> Result<(), BrokerError> {
        push_frame(
            &mut self.out,
            id,
            ResponseCommand::Error,
            Bytes::copy_from_slice(message.as_bytes()),
        )
    }

    /// Destroy the query under this id and queue an ERROR frame
    fn fail_query(&mut self, id: u16, message: &str) -> Result<(), BrokerError> {
        if let Some(QueryState::Streaming {
            linked: Some(token),
            ..
        }) = self.queries.remove(&id)
        {
            self.database.remove_listener(token);
        }

        self.answer_error(id, message)
    }
}

/// Append one response frame to the outbound buffer
fn push_frame(
    out: &mut BytesMut,
    id: u16,
    command: ResponseCommand,
    payload: Bytes,
) -> Result<(), BrokerError> {
    let size = payload.len();
    let frame =
        Frame::response(id, command, payload).map_err(|_| BrokerError::Oversized(size))?;
    frame.encode_into(out);
    Ok(())
}

fn utf8_payload(payload: Bytes) -> Option<String> {
    String::from_utf8(payload.to_vec()).ok()
}

fn timestamp_payload(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = payload.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
