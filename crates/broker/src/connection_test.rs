//! Tests for the query state machine
//!
//! These drive a `Connection` over an in-memory duplex pipe; the
//! socket-level path is covered by the integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::time::timeout;

use pond_protocol::Datagram;

use super::*;
use crate::database::Database;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn test_config() -> BrokerConfig {
    BrokerConfig {
        heartbeat_interval_secs: 0,
        ..Default::default()
    }
}

/// Spin up a connection task over a duplex pipe
fn start(database: &Arc<Database>, config: BrokerConfig) -> DuplexStream {
    let (client, server) = tokio::io::duplex(1024 * 1024);
    let connection = Connection::new(
        Arc::clone(database),
        config,
        "127.0.0.1:0".parse().expect("addr"),
    );
    tokio::spawn(connection.run(server));
    client
}

async fn send(stream: &mut DuplexStream, id: u16, command: RequestCommand, payload: &[u8]) {
    let frame = Frame::request(id, command, Bytes::copy_from_slice(payload)).expect("frame");
    stream.write_all(&frame.encode()).await.expect("send");
}

async fn recv(stream: &mut DuplexStream, buf: &mut BytesMut) -> Frame {
    timeout(RECV_TIMEOUT, async {
        loop {
            if let Some(frame) = Frame::split_from(buf) {
                return frame;
            }
            let n = stream.read_buf(buf).await.expect("read");
            assert!(n > 0, "connection closed while waiting for a frame");
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

fn assert_response(frame: &Frame, id: u16, command: ResponseCommand) {
    assert_eq!(frame.id, id, "unexpected frame id: {frame:?}");
    assert_eq!(
        frame.command,
        u16::from(command),
        "unexpected command: {frame:?}"
    );
}

fn site_datagram(site: &str) -> Bytes {
    Datagram::new().with_site(site).encode()
}

// ============================================================================
// Query lifecycle
// ============================================================================

#[tokio::test]
async fn test_duplicate_id_rejected_first_query_unaffected() {
    let db = Arc::new(Database::new(16));
    db.emplace(site_datagram("a")).expect("emplace");

    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 5, RequestCommand::Query, b"").await;
    send(&mut client, 5, RequestCommand::Query, b"").await;

    let error = recv(&mut client, &mut buf).await;
    assert_response(&error, 5, ResponseCommand::Error);
    assert_eq!(&error.payload[..], b"duplicate id");

    // The first query is still in building state and can commit
    send(&mut client, 5, RequestCommand::FilterSite, b"a").await;
    send(&mut client, 5, RequestCommand::Commit, b"").await;

    let record = recv(&mut client, &mut buf).await;
    assert_response(&record, 5, ResponseCommand::LogRecord);
    assert_response(&recv(&mut client, &mut buf).await, 5, ResponseCommand::End);
}

#[tokio::test]
async fn test_commit_without_query_is_rejected() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 9, RequestCommand::Commit, b"").await;
    assert_response(&recv(&mut client, &mut buf).await, 9, ResponseCommand::Error);
}

#[tokio::test]
async fn test_filter_after_commit_destroys_query() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 1, RequestCommand::Query, b"").await;
    send(&mut client, 1, RequestCommand::Commit, b"").await;
    // Empty database: the stream ends immediately
    assert_response(&recv(&mut client, &mut buf).await, 1, ResponseCommand::End);

    send(&mut client, 1, RequestCommand::FilterSite, b"a").await;
    assert_response(&recv(&mut client, &mut buf).await, 1, ResponseCommand::Error);
}

#[tokio::test]
async fn test_unknown_command_answers_error() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    let frame = Frame::new(3, 999, Bytes::new()).expect("frame");
    client.write_all(&frame.encode()).await.expect("send");

    let error = recv(&mut client, &mut buf).await;
    assert_response(&error, 3, ResponseCommand::Error);
    assert_eq!(&error.payload[..], b"unknown command");
}

#[tokio::test]
async fn test_unknown_command_destroys_active_query() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    // Park a follow query under id 4
    send(&mut client, 4, RequestCommand::Query, b"").await;
    send(&mut client, 4, RequestCommand::Follow, b"").await;
    send(&mut client, 4, RequestCommand::Commit, b"").await;

    let frame = Frame::new(4, 999, Bytes::new()).expect("frame");
    client.write_all(&frame.encode()).await.expect("send");

    let error = recv(&mut client, &mut buf).await;
    assert_response(&error, 4, ResponseCommand::Error);
    assert_eq!(&error.payload[..], b"unknown command");

    // The query is gone: its listener is unlinked and the id is fresh
    // again instead of a duplicate
    assert_eq!(db.listener_count(), 0);
    send(&mut client, 4, RequestCommand::Query, b"").await;
    send(&mut client, 4, RequestCommand::Commit, b"").await;
    assert_response(&recv(&mut client, &mut buf).await, 4, ResponseCommand::End);
}

#[tokio::test]
async fn test_cancel_answers_end_and_unlinks() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 3, RequestCommand::Query, b"").await;
    send(&mut client, 3, RequestCommand::Follow, b"").await;
    send(&mut client, 3, RequestCommand::Commit, b"").await;
    send(&mut client, 3, RequestCommand::Cancel, b"").await;

    assert_response(&recv(&mut client, &mut buf).await, 3, ResponseCommand::End);
    assert_eq!(db.listener_count(), 0);
}

// ============================================================================
// Injection
// ============================================================================

#[tokio::test]
async fn test_malformed_inject_answers_error_connection_survives() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 8, RequestCommand::InjectLogRecord, b"\xff\xff").await;

    let error = recv(&mut client, &mut buf).await;
    assert_response(&error, 8, ResponseCommand::Error);
    assert_eq!(&error.payload[..], b"malformed record");
    assert_eq!(db.stats().record_count, 0);

    // The connection is still usable
    send(&mut client, 2, RequestCommand::Query, b"").await;
    send(&mut client, 2, RequestCommand::Commit, b"").await;
    assert_response(&recv(&mut client, &mut buf).await, 2, ResponseCommand::End);
}

#[tokio::test]
async fn test_inject_appends_without_response() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(
        &mut client,
        1,
        RequestCommand::InjectLogRecord,
        &site_datagram("a"),
    )
    .await;
    // No response for a successful injection; a query observes the record
    send(&mut client, 2, RequestCommand::Query, b"").await;
    send(&mut client, 2, RequestCommand::Commit, b"").await;

    let record = recv(&mut client, &mut buf).await;
    assert_response(&record, 2, ResponseCommand::LogRecord);
    assert_eq!(&record.payload[..], &site_datagram("a")[..]);
    assert_response(&recv(&mut client, &mut buf).await, 2, ResponseCommand::End);
}

// ============================================================================
// Follow mode
// ============================================================================

#[tokio::test]
async fn test_follow_delivers_matching_appends_only() {
    let db = Arc::new(Database::new(16));
    db.emplace(site_datagram("x")).expect("emplace");

    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 7, RequestCommand::Query, b"").await;
    send(&mut client, 7, RequestCommand::FilterSite, b"x").await;
    send(&mut client, 7, RequestCommand::Follow, b"").await;
    send(&mut client, 7, RequestCommand::Commit, b"").await;

    // History first
    let first = recv(&mut client, &mut buf).await;
    assert_response(&first, 7, ResponseCommand::LogRecord);

    // A mismatching append is not delivered, the next match is
    send(
        &mut client,
        0,
        RequestCommand::InjectLogRecord,
        &site_datagram("y"),
    )
    .await;
    send(
        &mut client,
        0,
        RequestCommand::InjectLogRecord,
        &site_datagram("x"),
    )
    .await;

    let live = recv(&mut client, &mut buf).await;
    assert_response(&live, 7, ResponseCommand::LogRecord);
    assert_eq!(&live.payload[..], &site_datagram("x")[..]);

    send(&mut client, 7, RequestCommand::Cancel, b"").await;
    assert_response(&recv(&mut client, &mut buf).await, 7, ResponseCommand::End);
}

#[tokio::test]
async fn test_follow_on_empty_database_delivers_first_append() {
    let db = Arc::new(Database::new(16));
    let mut client = start(&db, test_config());
    let mut buf = BytesMut::new();

    send(&mut client, 1, RequestCommand::Query, b"").await;
    send(&mut client, 1, RequestCommand::Follow, b"").await;
    send(&mut client, 1, RequestCommand::Commit, b"").await;

    send(
        &mut client,
        0,
        RequestCommand::InjectLogRecord,
        &site_datagram("x"),
    )
    .await;

    let live = recv(&mut client, &mut buf).await;
    assert_response(&live, 1, ResponseCommand::LogRecord);
    assert_eq!(&live.payload[..], &site_datagram("x")[..]);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_sends_nop() {
    let db = Arc::new(Database::new(16));
    let config = BrokerConfig {
        heartbeat_interval_secs: 1,
        ..Default::default()
    };
    let mut client = start(&db, config);
    let mut buf = BytesMut::new();

    let nop = timeout(Duration::from_secs(5), recv(&mut client, &mut buf))
        .await
        .expect("no heartbeat arrived");
    assert_response(&nop, 0, ResponseCommand::Nop);
}
