//! Tests for the datagram codec

use bytes::{BufMut, BytesMut};

use crate::{Datagram, Method, ProtocolError};

fn sample() -> Datagram {
    Datagram::new()
        .with_timestamp(1_700_000_000_000_000)
        .with_site("example")
        .with_host("www.example.com")
        .with_remote_host("192.0.2.7")
        .with_method(Method::Get)
        .with_uri("/index.html?q=1")
        .with_referer("https://ref.example/")
        .with_user_agent("curl/8.5")
        .with_status(200)
        .with_length(5120)
        .with_duration(1_250)
}

#[test]
fn test_round_trip_full() {
    let datagram = sample();
    let encoded = datagram.encode();
    let decoded = Datagram::parse(&encoded).expect("parse");
    assert_eq!(decoded, datagram);
}

#[test]
fn test_round_trip_sparse() {
    let datagram = Datagram::new().with_site("a");
    let decoded = Datagram::parse(&datagram.encode()).expect("parse");

    assert_eq!(decoded.site.as_deref(), Some("a"));
    assert_eq!(decoded.timestamp, None);
    assert_eq!(decoded.status, None);
}

#[test]
fn test_message_only() {
    let datagram = Datagram::new()
        .with_timestamp(99)
        .with_message("disk full");
    let decoded = Datagram::parse(&datagram.encode()).expect("parse");

    assert_eq!(decoded.message.as_deref(), Some("disk full"));
    assert_eq!(decoded.uri, None);
}

#[test]
fn test_overlong_string_truncates_at_char_boundary() {
    // 65534 ASCII bytes followed by a 3-byte character: a byte-wise cut
    // at 65535 would land inside the character
    let mut site = "a".repeat(65_534);
    site.push('€');
    let datagram = Datagram::new().with_site(site);

    let decoded = Datagram::parse(&datagram.encode()).expect("parse");
    let truncated = decoded.site.expect("site");
    assert_eq!(truncated.len(), 65_534);
    assert!(truncated.bytes().all(|b| b == b'a'));
}

#[test]
fn test_empty_input_rejected() {
    assert!(matches!(
        Datagram::parse(&[]),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_unknown_version_rejected() {
    assert!(matches!(
        Datagram::parse(&[9]),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_unknown_tag_skipped() {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version
    buf.put_u8(250); // unknown tag
    buf.put_u16(3);
    buf.put_slice(b"xyz");
    buf.put_u8(2); // site
    buf.put_u16(4);
    buf.put_slice(b"blog");

    let decoded = Datagram::parse(&buf).expect("parse");
    assert_eq!(decoded.site.as_deref(), Some("blog"));
}

#[test]
fn test_truncated_value_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version
    buf.put_u8(2); // site
    buf.put_u16(10); // announces 10 bytes
    buf.put_slice(b"abc"); // delivers 3

    assert!(matches!(
        Datagram::parse(&buf),
        Err(ProtocolError::TooShort { .. })
    ));
}

#[test]
fn test_truncated_length_field_rejected() {
    let buf = [1u8, 2, 0]; // version, tag, half a length field
    assert!(matches!(
        Datagram::parse(&buf),
        Err(ProtocolError::TooShort { .. })
    ));
}

#[test]
fn test_wrong_timestamp_width_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version
    buf.put_u8(1); // timestamp
    buf.put_u16(4); // must be 8
    buf.put_u32(7);

    assert!(matches!(
        Datagram::parse(&buf),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_invalid_utf8_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version
    buf.put_u8(2); // site
    buf.put_u16(2);
    buf.put_slice(&[0xff, 0xfe]);

    assert!(matches!(
        Datagram::parse(&buf),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_invalid_method_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version
    buf.put_u8(5); // method
    buf.put_u16(1);
    buf.put_u8(200);

    assert!(matches!(
        Datagram::parse(&buf),
        Err(ProtocolError::Malformed(_))
    ));
}
