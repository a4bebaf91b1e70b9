use std::task::Poll;

use bytes::Bytes;
use nbhttp::config::Limits;
use nbhttp::error::HttpError;
use nbhttp::http::body::{Body, IdentityBody};
use nbhttp::http::request::{Method, RequestBuilder};
use nbhttp::http::writer::MessageWriter;
use nbhttp::io::{Driver, Pump};
use url::Url;

mod common;
use common::MockStream;

fn upload() -> nbhttp::Request {
    RequestBuilder::new()
        .method(Method::POST)
        .url(Url::parse("http://example.com/upload").unwrap())
        .header("X-Request-Id", "abc123")
        .body(Body::chunked(["first chunk", "second", "third and last"]))
        .build()
        .unwrap()
}

#[test]
fn test_short_write_goes_to_backlog() {
    let mut driver = Driver::new(MockStream::writing(&[4]), Limits::default());
    assert_eq!(driver.write_data(b"hello world").unwrap(), Poll::Ready(11));
    assert_eq!(driver.backlog(), b"o world");
    assert_eq!(driver.transport().written, b"hell");
    assert!(driver.wants_write());
}

#[test]
fn test_blocked_backlog_refuses_new_data() {
    let mut driver = Driver::new(MockStream::writing(&[2, 0]), Limits::default());
    assert_eq!(driver.write_data(b"abcdef").unwrap(), Poll::Ready(6));
    assert_eq!(driver.write_data(b"ghi").unwrap(), Poll::Pending);
    assert_eq!(driver.backlog(), b"cdef");

    // the transport accepts everything from here on
    assert_eq!(driver.write_data(b"ghi").unwrap(), Poll::Ready(3));
    assert!(driver.backlog().is_empty());
    assert_eq!(driver.into_transport().written, b"abcdefghi");
}

#[test]
fn test_would_block_accepts_whole_span_into_backlog() {
    let mut driver = Driver::new(MockStream::writing(&[0]), Limits::default());
    assert_eq!(driver.write_line(b"GET / HTTP/1.1\r\n").unwrap(), Poll::Ready(16));
    assert_eq!(driver.backlog(), b"GET / HTTP/1.1\r\n");
    assert!(driver.transport().written.is_empty());
    assert_eq!(driver.flush().unwrap(), Poll::Ready(()));
    assert_eq!(driver.transport().written, b"GET / HTTP/1.1\r\n");
}

#[test]
fn test_partial_writes_produce_exact_bytes() {
    let request = upload();

    let mut reference = Driver::new(MockStream::writing(&[]), Limits::default());
    assert!(reference.pump(&mut Pump::new(MessageWriter::for_request(&request))).unwrap().is_ready());
    let expected = reference.into_transport().written;

    let caps = [7, 0, 1, 0, 0, 13, 2, 0, 5, 0, 3, 0, 1, 1, 1, 0, 9];
    let mut driver = Driver::new(MockStream::writing(&caps), Limits::default());
    let mut pump = Pump::new(MessageWriter::for_request(&request));
    let mut rounds = 0;
    while driver.pump(&mut pump).unwrap().is_pending() {
        rounds += 1;
        assert!(rounds < 100, "writer made no progress");
    }

    assert!(pump.is_complete());
    assert!(rounds > 0);
    assert_eq!(driver.transport().written, expected);
    assert!(driver.backlog().is_empty());
}

#[test]
fn test_pump_reports_disconnect_for_unsized_body() {
    let request = RequestBuilder::new()
        .method(Method::POST)
        .url(Url::parse("http://example.com/stream").unwrap())
        .body(Body::Identity(IdentityBody::unbounded(vec![Bytes::from_static(b"tail")])))
        .build()
        .unwrap();

    let mut driver = Driver::new(MockStream::writing(&[]), Limits::default());
    assert!(driver.pump(&mut Pump::new(MessageWriter::for_request(&request))).unwrap().is_ready());
    assert!(driver.want_disconnect());
    assert!(driver.transport().written.ends_with(b"\r\n\r\ntail"));
}

#[test]
fn test_read_line_waits_for_terminator() {
    let mut stream = MockStream::reading(&[b"HTTP/1.1 2", b"00 OK\r\nrest"]);
    stream.closed = false;
    let mut driver = Driver::new(stream, Limits::default());

    assert_eq!(driver.read_line().unwrap(), Poll::Ready(Bytes::from_static(b"HTTP/1.1 200 OK\r\n")));
    assert_eq!(driver.read_line().unwrap(), Poll::Pending);
    assert_eq!(driver.read_data(64).unwrap(), Poll::Ready(Bytes::from_static(b"rest")));
    assert_eq!(driver.read_data(64).unwrap(), Poll::Pending);
}

#[test]
fn test_end_of_stream_reads() {
    let mut driver = Driver::new(MockStream::reading(&[b"ab"]), Limits::default());
    assert_eq!(driver.read_peek(4).unwrap(), Poll::Ready(Bytes::from_static(b"ab")));
    assert!(driver.is_eof());
    assert!(driver.has_buffered_input());
    assert_eq!(driver.read_line().unwrap(), Poll::Ready(Bytes::from_static(b"ab")));
    assert_eq!(driver.read_line().unwrap(), Poll::Ready(Bytes::new()));
    assert_eq!(driver.read_data(8).unwrap(), Poll::Ready(Bytes::new()));
}

#[test]
fn test_line_limit_applies_to_terminated_lines() {
    let limits = Limits {
        max_line_length: 8,
        ..Limits::default()
    };
    let mut driver = Driver::new(MockStream::reading(&[b"0123456789\r\n"]), limits);
    assert!(matches!(driver.read_line(), Err(HttpError::LineTooLong { limit: 8 })));
}
