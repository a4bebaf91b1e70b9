use bytes::Bytes;
use nbhttp::config::Limits;
use nbhttp::error::HttpError;
use nbhttp::http::headers::{HeaderStore, IterMode};
use nbhttp::http::parser::{HeaderParser, StartLine};
use nbhttp::http::request::{Method, RequestLine};
use nbhttp::http::response::{StatusCode, StatusLine};
use nbhttp::http::signal::{Protocol, Signal};
use nbhttp::http::version::Version;
use nbhttp::http::writer::serialize_headers;
use nbhttp::io::Driver;

mod common;
use common::MockStream;

/// Splits a serialized block into lines and feeds them to a parser.
fn parse_block(block: &[u8], max: usize) -> Result<HeaderStore, HttpError> {
    let mut parser = HeaderParser::new(max);
    let mut out = parser.step(None)?;
    for line in block.split_inclusive(|&b| b == b'\n') {
        out = parser.step(Some(Signal::HaveLine(Bytes::copy_from_slice(line))))?;
    }
    if out != Signal::Complete {
        // the block ended without its blank line
        parser.step(Some(Signal::HaveLine(Bytes::new())))?;
    }
    Ok(parser.into_headers())
}

fn strip(line: &Bytes) -> &[u8] {
    &line[..line.len() - 2]
}

#[test]
fn test_request_line_round_trip() {
    let methods = [
        Method::GET,
        Method::POST,
        Method::HEAD,
        Method::OPTIONS,
        Method::Extension("MKCOL".into()),
    ];
    for method in methods {
        for target in ["/", "/a/b?c=d&e", "*", "http://example.com/x"] {
            for version in [Version::HTTP_10, Version::HTTP_11] {
                let line = RequestLine {
                    method: method.clone(),
                    target: target.to_string(),
                    version,
                };
                let wire = line.to_line();
                assert_eq!(RequestLine::parse(strip(&wire)).unwrap(), line);
            }
        }
    }
}

#[test]
fn test_status_line_round_trip() {
    for code in [100u16, 200, 204, 301, 404, 418, 503, 599] {
        let status = StatusCode::from_u16(code).unwrap();
        let line = StatusLine {
            version: Version::HTTP_11,
            status,
            reason: status.reason_phrase().unwrap_or("Whatever").to_string(),
        };
        let wire = line.to_line();
        assert_eq!(StatusLine::parse(strip(&wire)).unwrap(), line);
    }
}

#[test]
fn test_version_round_trip() {
    for (major, minor) in [(0, 9), (1, 0), (1, 1), (2, 0)] {
        let v = Version { major, minor };
        assert_eq!(Version::parse(v.to_string().as_bytes()).unwrap(), v);
    }
    assert!(matches!(Version::parse(b"HTTP/1"), Err(HttpError::InvalidVersion(_))));
    assert!(matches!(Version::parse(b"http/1.1"), Err(HttpError::InvalidVersion(_))));
}

#[test]
fn test_header_block_round_trip() {
    let mut h = HeaderStore::new();
    h.add("Host", "example.com");
    h.add("X-Trace", "1");
    h.add("x-trace", "2");
    h.add("Content-Type", "text/plain; charset=utf-8");

    let parsed = parse_block(&serialize_headers(&h), 1024).unwrap();
    let original: Vec<_> = h.iter(IterMode::Multi).collect();
    let reparsed: Vec<_> = parsed.iter(IterMode::Multi).collect();
    assert_eq!(original, reparsed);
}

#[test]
fn test_continuation_line_is_folded() {
    let h = parse_block(b"X-Foo: bar\r\n  baz\r\n\r\n", 1024).unwrap();
    assert_eq!(h.get("X-Foo").unwrap(), b"bar baz");
}

#[test]
fn test_header_block_too_large() {
    let mut block = Vec::new();
    for i in 0..100 {
        block.extend_from_slice(format!("X-Filler-{}: {}\r\n", i, "v".repeat(40)).as_bytes());
    }
    match parse_block(&block, 1024) {
        Err(HttpError::InvalidHeaders { reason, .. }) => assert_eq!(reason, "header block too large"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_overlong_line_without_terminator() {
    let limits = Limits {
        max_line_length: 128,
        ..Limits::default()
    };
    let line = vec![b'x'; 512];
    let mut driver = Driver::new(MockStream::reading(&[line.as_slice()]), limits);
    assert!(matches!(driver.read_line(), Err(HttpError::LineTooLong { limit: 128 })));
}

#[test]
fn test_invalid_field_names() {
    for block in [&b"Bad Name: x\r\n\r\n"[..], b"Bad\x01: x\r\n\r\n", b"Bad\"Name: x\r\n\r\n"] {
        assert!(matches!(
            parse_block(block, 1024),
            Err(HttpError::InvalidHeaders { .. })
        ));
    }
}

#[test]
fn test_status_line_reason_defaults() {
    let line = StatusLine::parse(b"HTTP/1.1 418").unwrap();
    assert_eq!(line.reason, "I'm a teapot");
    let line = StatusLine::parse(b"HTTP/1.1 299").unwrap();
    assert_eq!(line.reason, "");
}
