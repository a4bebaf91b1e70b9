use std::time::{Duration, Instant};

use nbhttp::config::{ClientConfig, TlsSettings};
use nbhttp::error::HttpError;
use nbhttp::http::body::Body;
use nbhttp::http::request::{Method, Request, RequestBuilder};
use nbhttp::http::response::StatusCode;
use nbhttp::{join, Client, ExchangeState};
use url::Url;

mod common;
use common::{closed_port, find, init_tracing, serve, serve_static, Reply};

const TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> Client {
    Client::new(ClientConfig::default()).unwrap()
}

/// Pulls the request path out of a raw request.
fn path_of(raw: &[u8]) -> String {
    let line = String::from_utf8_lossy(raw);
    line.split_whitespace().nth(1).unwrap_or_default().to_string()
}

#[test]
fn test_simple_get() {
    init_tracing();
    let addr = serve_static(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Fixture: yes\r\n\r\nhello");

    let resp = client()
        .execute(Request::get(&format!("http://{}/", addr)).unwrap(), TIMEOUT)
        .unwrap();
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("x-fixture"), Some("yes"));
    assert_eq!(resp.content(), b"hello");
}

#[test]
fn test_request_reaches_server_intact() {
    init_tracing();
    let addr = serve(|raw| {
        let ok = raw.starts_with(b"GET /check?x=1 HTTP/1.1\r\n")
            && find(raw, b"\r\nUser-Agent: nbhttp/").is_some()
            && find(raw, b"\r\nHost: 127.0.0.1:").is_some();
        let body: &[u8] = if ok { b"yes" } else { b"no!" };
        let mut reply = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n".to_vec();
        reply.extend_from_slice(body);
        Reply::Spans(vec![reply])
    });

    let resp = client()
        .execute(Request::get(&format!("http://{}/check?x=1", addr)).unwrap(), TIMEOUT)
        .unwrap();
    assert_eq!(resp.content(), b"yes");
}

#[test]
fn test_chunked_response_in_pieces() {
    init_tracing();
    let addr = serve(|_| {
        Reply::Spans(vec![
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n".to_vec(),
            b"\r\n4\r\nWiki\r".to_vec(),
            b"\n5\r\npedia\r\n0\r\n".to_vec(),
            b"\r\n".to_vec(),
        ])
    });

    let resp = client()
        .execute(Request::get(&format!("http://{}/wiki", addr)).unwrap(), TIMEOUT)
        .unwrap();
    assert_eq!(resp.content(), b"Wikipedia");
    assert!(resp.body.unwrap().is_chunked());
}

#[test]
fn test_body_delimited_by_close() {
    init_tracing();
    let addr = serve(|_| {
        Reply::Spans(vec![
            b"HTTP/1.0 200 OK\r\n\r\n".to_vec(),
            b"first ".to_vec(),
            b"second".to_vec(),
        ])
    });

    let resp = client()
        .execute(Request::get(&format!("http://{}/", addr)).unwrap(), TIMEOUT)
        .unwrap();
    assert_eq!(resp.content(), b"first second");
}

#[test]
fn test_post_with_body() {
    init_tracing();
    let addr = serve(|raw| {
        let body = find(raw, b"\r\n\r\n").map(|end| raw[end + 4..].to_vec()).unwrap_or_default();
        let mut reply = format!("HTTP/1.1 201 Created\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
        reply.extend_from_slice(&body);
        Reply::Spans(vec![reply])
    });

    let payload = "x".repeat(256 * 1024);
    let request = RequestBuilder::new()
        .method(Method::POST)
        .url(Url::parse(&format!("http://{}/upload", addr)).unwrap())
        .header("Content-Type", "text/plain")
        .body(Body::identity(payload.clone()))
        .build()
        .unwrap();

    let resp = client().execute(request, TIMEOUT).unwrap();
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.content().len(), payload.len());
    assert!(resp.content().iter().all(|&b| b == b'x'));
}

#[test]
fn test_join_many_exchanges() {
    init_tracing();
    let addr = serve(|raw| {
        let path = path_of(raw);
        let reply = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", path.len(), path);
        Reply::Spans(vec![reply.into_bytes()])
    });

    let client = client();
    let exchanges = (0..24)
        .map(|i| {
            let url = format!("http://{}/item/{}", addr, i);
            client.exchange(Request::get(&url).unwrap()).unwrap()
        })
        .collect();

    let done = client.join(exchanges, TIMEOUT).unwrap();
    assert_eq!(done.len(), 24);
    for (i, ex) in done.into_iter().enumerate() {
        assert_eq!(ex.state(), ExchangeState::Complete, "{:?}", ex);
        let resp = ex.into_response().unwrap();
        assert_eq!(resp.content(), format!("/item/{}", i).as_bytes());
    }
}

#[test]
fn test_join_mixes_success_and_failure() {
    init_tracing();
    let good = serve_static(b"HTTP/1.1 204 No Content\r\n\r\n");
    let bad = closed_port();

    let client = client();
    let exchanges = vec![
        client.exchange(Request::get(&format!("http://{}/", good)).unwrap()).unwrap(),
        client.exchange(Request::get(&format!("http://{}/", bad)).unwrap()).unwrap(),
    ];
    let mut done = join(exchanges, TIMEOUT).unwrap().into_iter();

    let ok = done.next().unwrap().into_response().unwrap();
    assert_eq!(ok.status, StatusCode::NO_CONTENT);
    assert!(ok.body.is_none());

    let failed = done.next().unwrap();
    assert!(failed.state() < ExchangeState::Complete);
    assert!(matches!(failed.into_response(), Err(HttpError::UnreachableHost { .. })));
}

#[test]
fn test_connection_refused() {
    init_tracing();
    let url = format!("http://{}/", closed_port());
    let err = client().execute(Request::get(&url).unwrap(), TIMEOUT).unwrap_err();
    assert!(err.is_connectivity());
    assert!(matches!(err, HttpError::UnreachableHost { .. }));
}

#[test]
fn test_unknown_host() {
    init_tracing();
    let err = client()
        .execute(Request::get("http://nonexistent.invalid/").unwrap(), TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, HttpError::UnknownHost(_)));
}

#[test]
fn test_timeout_is_bounded() {
    init_tracing();
    let addr = serve(|_| Reply::Silence);
    let config = ClientConfig {
        poll_interval_ms: 20,
        ..ClientConfig::default()
    };
    let client = Client::new(config).unwrap();

    let timeout = Duration::from_millis(200);
    let exchange = client.exchange(Request::get(&format!("http://{}/", addr)).unwrap()).unwrap();
    let start = Instant::now();
    let mut done = client.join(vec![exchange], timeout).unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(20) + Duration::from_millis(300));
    let ex = done.remove(0);
    assert_eq!(ex.state(), ExchangeState::Receiving);
    assert!(ex.error().is_none());
    assert!(matches!(ex.into_response(), Err(HttpError::Timeout)));
}

#[test]
fn test_truncated_response_fails_exchange() {
    init_tracing();
    let addr = serve_static(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nonly this");

    let err = client()
        .execute(Request::get(&format!("http://{}/", addr)).unwrap(), TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, HttpError::IncompleteBody { expected: 100, received: 9 }));
}

#[test]
fn test_missing_root_certificate_file() {
    let config = ClientConfig {
        tls: TlsSettings {
            extra_root_certs: vec!["/nonexistent/roots.pem".into()],
        },
        ..ClientConfig::default()
    };
    assert!(matches!(Client::new(config), Err(HttpError::Config(_))));
}
