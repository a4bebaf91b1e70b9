//! Message writer: serializes a request or response as a sequence of
//! `HaveLine`/`HaveData` spans.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::{HttpError, Result};
use crate::http::body::Body;
use crate::http::headers::{HeaderStore, IterMode};
use crate::http::parser::StartLine;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::signal::{Protocol, Signal};
use crate::http::transfer::BodyWriter;

fn header_line(name: &str, value: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(name.len() + value.len() + 4);
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value);
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}

/// Serializes a header block, blank terminator line included.
pub fn serialize_headers(headers: &HeaderStore) -> Bytes {
    let mut buf = BytesMut::new();
    for (name, value) in headers.iter(IterMode::Multi) {
        buf.extend_from_slice(&header_line(name, value));
    }
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}

/// Emits one `name: value\r\n` line per entry, then `\r\n`.
#[derive(Debug)]
pub struct HeaderWriter {
    lines: VecDeque<Bytes>,
    done: bool,
}

impl HeaderWriter {
    pub fn new(headers: &HeaderStore) -> Self {
        let mut lines: VecDeque<Bytes> = headers
            .iter(IterMode::Multi)
            .map(|(name, value)| header_line(name, value))
            .collect();
        lines.push_back(Bytes::from_static(b"\r\n"));
        Self { lines, done: false }
    }
}

impl Protocol for HeaderWriter {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        if input.is_some() {
            return Err(HttpError::InvalidState("writers take no input"));
        }
        if self.done {
            return Err(HttpError::InvalidState("header block already written"));
        }
        match self.lines.pop_front() {
            Some(line) => Ok(Signal::HaveLine(line)),
            None => {
                self.done = true;
                Ok(Signal::Complete)
            }
        }
    }
}

#[derive(Debug)]
enum WriteState {
    Empty,
    WritingHeaders(HeaderWriter),
    WritingBody(BodyWriter),
    Complete,
}

/// Writes one message: start line, header block, body.
///
/// Framing headers are rewritten to match the body: a chunked body gets
/// `Transfer-Encoding: chunked`, a sized identity body gets
/// `Content-Length`, and an unsized one gets neither.
#[derive(Debug)]
pub struct MessageWriter {
    line: Bytes,
    headers: HeaderStore,
    body: Option<BodyWriter>,
    state: WriteState,
}

impl MessageWriter {
    pub fn new<L: StartLine>(line: &L, headers: &HeaderStore, body: Option<&Body>) -> Self {
        let mut headers = headers.clone();
        match body {
            Some(Body::Chunked(_)) => {
                headers.remove_all("Content-Length");
                headers.set("Transfer-Encoding", "chunked");
            }
            Some(Body::Identity(b)) => {
                headers.remove_all("Transfer-Encoding");
                match b.content_length() {
                    Some(len) => headers.set("Content-Length", len.to_string()),
                    None => {
                        headers.remove_all("Content-Length");
                    }
                }
            }
            None => {}
        }
        Self {
            line: line.to_line(),
            headers,
            body: body.map(BodyWriter::new),
            state: WriteState::Empty,
        }
    }

    pub fn for_request(request: &Request) -> Self {
        Self::new(&request.request_line(), &request.headers, request.body.as_ref())
    }

    pub fn for_response(response: &Response) -> Self {
        Self::new(&response.status_line(), &response.headers, response.body.as_ref())
    }

    /// The header block as it will be written.
    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, WriteState::Complete)
    }

    fn start_body(&mut self) -> Result<Signal> {
        match self.body.take() {
            Some(mut writer) => match writer.step(None)? {
                Signal::Complete => self.finish(),
                out => {
                    self.state = WriteState::WritingBody(writer);
                    Ok(out)
                }
            },
            None => self.finish(),
        }
    }

    fn finish(&mut self) -> Result<Signal> {
        self.state = WriteState::Complete;
        Ok(Signal::Complete)
    }
}

impl Protocol for MessageWriter {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        if input.is_some() {
            return Err(HttpError::InvalidState("writers take no input"));
        }
        match &mut self.state {
            WriteState::Empty => {
                self.state = WriteState::WritingHeaders(HeaderWriter::new(&self.headers));
                Ok(Signal::HaveLine(self.line.clone()))
            }
            WriteState::WritingHeaders(writer) => match writer.step(None)? {
                Signal::Complete => self.start_body(),
                out => Ok(out),
            },
            WriteState::WritingBody(writer) => match writer.step(None)? {
                Signal::Complete => self.finish(),
                out => Ok(out),
            },
            WriteState::Complete => Err(HttpError::InvalidState("message already written")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Method;
    use crate::http::response::{ResponseBuilder, StatusCode};

    fn drain(writer: &mut MessageWriter) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        let mut disconnect = false;
        loop {
            match writer.step(None).unwrap() {
                Signal::HaveLine(b) | Signal::HaveData(b) => out.extend_from_slice(&b),
                Signal::WantDisconnect => disconnect = true,
                Signal::Complete => return (out, disconnect),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn writes_get_request() {
        let req = Request::new(Method::GET, "http://example.com/x?y=1").unwrap();
        let (out, disconnect) = drain(&mut MessageWriter::for_request(&req));
        assert_eq!(out, b"GET /x?y=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert!(!disconnect);
    }

    #[test]
    fn identity_body_sets_length() {
        let resp = ResponseBuilder::new(StatusCode::OK)
            .header("Transfer-Encoding", "chunked")
            .body(Body::identity("hi"))
            .build()
            .unwrap();
        let (out, _) = drain(&mut MessageWriter::for_response(&resp));
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
    }

    #[test]
    fn chunked_body_replaces_length() {
        let resp = ResponseBuilder::new(StatusCode::OK)
            .header("Content-Length", "99")
            .body(Body::chunked(["Wiki", "pedia"]))
            .build()
            .unwrap();
        let (out, _) = drain(&mut MessageWriter::for_response(&resp));
        assert_eq!(
            out,
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"[..]
        );
    }

    #[test]
    fn serialize_keeps_repeated_headers() {
        let mut h = HeaderStore::new();
        h.add("Set-Cookie", "a=1");
        h.add("Set-Cookie", "b=2");
        assert_eq!(&serialize_headers(&h)[..], b"Set-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n");
    }

    #[test]
    fn completed_writer_rejects_steps() {
        let req = Request::get("http://example.com/").unwrap();
        let mut w = MessageWriter::for_request(&req);
        drain(&mut w);
        assert!(w.is_complete());
        assert!(matches!(w.step(None), Err(HttpError::InvalidState(_))));
    }
}
