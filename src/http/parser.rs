//! Start-line grammar and the header-block state machine.

use bytes::Bytes;

use crate::error::{HttpError, Result};
use crate::http::body::MessageTraits;
use crate::http::headers::HeaderStore;
use crate::http::signal::{is_terminated, strip_terminator, Protocol, Signal};
use crate::http::version::Version;

/// The first line of a message: a request line or a status line.
pub trait StartLine: Sized {
    /// Parses a line with its terminator already stripped.
    fn parse(line: &[u8]) -> Result<Self>;

    /// Serializes the line, CRLF included.
    fn to_line(&self) -> Bytes;

    fn version(&self) -> Version;

    /// Whether a body follows the header block, given the framing traits.
    fn has_body(&self, traits: &MessageTraits) -> bool;

    /// Interim messages are discarded and the reader starts over.
    fn is_interim(&self) -> bool {
        false
    }
}

/// RFC 7230 `tchar`.
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// True for a non-empty run of `tchar`s.
pub fn is_token(s: &[u8]) -> bool {
    !s.is_empty() && s.iter().copied().all(is_tchar)
}

/// Linear whitespace that starts a continuation line.
fn is_lws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

pub(crate) fn trim_lws(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if !is_lws(*first) {
            break;
        }
        s = rest;
    }
    while let [rest @ .., last] = s {
        if !is_lws(*last) {
            break;
        }
        s = rest;
    }
    s
}

/// Splits `Name: value` into a validated name and a trimmed value.
pub fn parse_header_field(line: &[u8]) -> Result<(String, Bytes)> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| HttpError::headers("missing colon", line))?;
    let name = &line[..colon];
    if !is_token(name) {
        return Err(HttpError::headers("invalid field name", line));
    }
    let value = trim_lws(&line[colon + 1..]);
    Ok((
        String::from_utf8_lossy(name).into_owned(),
        Bytes::copy_from_slice(value),
    ))
}

/// Parses a header block one line at a time.
///
/// Emits `NeedLine` until the empty terminator line arrives, then
/// `Complete`. A line starting with a space or tab continues the previous
/// header: its trimmed content is appended to that value after a single
/// space.
#[derive(Debug)]
pub struct HeaderParser {
    headers: HeaderStore,
    consumed: usize,
    max_bytes: usize,
    done: bool,
}

impl HeaderParser {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            headers: HeaderStore::new(),
            consumed: 0,
            max_bytes,
            done: false,
        }
    }

    /// Starts the byte budget from an amount already spent (e.g. on the
    /// start line).
    pub fn with_consumed(max_bytes: usize, consumed: usize) -> Self {
        Self {
            consumed,
            ..Self::new(max_bytes)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }

    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    pub fn into_headers(self) -> HeaderStore {
        self.headers
    }

    fn take_line(&mut self, line: &[u8]) -> Result<Signal> {
        self.consumed += line.len();
        if self.consumed > self.max_bytes {
            return Err(HttpError::headers("header block too large", line));
        }
        if !is_terminated(line) {
            return Err(HttpError::headers("missing terminator", line));
        }

        let content = strip_terminator(line);
        if content.is_empty() {
            self.done = true;
            return Ok(Signal::Complete);
        }

        if is_lws(content[0]) {
            let name = match self.headers.last() {
                Some((name, _)) => name.to_string(),
                None => return Err(HttpError::headers("continuation without header", line)),
            };
            let (name, previous) = self
                .headers
                .remove_last(&name)
                .ok_or(HttpError::InvalidState("continuation target vanished"))?;
            let more = trim_lws(content);
            let mut value = Vec::with_capacity(previous.len() + 1 + more.len());
            value.extend_from_slice(&previous);
            if !more.is_empty() {
                value.push(b' ');
                value.extend_from_slice(more);
            }
            self.headers.add(name, value);
        } else {
            let (name, value) = parse_header_field(content)?;
            self.headers.add(name, value);
        }
        Ok(Signal::NeedLine)
    }
}

impl Protocol for HeaderParser {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        if self.done {
            return Err(HttpError::InvalidState("header block already complete"));
        }
        match input {
            None => Ok(Signal::NeedLine),
            Some(Signal::HaveLine(line)) => self.take_line(&line),
            Some(_) => Err(HttpError::InvalidState("header parser expects lines")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::headers::IterMode;

    fn feed(parser: &mut HeaderParser, lines: &[&[u8]]) -> Result<Signal> {
        let mut out = parser.step(None)?;
        for line in lines {
            out = parser.step(Some(Signal::HaveLine(Bytes::copy_from_slice(line))))?;
        }
        Ok(out)
    }

    #[test]
    fn parses_block() {
        let mut p = HeaderParser::new(1024);
        let out = feed(&mut p, &[b"Host: example.com\r\n", b"Accept:*/*\n", b"\r\n"]).unwrap();
        assert_eq!(out, Signal::Complete);
        let h = p.into_headers();
        assert_eq!(h.get("host").unwrap(), b"example.com");
        assert_eq!(h.get("accept").unwrap(), b"*/*");
    }

    #[test]
    fn folds_continuation_lines() {
        let mut p = HeaderParser::new(1024);
        feed(&mut p, &[b"X-Foo: bar\r\n", b"  baz\r\n", b"\tqux \r\n", b"\r\n"]).unwrap();
        assert_eq!(p.headers().get("x-foo").unwrap(), b"bar baz qux");
    }

    #[test]
    fn continuation_keeps_position() {
        let mut p = HeaderParser::new(1024);
        feed(&mut p, &[b"A: 1\r\n", b"B: 2\r\n", b" 3\r\n", b"\r\n"]).unwrap();
        let order: Vec<_> = p.headers().iter(IterMode::Multi).map(|(n, _)| n.to_string()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn leading_continuation_is_rejected() {
        let mut p = HeaderParser::new(1024);
        let err = feed(&mut p, &[b" orphan\r\n"]).unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaders { .. }));
    }

    #[test]
    fn malformed_names_are_rejected() {
        for line in [&b"Bad Name: x\r\n"[..], b"Bad(Name): x\r\n", b": empty\r\n", b"NoColon\r\n"] {
            let mut p = HeaderParser::new(1024);
            let err = feed(&mut p, &[line]).unwrap_err();
            assert!(matches!(err, HttpError::InvalidHeaders { .. }), "{:?}", line);
        }
    }

    #[test]
    fn oversized_block_is_rejected() {
        let mut p = HeaderParser::new(32);
        let err = feed(
            &mut p,
            &[b"X-One: aaaaaaaaaa\r\n", b"X-Two: bbbbbbbbbb\r\n"],
        )
        .unwrap_err();
        match err {
            HttpError::InvalidHeaders { reason, .. } => assert_eq!(reason, "header block too large"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut p = HeaderParser::new(1024);
        let err = feed(&mut p, &[b"Host: x\r\n", b""]).unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaders { reason: "missing terminator", .. }));

        let mut p = HeaderParser::new(1024);
        let err = feed(&mut p, &[b"Host: x\r\n", b"X-Half: tr"]).unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaders { reason: "missing terminator", .. }));
    }
}
