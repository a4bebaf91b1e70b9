//! Body framing state machines.
//!
//! Readers turn `Have*` signals into a [`Body`]; writers turn a body into
//! the byte spans that frame it on the wire.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::config::Limits;
use crate::error::{HttpError, Result};
use crate::http::body::{Body, ChunkedBody, Decoder, IdentityBody};
use crate::http::parser::{parse_header_field, trim_lws};
use crate::http::signal::{is_terminated, strip_terminator, Protocol, Signal};

/// Reads a body delimited by `Content-Length` or by end of stream.
#[derive(Debug)]
pub struct IdentityReader {
    body: IdentityBody,
    read_size: usize,
    done: bool,
}

impl IdentityReader {
    pub(crate) fn new(content_length: Option<u64>, decoder: Option<Decoder>, limits: &Limits) -> Self {
        Self {
            body: IdentityBody::inbound(content_length, decoder),
            read_size: limits.read_chunk_size.max(1),
            done: false,
        }
    }

    pub fn body(&self) -> &IdentityBody {
        &self.body
    }

    pub fn into_body(self) -> Body {
        Body::Identity(self.body)
    }

    fn demand(&mut self) -> Result<Signal> {
        match self.body.remaining() {
            Some(0) => self.finish(),
            Some(n) => Ok(Signal::NeedData(n.min(self.read_size as u64) as usize)),
            None => Ok(Signal::NeedData(self.read_size)),
        }
    }

    fn finish(&mut self) -> Result<Signal> {
        self.body.finish()?;
        self.done = true;
        Ok(Signal::Complete)
    }
}

impl Protocol for IdentityReader {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        if self.done {
            return Err(HttpError::InvalidState("identity body already complete"));
        }
        match input {
            None => self.demand(),
            // a zero-length read is end of stream
            Some(Signal::HaveData(data)) if data.is_empty() => match self.body.content_length() {
                None => self.finish(),
                Some(expected) => Err(HttpError::IncompleteBody {
                    expected,
                    received: self.body.bytes_read(),
                }),
            },
            Some(Signal::HaveData(data)) => {
                let data = match self.body.remaining() {
                    Some(n) if (data.len() as u64) > n => data.slice(..n as usize),
                    _ => data,
                };
                self.body.push(data)?;
                self.demand()
            }
            Some(_) => Err(HttpError::InvalidState("identity reader expects data")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    Trailer,
    Consume { remaining: usize },
    Trailers,
    Done,
}

/// Reads a chunked body: size line, data, CRLF, repeated until a zero-size
/// chunk, then optional trailer fields and a blank line.
#[derive(Debug)]
pub struct ChunkedReader {
    body: ChunkedBody,
    state: ChunkState,
    current: BytesMut,
    read_size: usize,
    max_chunk: u64,
    max_trailer_bytes: usize,
    trailer_bytes: usize,
}

impl ChunkedReader {
    pub(crate) fn new(decoder: Option<Decoder>, limits: &Limits) -> Self {
        Self {
            body: ChunkedBody::inbound(decoder),
            state: ChunkState::Size,
            current: BytesMut::new(),
            read_size: limits.read_chunk_size.max(1),
            max_chunk: limits.max_chunk_size,
            max_trailer_bytes: limits.max_header_bytes,
            trailer_bytes: 0,
        }
    }

    pub fn body(&self) -> &ChunkedBody {
        &self.body
    }

    pub fn into_body(self) -> Body {
        Body::Chunked(self.body)
    }

    fn need_data(&self, remaining: u64) -> Signal {
        Signal::NeedData(remaining.min(self.read_size as u64) as usize)
    }

    fn size_line(&mut self, line: &[u8]) -> Result<Signal> {
        if !is_terminated(line) {
            return Err(HttpError::EndOfStream);
        }
        let size = parse_chunk_size(strip_terminator(line), self.max_chunk)?;
        if size == 0 {
            self.state = ChunkState::Trailers;
            return Ok(Signal::NeedLine);
        }
        self.current = BytesMut::with_capacity(size.min(self.read_size as u64) as usize);
        self.state = ChunkState::Data { remaining: size };
        Ok(self.need_data(size))
    }

    fn data(&mut self, data: Bytes, remaining: u64) -> Result<Signal> {
        if data.is_empty() {
            return Err(HttpError::EndOfStream);
        }
        let take = (data.len() as u64).min(remaining) as usize;
        self.current.extend_from_slice(&data[..take]);
        let remaining = remaining - take as u64;
        if remaining > 0 {
            self.state = ChunkState::Data { remaining };
            return Ok(self.need_data(remaining));
        }
        let chunk = self.current.split().freeze();
        self.body.push(chunk)?;
        self.state = ChunkState::Trailer;
        Ok(Signal::NeedPeek(2))
    }

    fn chunk_trailer(&mut self, peek: &[u8]) -> Result<Signal> {
        let len = if peek.starts_with(b"\r\n") {
            2
        } else if peek.starts_with(b"\n") {
            1
        } else if peek.is_empty() || peek == b"\r" {
            return Err(HttpError::EndOfStream);
        } else {
            return Err(HttpError::chunk("missing chunk trailer", peek));
        };
        self.state = ChunkState::Consume { remaining: len };
        Ok(Signal::NeedData(len))
    }

    fn consume(&mut self, data: &[u8], remaining: usize) -> Result<Signal> {
        if data.is_empty() {
            return Err(HttpError::EndOfStream);
        }
        let remaining = remaining.saturating_sub(data.len());
        if remaining > 0 {
            self.state = ChunkState::Consume { remaining };
            return Ok(Signal::NeedData(remaining));
        }
        self.state = ChunkState::Size;
        Ok(Signal::NeedLine)
    }

    fn trailer_line(&mut self, line: &[u8]) -> Result<Signal> {
        self.trailer_bytes += line.len();
        if self.trailer_bytes > self.max_trailer_bytes {
            return Err(HttpError::headers("trailer block too large", line));
        }
        let content = strip_terminator(line);
        // end of stream straight after the zero chunk is tolerated
        if content.is_empty() {
            self.body.finish()?;
            self.state = ChunkState::Done;
            return Ok(Signal::Complete);
        }
        if !is_terminated(line) {
            return Err(HttpError::EndOfStream);
        }
        let (name, value) = parse_header_field(content)?;
        self.body.trailers_mut().add(name, value);
        Ok(Signal::NeedLine)
    }
}

/// Parses `HEX [; extensions]`, bounded by `max`.
fn parse_chunk_size(line: &[u8], max: u64) -> Result<u64> {
    let end = line.iter().position(|&b| b == b';').unwrap_or(line.len());
    let digits = trim_lws(&line[..end]);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(HttpError::chunk("invalid chunk size", line));
    }
    let mut size: u64 = 0;
    for &b in digits {
        let d = (b as char).to_digit(16).unwrap_or_default() as u64;
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(d))
            .ok_or_else(|| HttpError::chunk("chunk size too large", line))?;
    }
    if size > max {
        return Err(HttpError::chunk("chunk size too large", line));
    }
    Ok(size)
}

impl Protocol for ChunkedReader {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        match (self.state, input) {
            (ChunkState::Done, _) => Err(HttpError::InvalidState("chunked body already complete")),
            (ChunkState::Size, None) => Ok(Signal::NeedLine),
            (ChunkState::Size, Some(Signal::HaveLine(line))) => self.size_line(&line),
            (ChunkState::Data { remaining }, Some(Signal::HaveData(data))) => self.data(data, remaining),
            (ChunkState::Trailer, Some(Signal::HavePeek(peek))) => self.chunk_trailer(&peek),
            (ChunkState::Consume { remaining }, Some(Signal::HaveData(data))) => {
                self.consume(&data, remaining)
            }
            (ChunkState::Trailers, Some(Signal::HaveLine(line))) => self.trailer_line(&line),
            _ => Err(HttpError::InvalidState("unexpected signal for chunked reader")),
        }
    }
}

/// Either body reader, chosen from the message traits.
#[derive(Debug)]
pub enum BodyReader {
    Identity(IdentityReader),
    Chunked(ChunkedReader),
}

impl BodyReader {
    pub fn into_body(self) -> Body {
        match self {
            BodyReader::Identity(r) => r.into_body(),
            BodyReader::Chunked(r) => r.into_body(),
        }
    }
}

impl Protocol for BodyReader {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        match self {
            BodyReader::Identity(r) => r.step(input),
            BodyReader::Chunked(r) => r.step(input),
        }
    }
}

/// Emits an identity body's spans in order.
///
/// Without a known length the peer can only find the end of the body by the
/// connection closing, so `WantDisconnect` is emitted before `Complete`.
#[derive(Debug)]
pub struct IdentityWriter {
    chunks: VecDeque<Bytes>,
    disconnect: bool,
    done: bool,
}

impl IdentityWriter {
    pub fn new(body: &IdentityBody) -> Self {
        Self {
            chunks: body.chunks().iter().cloned().collect(),
            disconnect: body.content_length().is_none(),
            done: false,
        }
    }
}

impl Protocol for IdentityWriter {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        if input.is_some() {
            return Err(HttpError::InvalidState("writers take no input"));
        }
        if self.done {
            return Err(HttpError::InvalidState("identity writer already complete"));
        }
        while let Some(chunk) = self.chunks.pop_front() {
            if !chunk.is_empty() {
                return Ok(Signal::HaveData(chunk));
            }
        }
        if self.disconnect {
            self.disconnect = false;
            return Ok(Signal::WantDisconnect);
        }
        self.done = true;
        Ok(Signal::Complete)
    }
}

/// Emits `<hex>\r\n<data>\r\n` per chunk and a final `0\r\n\r\n`.
///
/// A body with no non-empty chunks writes nothing at all.
#[derive(Debug)]
pub struct ChunkedWriter {
    chunks: VecDeque<Bytes>,
    pending: VecDeque<Signal>,
    written: bool,
    terminated: bool,
    done: bool,
}

impl ChunkedWriter {
    pub fn new(body: &ChunkedBody) -> Self {
        Self {
            chunks: body.chunks().iter().cloned().collect(),
            pending: VecDeque::new(),
            written: false,
            terminated: false,
            done: false,
        }
    }
}

impl Protocol for ChunkedWriter {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        if input.is_some() {
            return Err(HttpError::InvalidState("writers take no input"));
        }
        if self.done {
            return Err(HttpError::InvalidState("chunked writer already complete"));
        }
        if let Some(next) = self.pending.pop_front() {
            return Ok(next);
        }
        while let Some(chunk) = self.chunks.pop_front() {
            if chunk.is_empty() {
                continue;
            }
            self.written = true;
            let size = format!("{:x}\r\n", chunk.len());
            self.pending.push_back(Signal::HaveData(chunk));
            self.pending
                .push_back(Signal::HaveLine(Bytes::from_static(b"\r\n")));
            return Ok(Signal::HaveLine(Bytes::from(size)));
        }
        if self.written && !self.terminated {
            self.terminated = true;
            return Ok(Signal::HaveData(Bytes::from_static(b"0\r\n\r\n")));
        }
        self.done = true;
        Ok(Signal::Complete)
    }
}

#[derive(Debug)]
pub enum BodyWriter {
    Identity(IdentityWriter),
    Chunked(ChunkedWriter),
}

impl BodyWriter {
    pub fn new(body: &Body) -> Self {
        match body {
            Body::Identity(b) => BodyWriter::Identity(IdentityWriter::new(b)),
            Body::Chunked(b) => BodyWriter::Chunked(ChunkedWriter::new(b)),
        }
    }
}

impl Protocol for BodyWriter {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        match self {
            BodyWriter::Identity(w) => w.step(input),
            BodyWriter::Chunked(w) => w.step(input),
        }
    }
}
