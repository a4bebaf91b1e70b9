//! Message bodies and the traits that decide their framing.

use std::fmt;
use std::io::Write;

use bytes::Bytes;
use flate2::write::{GzDecoder, ZlibDecoder};

use crate::error::{HttpError, Result};
use crate::http::headers::HeaderStore;
use crate::http::version::Version;

/// Content coding applied to a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Decompression {
    #[default]
    None,
    Gzip,
    Deflate,
}

/// Framing facts derived once from a completed header block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageTraits {
    pub chunked: bool,
    pub content_length: Option<u64>,
    pub connection_close: bool,
    pub decompression: Decompression,
}

impl MessageTraits {
    /// Chunked framing takes precedence over `Content-Length`, which is then
    /// ignored. Repeated or list-valued lengths must all agree.
    pub fn from_headers(headers: &HeaderStore, version: Version) -> Result<Self> {
        let chunked = headers.has_token("Transfer-Encoding", "chunked");

        let mut content_length = None;
        if !chunked {
            for raw in headers.get_all("Content-Length") {
                for part in raw.split(|&b| b == b',') {
                    let n = parse_length(part)
                        .ok_or_else(|| HttpError::headers("invalid content-length", raw))?;
                    match content_length {
                        Some(prev) if prev != n => {
                            return Err(HttpError::headers("conflicting content-length", raw));
                        }
                        _ => content_length = Some(n),
                    }
                }
            }
        }

        let connection_close = headers.has_token("Connection", "close")
            || (version < Version::HTTP_11 && !headers.has_token("Connection", "keep-alive"));

        let decompression = match headers.get_all("Content-Encoding").last() {
            Some(coding) => {
                let coding = coding.rsplit(|&b| b == b',').next().unwrap_or_default();
                let coding = crate::http::parser::trim_lws(coding);
                if coding.eq_ignore_ascii_case(b"gzip") || coding.eq_ignore_ascii_case(b"x-gzip") {
                    Decompression::Gzip
                } else if coding.eq_ignore_ascii_case(b"deflate") {
                    Decompression::Deflate
                } else {
                    Decompression::None
                }
            }
            None => Decompression::None,
        };

        Ok(MessageTraits {
            chunked,
            content_length,
            connection_close,
            decompression,
        })
    }

    /// Traits of an outbound message: framing comes from the body itself,
    /// everything else from the headers. Framing headers are validated even
    /// when a body will replace them.
    pub fn outbound(headers: &HeaderStore, version: Version, body: Option<&Body>) -> Result<Self> {
        let mut traits = MessageTraits::from_headers(headers, version)?;
        match body {
            Some(Body::Chunked(_)) => {
                traits.chunked = true;
                traits.content_length = None;
            }
            Some(Body::Identity(b)) => {
                traits.chunked = false;
                traits.content_length = b.content_length();
            }
            None => {}
        }
        Ok(traits)
    }
}

fn parse_length(raw: &[u8]) -> Option<u64> {
    let digits = crate::http::parser::trim_lws(raw);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Streaming gzip/deflate decoder fed body bytes as they arrive.
pub(crate) enum Decoder {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Decoder {
    pub(crate) fn new(kind: Decompression) -> Option<Self> {
        match kind {
            Decompression::None => None,
            Decompression::Gzip => Some(Decoder::Gzip(GzDecoder::new(Vec::new()))),
            Decompression::Deflate => Some(Decoder::Deflate(ZlibDecoder::new(Vec::new()))),
        }
    }

    fn decode(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let out = match self {
            Decoder::Gzip(d) => {
                d.write_all(input).and_then(|_| d.flush()).map_err(HttpError::Decompression)?;
                d.get_mut()
            }
            Decoder::Deflate(d) => {
                d.write_all(input).and_then(|_| d.flush()).map_err(HttpError::Decompression)?;
                d.get_mut()
            }
        };
        Ok(std::mem::take(out))
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        let out = match self {
            Decoder::Gzip(d) => {
                d.try_finish().map_err(HttpError::Decompression)?;
                d.get_mut()
            }
            Decoder::Deflate(d) => {
                d.try_finish().map_err(HttpError::Decompression)?;
                d.get_mut()
            }
        };
        Ok(std::mem::take(out))
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoder::Gzip(_) => f.write_str("Decoder::Gzip"),
            Decoder::Deflate(_) => f.write_str("Decoder::Deflate"),
        }
    }
}

/// Accumulates decoded content, passing it through the decoder if any.
#[derive(Debug, Default)]
struct Content {
    bytes: Vec<u8>,
    decoder: Option<Decoder>,
    fed: bool,
}

impl Content {
    fn push(&mut self, data: &[u8]) -> Result<()> {
        self.fed |= !data.is_empty();
        match &mut self.decoder {
            Some(decoder) => {
                let out = decoder.decode(data)?;
                self.bytes.extend_from_slice(&out);
            }
            None => self.bytes.extend_from_slice(data),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // an empty body under a content coding decodes to nothing
        if let Some(mut decoder) = self.decoder.take().filter(|_| self.fed) {
            let out = decoder.finish()?;
            self.bytes.extend_from_slice(&out);
        }
        Ok(())
    }
}

/// Body delimited by `Content-Length` or by connection close.
#[derive(Debug)]
pub struct IdentityBody {
    chunks: Vec<Bytes>,
    content_length: Option<u64>,
    bytes_read: u64,
    content: Content,
    complete: bool,
}

impl IdentityBody {
    /// Outbound body with a known length.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        let content = Content {
            bytes: data.to_vec(),
            ..Content::default()
        };
        Self {
            chunks: vec![data],
            content_length: Some(len),
            bytes_read: len,
            content,
            complete: true,
        }
    }

    /// Outbound body whose end is signalled by closing the connection.
    pub fn unbounded(chunks: Vec<Bytes>) -> Self {
        let mut body = Self::new(Bytes::new());
        body.chunks.clear();
        for chunk in chunks {
            body.content.bytes.extend_from_slice(&chunk);
            body.bytes_read += chunk.len() as u64;
            body.chunks.push(chunk);
        }
        body.content_length = None;
        body
    }

    /// Empty inbound body about to be filled by a reader.
    pub(crate) fn inbound(content_length: Option<u64>, decoder: Option<Decoder>) -> Self {
        Self {
            chunks: Vec::new(),
            content_length,
            bytes_read: 0,
            content: Content {
                decoder,
                ..Content::default()
            },
            complete: false,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes still expected; `None` when the body runs until disconnect.
    pub fn remaining(&self) -> Option<u64> {
        self.content_length
            .map(|len| len.saturating_sub(self.bytes_read))
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub(crate) fn push(&mut self, data: Bytes) -> Result<()> {
        self.bytes_read += data.len() as u64;
        self.content.push(&data)?;
        self.chunks.push(data);
        Ok(())
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        self.content.finish()?;
        self.complete = true;
        Ok(())
    }
}

/// Body framed as a sequence of hex-length-prefixed chunks.
#[derive(Debug)]
pub struct ChunkedBody {
    chunks: Vec<Bytes>,
    nominal_length: u64,
    trailers: HeaderStore,
    content: Content,
    complete: bool,
}

impl ChunkedBody {
    /// Outbound body; empty chunks are skipped when written.
    pub fn new(chunks: Vec<Bytes>) -> Self {
        let mut body = Self::inbound(None);
        for chunk in chunks {
            body.nominal_length += chunk.len() as u64;
            body.content.bytes.extend_from_slice(&chunk);
            body.chunks.push(chunk);
        }
        body.complete = true;
        body
    }

    pub(crate) fn inbound(decoder: Option<Decoder>) -> Self {
        Self {
            chunks: Vec::new(),
            nominal_length: 0,
            trailers: HeaderStore::new(),
            content: Content {
                decoder,
                ..Content::default()
            },
            complete: false,
        }
    }

    /// De-chunked chunk payloads, before decompression.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Sum of the chunk sizes on the wire.
    pub fn nominal_length(&self) -> u64 {
        self.nominal_length
    }

    /// Trailer fields that followed the last chunk.
    pub fn trailers(&self) -> &HeaderStore {
        &self.trailers
    }

    pub(crate) fn trailers_mut(&mut self) -> &mut HeaderStore {
        &mut self.trailers
    }

    pub(crate) fn push(&mut self, chunk: Bytes) -> Result<()> {
        self.nominal_length += chunk.len() as u64;
        self.content.push(&chunk)?;
        self.chunks.push(chunk);
        Ok(())
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        self.content.finish()?;
        self.complete = true;
        Ok(())
    }
}

/// A message body.
#[derive(Debug)]
pub enum Body {
    Identity(IdentityBody),
    Chunked(ChunkedBody),
}

impl Body {
    /// Identity body with `Content-Length` framing.
    pub fn identity(data: impl Into<Bytes>) -> Self {
        Body::Identity(IdentityBody::new(data))
    }

    pub fn chunked<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Body::Chunked(ChunkedBody::new(chunks.into_iter().map(Into::into).collect()))
    }

    /// Assembled content, decompressed when a content coding was decoded.
    pub fn content(&self) -> &[u8] {
        match self {
            Body::Identity(b) => &b.content.bytes,
            Body::Chunked(b) => &b.content.bytes,
        }
    }

    /// Raw spans in arrival (or sending) order.
    pub fn chunks(&self) -> &[Bytes] {
        match self {
            Body::Identity(b) => b.chunks(),
            Body::Chunked(b) => b.chunks(),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Body::Chunked(_))
    }

    /// True once the owning reader has signalled completion.
    pub fn is_complete(&self) -> bool {
        match self {
            Body::Identity(b) => b.complete,
            Body::Chunked(b) => b.complete,
        }
    }
}
