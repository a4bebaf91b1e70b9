//! Message reader: start line, header block, then body.

use std::mem;

use tracing::{debug, trace};

use crate::config::Limits;
use crate::error::{HttpError, Result};
use crate::http::body::{Body, Decoder, MessageTraits};
use crate::http::headers::HeaderStore;
use crate::http::parser::{HeaderParser, StartLine};
use crate::http::request::{Method, Request, RequestLine};
use crate::http::response::{Response, StatusLine};
use crate::http::signal::{is_terminated, strip_terminator, Protocol, Signal};
use crate::http::transfer::{BodyReader, ChunkedReader, IdentityReader};

/// Everything a reader produced for one message.
#[derive(Debug)]
pub struct Parts<L> {
    pub line: L,
    pub headers: HeaderStore,
    pub traits: MessageTraits,
    pub body: Option<Body>,
}

enum ReadState<L> {
    Empty,
    ParsingStartLine,
    ParsingHeaders {
        line: L,
        parser: HeaderParser,
    },
    ParsingBody {
        line: L,
        headers: HeaderStore,
        traits: MessageTraits,
        reader: BodyReader,
    },
    Complete,
    Failed,
}

/// Reads one message of kind `L` through the [`Protocol`] signals.
pub struct MessageReader<L: StartLine> {
    state: ReadState<L>,
    limits: Limits,
    decompress: bool,
    head_request: bool,
    consumed: usize,
    parts: Option<Parts<L>>,
}

impl<L: StartLine> MessageReader<L> {
    pub fn new(limits: Limits, decompress: bool) -> Self {
        Self {
            state: ReadState::Empty,
            limits,
            decompress,
            head_request: false,
            consumed: 0,
            parts: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, ReadState::Complete)
    }

    /// The finished message, once; `None` before completion.
    pub fn take_parts(&mut self) -> Option<Parts<L>> {
        self.parts.take()
    }

    fn start_line(&mut self, raw: &[u8]) -> Result<(ReadState<L>, Signal)> {
        self.consumed += raw.len();
        if self.consumed > self.limits.max_header_bytes {
            return Err(HttpError::headers("header block too large", raw));
        }
        if !is_terminated(raw) {
            return Err(HttpError::EndOfStream);
        }
        let content = strip_terminator(raw);
        if content.is_empty() {
            // stray CRLF between messages
            return Ok((ReadState::ParsingStartLine, Signal::NeedLine));
        }
        let line = L::parse(content)?;
        let parser = HeaderParser::with_consumed(self.limits.max_header_bytes, self.consumed);
        Ok((ReadState::ParsingHeaders { line, parser }, Signal::NeedLine))
    }

    fn headers_done(&mut self, line: L, headers: HeaderStore) -> Result<(ReadState<L>, Signal)> {
        let traits = MessageTraits::from_headers(&headers, line.version())?;
        trace!(
            headers = headers.len(),
            chunked = traits.chunked,
            content_length = ?traits.content_length,
            "header block complete"
        );

        if line.is_interim() {
            debug!("discarding interim response");
            self.consumed = 0;
            return Ok((ReadState::ParsingStartLine, Signal::NeedLine));
        }

        if self.head_request || !line.has_body(&traits) {
            return Ok(self.complete(line, headers, traits, None));
        }

        let decoder = if self.decompress {
            Decoder::new(traits.decompression)
        } else {
            None
        };
        let mut reader = if traits.chunked {
            BodyReader::Chunked(ChunkedReader::new(decoder, &self.limits))
        } else {
            BodyReader::Identity(IdentityReader::new(traits.content_length, decoder, &self.limits))
        };
        match reader.step(None)? {
            Signal::Complete => Ok(self.complete(line, headers, traits, Some(reader.into_body()))),
            demand => Ok((
                ReadState::ParsingBody {
                    line,
                    headers,
                    traits,
                    reader,
                },
                demand,
            )),
        }
    }

    fn complete(
        &mut self,
        line: L,
        headers: HeaderStore,
        traits: MessageTraits,
        body: Option<Body>,
    ) -> (ReadState<L>, Signal) {
        self.parts = Some(Parts {
            line,
            headers,
            traits,
            body,
        });
        (ReadState::Complete, Signal::Complete)
    }

    fn advance(&mut self, state: ReadState<L>, input: Option<Signal>) -> Result<(ReadState<L>, Signal)> {
        match (state, input) {
            (ReadState::Empty, None) => Ok((ReadState::ParsingStartLine, Signal::NeedLine)),
            (ReadState::ParsingStartLine, Some(Signal::HaveLine(raw))) => self.start_line(&raw),
            (ReadState::ParsingHeaders { line, mut parser }, Some(input)) => match parser.step(Some(input))? {
                Signal::Complete => self.headers_done(line, parser.into_headers()),
                demand => Ok((ReadState::ParsingHeaders { line, parser }, demand)),
            },
            (
                ReadState::ParsingBody {
                    line,
                    headers,
                    traits,
                    mut reader,
                },
                input,
            ) => match reader.step(input)? {
                Signal::Complete => Ok(self.complete(line, headers, traits, Some(reader.into_body()))),
                demand => Ok((
                    ReadState::ParsingBody {
                        line,
                        headers,
                        traits,
                        reader,
                    },
                    demand,
                )),
            },
            (ReadState::Complete, _) => Err(HttpError::InvalidState("message already complete")),
            (ReadState::Failed, _) => Err(HttpError::InvalidState("reader failed earlier")),
            _ => Err(HttpError::InvalidState("unexpected signal for message reader")),
        }
    }
}

impl<L: StartLine> Protocol for MessageReader<L> {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        // a failed transition leaves the reader in Failed
        let state = mem::replace(&mut self.state, ReadState::Failed);
        let (next, out) = self.advance(state, input)?;
        self.state = next;
        Ok(out)
    }
}

impl MessageReader<RequestLine> {
    pub fn request(limits: Limits, decompress: bool) -> Self {
        Self::new(limits, decompress)
    }

    pub fn take_request(&mut self) -> Option<Request> {
        self.take_parts()
            .map(|p| Request::from_parts(p.line, p.headers, p.traits, p.body))
    }
}

impl MessageReader<StatusLine> {
    /// A reader for the response to a `method` request; responses to HEAD
    /// never carry a body whatever their headers say.
    pub fn response(limits: Limits, decompress: bool, method: &Method) -> Self {
        Self {
            head_request: *method == Method::HEAD,
            ..Self::new(limits, decompress)
        }
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.take_parts()
            .map(|p| Response::from_parts(p.line, p.headers, p.traits, p.body))
    }
}

impl<L: StartLine> std::fmt::Debug for MessageReader<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ReadState::Empty => "Empty",
            ReadState::ParsingStartLine => "ParsingStartLine",
            ReadState::ParsingHeaders { .. } => "ParsingHeaders",
            ReadState::ParsingBody { .. } => "ParsingBody",
            ReadState::Complete => "Complete",
            ReadState::Failed => "Failed",
        };
        f.debug_struct("MessageReader")
            .field("state", &state)
            .field("consumed", &self.consumed)
            .finish()
    }
}
