//! Error types for the protocol engine.

use std::io;

/// How many bytes of offending input an error keeps for diagnostics.
const SNIPPET_LIMIT: usize = 64;

/// Errors produced while framing, parsing or transporting HTTP messages.
///
/// A transport that would block is *not* an error: it surfaces as
/// [`std::task::Poll::Pending`] from the driver.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The target host could not be resolved.
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// Every resolved address refused or failed the connection.
    #[error("unreachable host {host}: {source}")]
    UnreachableHost {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The exchange did not finish before the deadline.
    #[error("request timed out")]
    Timeout,

    /// Malformed method token in a request line.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// Malformed request target.
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    /// Malformed `HTTP/x.y` token.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Malformed status code in a status line.
    #[error("invalid status code: {0}")]
    InvalidStatusCode(String),

    /// Malformed header block.
    #[error("invalid headers ({reason}): {line}")]
    InvalidHeaders { reason: &'static str, line: String },

    /// Malformed chunked framing.
    #[error("invalid chunk ({reason}): {line}")]
    InvalidChunk { reason: &'static str, line: String },

    /// The connection closed before `Content-Length` bytes arrived.
    #[error("incomplete body: expected {expected} bytes, received {received}")]
    IncompleteBody { expected: u64, received: u64 },

    /// The connection closed in the middle of a message.
    #[error("unexpected end of stream")]
    EndOfStream,

    /// A line grew past the configured bound without a terminator.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// A header lookup without a default found nothing.
    #[error("header not found: {0}")]
    KeyNotFound(String),

    /// The body's content coding could not be decoded.
    #[error("decompression failed: {0}")]
    Decompression(#[source] io::Error),

    /// TLS protocol failure.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// Transport failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// A state machine was handed a signal it never asked for.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl HttpError {
    pub(crate) fn headers(reason: &'static str, raw: &[u8]) -> Self {
        HttpError::InvalidHeaders {
            reason,
            line: snippet(raw),
        }
    }

    pub(crate) fn chunk(reason: &'static str, raw: &[u8]) -> Self {
        HttpError::InvalidChunk {
            reason,
            line: snippet(raw),
        }
    }

    /// Lifts a transport error, unwrapping TLS failures that rustls reports
    /// through `io::Error`.
    pub(crate) fn from_io(e: io::Error) -> Self {
        match e.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
            Some(tls) => HttpError::Tls(tls.clone()),
            None => HttpError::Io(e),
        }
    }

    /// True for connectivity failures (as opposed to framing failures).
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            HttpError::UnknownHost(_) | HttpError::UnreachableHost { .. } | HttpError::Timeout
        )
    }
}

/// Renders raw bytes for an error message, truncated to a fixed bound.
pub(crate) fn snippet(raw: &[u8]) -> String {
    if raw.len() <= SNIPPET_LIMIT {
        String::from_utf8_lossy(raw).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&raw[..SNIPPET_LIMIT]).into_owned();
        s.push('…');
        s
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_long_input() {
        let raw = vec![b'a'; 200];
        let s = snippet(&raw);
        assert_eq!(s.chars().count(), SNIPPET_LIMIT + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn snippet_keeps_short_input() {
        assert_eq!(snippet(b"GET / HTTP/1.1"), "GET / HTTP/1.1");
    }

    #[test]
    fn connectivity_classification() {
        assert!(HttpError::Timeout.is_connectivity());
        assert!(HttpError::UnknownHost("x".into()).is_connectivity());
        assert!(!HttpError::EndOfStream.is_connectivity());
    }
}
