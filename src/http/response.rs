use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{snippet, HttpError, Result};
use crate::http::body::{Body, MessageTraits};
use crate::http::headers::HeaderStore;
use crate::http::parser::StartLine;
use crate::http::version::Version;

/// A three-digit HTTP status code.
///
/// Any value in `100..=999` is representable; [`StatusCode::reason_phrase`]
/// knows the registered codes and a few common unofficial ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const CONTINUE: StatusCode = StatusCode(100);
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn from_u16(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(StatusCode(code))
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use nbhttp::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.0)
    }

    /// Returns the default reason phrase for this status code, if it has one.
    ///
    /// # Example
    ///
    /// ```
    /// # use nbhttp::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), Some("OK"));
    /// assert_eq!(StatusCode::from_u16(799).unwrap().reason_phrase(), None);
    /// ```
    pub fn reason_phrase(&self) -> Option<&'static str> {
        let reason = match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            102 => "Processing",
            103 => "Early Hints",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            203 => "Non-Authoritative Information",
            204 => "No Content",
            205 => "Reset Content",
            206 => "Partial Content",
            207 => "Multi-Status",
            208 => "Already Reported",
            226 => "IM Used",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            305 => "Use Proxy",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            402 => "Payment Required",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            412 => "Precondition Failed",
            413 => "Request Entity Too Large",
            414 => "Request-URI Too Long",
            415 => "Unsupported Media Type",
            416 => "Requested Range Not Satisfiable",
            417 => "Expectation Failed",
            418 => "I'm a teapot",
            421 => "Misdirected Request",
            422 => "Unprocessable Entity",
            423 => "Locked",
            424 => "Failed Dependency",
            425 => "Too Early",
            426 => "Upgrade Required",
            428 => "Precondition Required",
            429 => "Too Many Requests",
            431 => "Request Header Fields Too Large",
            444 => "No Response",
            449 => "Retry With",
            450 => "Blocked by Windows Parental Controls",
            451 => "Unavailable For Legal Reasons",
            499 => "Client Closed Request",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            506 => "Variant Also Negotiates",
            507 => "Insufficient Storage",
            508 => "Loop Detected",
            509 => "Bandwidth Limit Exceeded",
            510 => "Not Extended",
            511 => "Network Authentication Required",
            _ => return None,
        };
        Some(reason)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `HTTP-version SP status-code [SP reason-phrase]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
}

impl StartLine for StatusLine {
    fn parse(line: &[u8]) -> Result<Self> {
        let mut parts = line.splitn(3, |&b| b == b' ');
        let version = Version::parse(parts.next().unwrap_or_default())?;
        let code = parts.next().unwrap_or_default();
        let status = parse_status_code(code)
            .ok_or_else(|| HttpError::InvalidStatusCode(snippet(line)))?;
        let reason = match parts.next() {
            Some(reason) if !reason.is_empty() => String::from_utf8_lossy(reason).into_owned(),
            _ => status.reason_phrase().unwrap_or_default().to_string(),
        };
        Ok(StatusLine {
            version,
            status,
            reason,
        })
    }

    fn to_line(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.reason.len() + 16);
        buf.extend_from_slice(self.version.to_string().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.status.to_string().as_bytes());
        if !self.reason.is_empty() {
            buf.extend_from_slice(b" ");
            buf.extend_from_slice(self.reason.as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf.freeze()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn has_body(&self, _traits: &MessageTraits) -> bool {
        let code = self.status.as_u16();
        !(self.status.is_informational() || code == 204 || code == 304)
    }

    fn is_interim(&self) -> bool {
        self.status.is_informational() && self.status != StatusCode::SWITCHING_PROTOCOLS
    }
}

fn parse_status_code(code: &[u8]) -> Option<StatusCode> {
    if code.len() != 3 || !code.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let n = code.iter().fold(0u16, |n, d| n * 10 + u16::from(d - b'0'));
    StatusCode::from_u16(n)
}

/// An HTTP response, either parsed from the wire or built for sending.
#[derive(Debug)]
pub struct Response {
    pub version: Version,
    /// The HTTP status code
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderStore,
    pub body: Option<Body>,
    pub traits: MessageTraits,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use nbhttp::http::response::{ResponseBuilder, StatusCode};
/// # use nbhttp::http::body::Body;
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(Body::identity("{}"))
///     .build()?;
/// assert_eq!(response.reason, "OK");
/// # Ok::<(), nbhttp::error::HttpError>(())
/// ```
pub struct ResponseBuilder {
    version: Version,
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderStore,
    body: Option<Body>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            reason: None,
            headers: HeaderStore::new(),
            body: None,
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Appends a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.add(key, value);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Builds the final Response.
    /// Fails when the framing headers are malformed.
    pub fn build(self) -> Result<Response> {
        let reason = self
            .reason
            .unwrap_or_else(|| self.status.reason_phrase().unwrap_or_default().to_string());
        let traits = MessageTraits::outbound(&self.headers, self.version, self.body.as_ref())?;
        Ok(Response {
            version: self.version,
            status: self.status,
            reason,
            headers: self.headers,
            body: self.body,
            traits,
        })
    }
}

impl Response {
    pub fn status_line(&self) -> StatusLine {
        StatusLine {
            version: self.version,
            status: self.status,
            reason: self.reason.clone(),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get_str(key)
    }

    /// Decoded body content; empty when the response has no body.
    pub fn content(&self) -> &[u8] {
        self.body.as_ref().map(Body::content).unwrap_or_default()
    }

    pub(crate) fn from_parts(
        line: StatusLine,
        headers: HeaderStore,
        traits: MessageTraits,
        body: Option<Body>,
    ) -> Self {
        Response {
            version: line.version,
            status: line.status,
            reason: line.reason,
            headers,
            body,
            traits,
        }
    }
}
