use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use url::Url;

use crate::error::{snippet, HttpError, Result};
use crate::http::body::{Body, MessageTraits};
use crate::http::headers::HeaderStore;
use crate::http::parser::{is_token, StartLine};
use crate::http::version::Version;

/// HTTP request methods.
///
/// The registered methods get their own variant; any other token is carried
/// verbatim in `Extension`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    CONNECT,
    TRACE,
    Extension(String),
}

impl Method {
    /// Parses a method token (case-sensitive).
    ///
    /// ```
    /// # use nbhttp::http::request::Method;
    /// assert_eq!(Method::from_token(b"GET").unwrap(), Method::GET);
    /// assert_eq!(Method::from_token(b"PURGE").unwrap(), Method::Extension("PURGE".into()));
    /// assert!(Method::from_token(b"GE T").is_err());
    /// ```
    pub fn from_token(token: &[u8]) -> Result<Self> {
        let method = match token {
            b"GET" => Method::GET,
            b"POST" => Method::POST,
            b"PUT" => Method::PUT,
            b"DELETE" => Method::DELETE,
            b"HEAD" => Method::HEAD,
            b"OPTIONS" => Method::OPTIONS,
            b"PATCH" => Method::PATCH,
            b"CONNECT" => Method::CONNECT,
            b"TRACE" => Method::TRACE,
            other if is_token(other) => {
                // is_token guarantees ASCII
                Method::Extension(String::from_utf8_lossy(other).into_owned())
            }
            other => return Err(HttpError::InvalidMethod(snippet(other))),
        };
        Ok(method)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::Extension(s) => s,
        }
    }
}

impl FromStr for Method {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self> {
        Method::from_token(s.as_bytes())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `METHOD SP request-target SP HTTP-version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: Version,
}

impl StartLine for RequestLine {
    fn parse(line: &[u8]) -> Result<Self> {
        let mut parts = line.split(|&b| b == b' ');
        let method = Method::from_token(parts.next().unwrap_or_default())?;
        let target = parts
            .next()
            .filter(|t| is_target(t))
            .ok_or_else(|| HttpError::InvalidUri(snippet(line)))?;
        let version = Version::parse(parts.next().unwrap_or_default())?;
        if parts.next().is_some() {
            return Err(HttpError::InvalidVersion(snippet(line)));
        }
        Ok(RequestLine {
            method,
            // is_target only admits visible ASCII
            target: String::from_utf8_lossy(target).into_owned(),
            version,
        })
    }

    fn to_line(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.target.len() + 24);
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.target.as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.version.to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.freeze()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn has_body(&self, traits: &MessageTraits) -> bool {
        traits.chunked || traits.content_length.is_some()
    }
}

fn is_target(target: &[u8]) -> bool {
    !target.is_empty() && target.iter().all(|&b| b.is_ascii_graphic())
}

/// An HTTP request, either built for sending or parsed from the wire.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Request-target exactly as it appears on the request line.
    pub target: String,
    /// Absolute URL the request is addressed to; absent for parsed requests.
    pub url: Option<Url>,
    pub version: Version,
    pub headers: HeaderStore,
    pub body: Option<Body>,
    pub traits: MessageTraits,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    url: Option<Url>,
    version: Version,
    headers: HeaderStore,
    body: Option<Body>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            url: None,
            version: Version::HTTP_11,
            headers: HeaderStore::new(),
            body: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Appends a header; repeated names are kept as separate entries.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.add(key, value);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the request-target to the URL's path and query and adds a
    /// `Host` header when none was given.
    pub fn build(mut self) -> Result<Request> {
        let method = self
            .method
            .ok_or_else(|| HttpError::InvalidMethod("method missing".into()))?;
        let url = self
            .url
            .ok_or_else(|| HttpError::InvalidUri("url missing".into()))?;
        let host = url
            .host_str()
            .ok_or_else(|| HttpError::InvalidUri(url.to_string()))?;

        if !self.headers.contains("Host") {
            let host_value = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            self.headers.add("Host", host_value);
        }

        let mut target = url.path().to_string();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let traits = MessageTraits::outbound(&self.headers, self.version, self.body.as_ref())?;
        Ok(Request {
            method,
            target,
            url: Some(url),
            version: self.version,
            headers: self.headers,
            body: self.body,
            traits,
        })
    }
}

impl Request {
    /// Shorthand for a body-less request to `url`.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| HttpError::InvalidUri(format!("{}: {}", url, e)))?;
        RequestBuilder::new().method(method).url(url).build()
    }

    pub fn get(url: &str) -> Result<Self> {
        Request::new(Method::GET, url)
    }

    pub fn request_line(&self) -> RequestLine {
        RequestLine {
            method: self.method.clone(),
            target: self.target.clone(),
            version: self.version,
        }
    }

    /// Retrieves the first value of a header as text.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get_str(key)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.traits.content_length
    }

    /// Whether the connection may stay open after this exchange.
    pub fn keep_alive(&self) -> bool {
        !self.traits.connection_close
    }

    pub(crate) fn from_parts(
        line: RequestLine,
        headers: HeaderStore,
        traits: MessageTraits,
        body: Option<Body>,
    ) -> Self {
        Request {
            method: line.method,
            target: line.target,
            url: None,
            version: line.version,
            headers,
            body,
            traits,
        }
    }
}
