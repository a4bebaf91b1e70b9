use std::fmt;

use crate::error::{snippet, HttpError, Result};

/// An `HTTP/major.minor` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };

    /// Parses the exact token `HTTP/<digits>.<digits>`.
    ///
    /// ```
    /// # use nbhttp::http::version::Version;
    /// assert_eq!(Version::parse(b"HTTP/1.1").unwrap(), Version::HTTP_11);
    /// assert!(Version::parse(b"HTTP/1").is_err());
    /// ```
    pub fn parse(token: &[u8]) -> Result<Self> {
        let bad = || HttpError::InvalidVersion(snippet(token));
        let rest = token.strip_prefix(b"HTTP/").ok_or_else(bad)?;
        let dot = rest.iter().position(|&b| b == b'.').ok_or_else(bad)?;
        let major = parse_number(&rest[..dot]).ok_or_else(bad)?;
        let minor = parse_number(&rest[dot + 1..]).ok_or_else(bad)?;
        Ok(Version { major, minor })
    }
}

fn parse_number(digits: &[u8]) -> Option<u8> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_11
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        for v in [Version::HTTP_10, Version::HTTP_11, Version { major: 2, minor: 0 }] {
            assert_eq!(Version::parse(v.to_string().as_bytes()).unwrap(), v);
        }
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in [&b"HTTP/"[..], b"HTTP/1.", b"HTTP/x.1", b"http/1.1", b"HTTP/1.1 "] {
            assert!(matches!(Version::parse(bad), Err(HttpError::InvalidVersion(_))));
        }
    }
}
