use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HttpError, Result};

/// Header block size at which parsing gives up.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;
/// Longest line the driver buffers while waiting for a terminator.
pub const MAX_LINE_LENGTH: usize = 16 * 1024;
/// Default size of a single body read.
pub const DEFAULT_CHUNK: usize = 8192;
/// Largest chunk size accepted in chunked framing.
pub const MAX_CHUNK: u64 = 64 * 1024 * 1024;

/// Framing limits shared by every reader and driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_line_length: usize,
    pub read_chunk_size: usize,
    pub max_chunk_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: MAX_HEADER_BYTES,
            max_line_length: MAX_LINE_LENGTH,
            read_chunk_size: DEFAULT_CHUNK,
            max_chunk_size: MAX_CHUNK,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// PEM files whose certificates are trusted in addition to the webpki roots.
    pub extra_root_certs: Vec<PathBuf>,
}

/// Client configuration.
///
/// ```
/// # use nbhttp::config::ClientConfig;
/// let cfg = ClientConfig::from_yaml_str("poll_interval_ms: 5\nlimits:\n  read_chunk_size: 1024\n").unwrap();
/// assert_eq!(cfg.limits.read_chunk_size, 1024);
/// assert_eq!(cfg.limits.max_header_bytes, nbhttp::config::MAX_HEADER_BYTES);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub limits: Limits,
    /// Upper bound on a single readiness wait inside the multiplexor.
    pub poll_interval_ms: u64,
    /// Decode gzip/deflate content codings while the body arrives.
    pub decompress: bool,
    /// Sent as `User-Agent` when a request does not carry one.
    pub user_agent: Option<String>,
    pub tls: TlsSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            poll_interval_ms: 50,
            decompress: true,
            user_agent: Some(concat!("nbhttp/", env!("CARGO_PKG_VERSION")).to_string()),
            tls: TlsSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| HttpError::Config(e.to_string()))
    }

    /// Loads a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HttpError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
