//! TLS transport over a non-blocking socket, driven through rustls.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, RootCertStore};
use tracing::{debug, info};

use crate::config::TlsSettings;
use crate::error::{HttpError, Result};
use crate::io::Transport;

/// Builds the shared rustls client configuration: webpki roots plus any
/// extra PEM roots from the settings.
pub fn build_client_config(settings: &TlsSettings) -> Result<Arc<rustls::ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    for path in &settings.extra_root_certs {
        let file = File::open(path)
            .map_err(|e| HttpError::Config(format!("failed to open cert file '{}': {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HttpError::Config(format!("failed to parse certificates: {}", e)))?;
        if certs.is_empty() {
            return Err(HttpError::Config(format!(
                "no certificates found in '{}'",
                path.display()
            )));
        }
        for cert in certs {
            roots.add(cert)?;
        }
        info!(path = %path.display(), "loaded extra root certificates");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// A rustls client session over a non-blocking socket.
///
/// Decrypted bytes are drained from rustls into `plain` as soon as records
/// are processed, so the caller can see when input is available without
/// polling the socket.
pub struct TlsStream<S> {
    conn: ClientConnection,
    sock: S,
    plain: BytesMut,
    eof: bool,
}

impl<S: Read + Write> TlsStream<S> {
    pub fn connect(config: Arc<rustls::ClientConfig>, host: &str, sock: S) -> Result<Self> {
        let name = ServerName::try_from(host.to_owned())
            .map_err(|_| HttpError::InvalidUri(format!("invalid server name: {}", host)))?;
        let conn = ClientConnection::new(config, name)?;
        debug!(host, "starting tls handshake");
        Ok(Self {
            conn,
            sock,
            plain: BytesMut::new(),
            eof: false,
        })
    }

    pub fn get_ref(&self) -> &S {
        &self.sock
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    /// Writes queued records until the socket would block.
    fn push_tls(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.sock) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// One socket read, processed and drained into `plain`.
    fn pull_tls(&mut self) -> io::Result<()> {
        match self.push_tls() {
            Err(e) if e.kind() != ErrorKind::WouldBlock => return Err(e),
            _ => {}
        }
        if self.conn.read_tls(&mut self.sock)? == 0 {
            self.eof = true;
        }
        let state = self
            .conn
            .process_new_packets()
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        let available = state.plaintext_bytes_to_read();
        if available > 0 {
            let start = self.plain.len();
            self.plain.resize(start + available, 0);
            self.conn.reader().read_exact(&mut self.plain[start..])?;
        }
        if state.peer_has_closed() {
            self.eof = true;
        }
        Ok(())
    }
}

impl<S: Read + Write> Read for TlsStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.plain.is_empty() {
                let n = buf.len().min(self.plain.len());
                buf[..n].copy_from_slice(&self.plain[..n]);
                self.plain.advance(n);
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }
            self.pull_tls()?;
        }
    }
}

impl<S: Read + Write> Write for TlsStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        match self.push_tls() {
            Err(e) if e.kind() != ErrorKind::WouldBlock => return Err(e),
            _ => {}
        }
        if n == 0 && !buf.is_empty() {
            return Err(ErrorKind::WouldBlock.into());
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.writer().flush()?;
        self.push_tls()?;
        self.sock.flush()
    }
}

impl<S: Transport> Transport for TlsStream<S> {
    fn wants_read(&self) -> bool {
        self.conn.is_handshaking() && !self.conn.wants_write()
    }

    fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    fn has_buffered_input(&self) -> bool {
        !self.plain.is_empty()
    }

    fn drive(&mut self) -> io::Result<()> {
        while self.conn.is_handshaking() && !self.eof {
            self.pull_tls()?;
        }
        if self.conn.is_handshaking() {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        self.push_tls()
    }

    fn source(&mut self) -> Option<&mut dyn mio::event::Source> {
        self.sock.source()
    }
}

impl<S> std::fmt::Debug for TlsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("handshaking", &self.conn.is_handshaking())
            .field("buffered", &self.plain.len())
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        assert!(build_client_config(&TlsSettings::default()).is_ok());
    }

    #[test]
    fn missing_root_file_is_config_error() {
        let settings = TlsSettings {
            extra_root_certs: vec!["/nonexistent/roots.pem".into()],
        };
        assert!(matches!(build_client_config(&settings), Err(HttpError::Config(_))));
    }

    #[test]
    fn invalid_server_name_is_rejected() {
        let config = build_client_config(&TlsSettings::default()).unwrap();
        let sock = std::io::Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            TlsStream::connect(config, "bad host name", sock),
            Err(HttpError::InvalidUri(_))
        ));
    }

    #[test]
    fn handshake_starts_with_client_hello() {
        let config = build_client_config(&TlsSettings::default()).unwrap();
        let mut tls = TlsStream::connect(config, "example.com", std::io::Cursor::new(Vec::<u8>::new())).unwrap();
        assert!(tls.is_handshaking());
        tls.flush().unwrap();
        // TLS handshake record header
        assert_eq!(tls.get_ref().get_ref()[0], 0x16);
    }
}
