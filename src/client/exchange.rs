//! One request/response cycle over its own connection.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use mio::net::TcpStream;
use tracing::{debug, warn};

use crate::client::multiplexor::Multiplexor;
use crate::config::ClientConfig;
use crate::error::{HttpError, Result};
use crate::http::reader::MessageReader;
use crate::http::request::Request;
use crate::http::response::{Response, StatusLine};
use crate::http::writer::MessageWriter;
use crate::io::tls::TlsStream;
use crate::io::{plain, Driver, Pump, Transport};

/// Progress of an [`Exchange`]. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExchangeState {
    NotStarted,
    ResolvingHost,
    Connecting,
    Sending,
    Receiving,
    Complete,
}

/// Per-request orchestrator: resolve, connect, send, receive.
///
/// Progress is made only through [`Exchange::do_write`] and
/// [`Exchange::do_read`], each of which does as much as the socket allows
/// without blocking. Once `error` is set the exchange is frozen: it wants
/// neither reading nor writing.
pub struct Exchange {
    request: Request,
    host: String,
    tls: Option<Arc<rustls::ClientConfig>>,
    config: Arc<ClientConfig>,
    state: ExchangeState,
    error: Option<HttpError>,
    addrs: VecDeque<SocketAddr>,
    connect_error: Option<io::Error>,
    socket: Option<TcpStream>,
    generation: u64,
    driver: Option<Driver<Box<dyn Transport>>>,
    writer: Pump<MessageWriter>,
    reader: Pump<MessageReader<StatusLine>>,
    response: Option<Response>,
}

impl Exchange {
    /// Prepares an exchange for `request`, which must carry an absolute
    /// `http` or `https` URL. `tls` is required for `https`.
    pub fn new(
        request: Request,
        config: Arc<ClientConfig>,
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<Self> {
        let url = request
            .url
            .as_ref()
            .ok_or_else(|| HttpError::InvalidUri(format!("no absolute url for {}", request.target)))?;
        let tls = match url.scheme() {
            "http" => None,
            "https" => Some(tls.ok_or_else(|| HttpError::Config("https requires a tls configuration".into()))?),
            other => return Err(HttpError::InvalidUri(format!("unsupported scheme: {}", other))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| HttpError::InvalidUri(url.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let writer = Pump::new(MessageWriter::for_request(&request));
        let reader = Pump::new(MessageReader::response(
            config.limits,
            config.decompress,
            &request.method,
        ));
        Ok(Self {
            request,
            host,
            tls,
            config,
            state: ExchangeState::NotStarted,
            error: None,
            addrs: VecDeque::new(),
            connect_error: None,
            socket: None,
            generation: 0,
            driver: None,
            writer,
            reader,
            response: None,
        })
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn error(&self) -> Option<&HttpError> {
        self.error.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == ExchangeState::Complete
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// The response, the error that stopped the exchange, or `Timeout` if
    /// it simply never finished.
    pub fn into_response(self) -> Result<Response> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.response.ok_or(HttpError::Timeout)
    }

    /// The request body was framed by closing the connection; the caller
    /// should close it once the exchange is done.
    pub fn wants_disconnect(&self) -> bool {
        self.driver.as_ref().is_some_and(Driver::want_disconnect)
    }

    pub fn want_write(&self) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.state {
            ExchangeState::NotStarted | ExchangeState::ResolvingHost | ExchangeState::Connecting => true,
            // a TLS handshake waiting on the server stalls writing
            ExchangeState::Sending => !self.driver.as_ref().is_some_and(Driver::wants_read),
            ExchangeState::Receiving => self.driver.as_ref().is_some_and(Driver::wants_write),
            ExchangeState::Complete => false,
        }
    }

    pub fn want_read(&self) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.state {
            ExchangeState::Sending => self.driver.as_ref().is_some_and(Driver::wants_read),
            ExchangeState::Receiving => true,
            _ => false,
        }
    }

    pub fn has_socket(&self) -> bool {
        self.socket.is_some() || self.driver.is_some()
    }

    /// Readable bytes are already buffered; reading needs no readiness.
    pub fn has_buffered_input(&self) -> bool {
        self.state == ExchangeState::Receiving
            && self.driver.as_ref().is_some_and(Driver::has_buffered_input)
    }

    /// Bumped whenever the underlying socket is replaced, so a poller knows
    /// to register the new one.
    pub fn socket_generation(&self) -> u64 {
        self.generation
    }

    pub fn source_mut(&mut self) -> Option<&mut dyn mio::event::Source> {
        if let Some(socket) = self.socket.as_mut() {
            return Some(socket);
        }
        self.driver.as_mut().and_then(|d| d.transport_mut().source())
    }

    /// Makes write-side progress. Returns true when calling again right
    /// away can make more.
    pub fn do_write(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.write_step() {
            Ok(again) => again,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    /// Makes read-side progress. Returns true when calling again right away
    /// can make more.
    pub fn do_read(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        match self.read_step() {
            Ok(again) => again,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    /// Drives this exchange alone until it completes, fails or `timeout`
    /// passes.
    pub fn execute(&mut self, timeout: Duration) -> Result<()> {
        Multiplexor::new(self.config.poll_interval()).run(std::slice::from_mut(self), timeout)
    }

    fn transition(&mut self, next: ExchangeState) {
        debug!(host = %self.host, from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }

    pub(crate) fn fail(&mut self, e: HttpError) {
        warn!(host = %self.host, state = ?self.state, error = %e, "exchange failed");
        self.socket = None;
        self.error = Some(e);
    }

    fn write_step(&mut self) -> Result<bool> {
        match self.state {
            ExchangeState::NotStarted => {
                self.transition(ExchangeState::ResolvingHost);
                self.resolve()?;
                Ok(true)
            }
            ExchangeState::ResolvingHost => {
                self.start_connect()?;
                self.transition(ExchangeState::Connecting);
                Ok(false)
            }
            ExchangeState::Connecting => self.finish_connect(),
            ExchangeState::Sending => self.send(),
            ExchangeState::Receiving => {
                if let Some(driver) = self.driver.as_mut() {
                    let _ = driver.flush()?;
                }
                Ok(false)
            }
            ExchangeState::Complete => Ok(false),
        }
    }

    fn read_step(&mut self) -> Result<bool> {
        match self.state {
            ExchangeState::Sending => {
                if let Some(driver) = self.driver.as_mut() {
                    if driver.drive()?.is_pending() {
                        return Ok(false);
                    }
                }
                self.send()
            }
            ExchangeState::Receiving => self.receive(),
            _ => Ok(false),
        }
    }

    /// Resolves the target host; literal addresses need no lookup.
    fn resolve(&mut self) -> Result<()> {
        let url = self
            .request
            .url
            .as_ref()
            .ok_or_else(|| HttpError::InvalidUri(self.request.target.clone()))?;
        let addrs = url
            .socket_addrs(|| None)
            .map_err(|e| {
                debug!(host = %self.host, error = %e, "resolution failed");
                HttpError::UnknownHost(self.host.clone())
            })?;
        if addrs.is_empty() {
            return Err(HttpError::UnknownHost(self.host.clone()));
        }
        debug!(host = %self.host, addrs = addrs.len(), "resolved");
        self.addrs = addrs.into();
        Ok(())
    }

    /// Starts a connect to the next address that accepts one.
    fn start_connect(&mut self) -> Result<()> {
        while let Some(addr) = self.addrs.pop_front() {
            match plain::connect(addr) {
                Ok(socket) => {
                    self.socket = Some(socket);
                    self.generation += 1;
                    return Ok(());
                }
                Err(e) => {
                    debug!(host = %self.host, %addr, error = %e, "connect failed");
                    self.connect_error = Some(e);
                }
            }
        }
        Err(HttpError::UnreachableHost {
            host: self.host.clone(),
            source: self
                .connect_error
                .take()
                .unwrap_or_else(|| io::ErrorKind::NotConnected.into()),
        })
    }

    fn finish_connect(&mut self) -> Result<bool> {
        let status = match self.socket.as_ref() {
            Some(socket) => plain::connect_status(socket),
            None => return Err(HttpError::InvalidState("connecting without a socket")),
        };
        match status {
            Poll::Pending => Ok(false),
            Poll::Ready(Err(e)) => {
                debug!(host = %self.host, error = %e, "connect attempt failed");
                self.connect_error = Some(e);
                self.socket = None;
                self.start_connect()?;
                Ok(false)
            }
            Poll::Ready(Ok(())) => {
                let socket = self
                    .socket
                    .take()
                    .ok_or(HttpError::InvalidState("connecting without a socket"))?;
                debug!(host = %self.host, tls = self.tls.is_some(), "connected");
                let transport: Box<dyn Transport> = match &self.tls {
                    Some(config) => Box::new(TlsStream::connect(config.clone(), &self.host, socket)?),
                    None => Box::new(socket),
                };
                self.driver = Some(Driver::new(transport, self.config.limits));
                self.transition(ExchangeState::Sending);
                Ok(true)
            }
        }
    }

    fn send(&mut self) -> Result<bool> {
        let driver = self
            .driver
            .as_mut()
            .ok_or(HttpError::InvalidState("sending without a connection"))?;
        if driver.pump(&mut self.writer)?.is_pending() {
            return Ok(false);
        }
        self.transition(ExchangeState::Receiving);
        Ok(false)
    }

    fn receive(&mut self) -> Result<bool> {
        let driver = self
            .driver
            .as_mut()
            .ok_or(HttpError::InvalidState("receiving without a connection"))?;
        if driver.pump(&mut self.reader)?.is_pending() {
            return Ok(false);
        }
        let response = self
            .reader
            .machine_mut()
            .take_response()
            .ok_or(HttpError::InvalidState("reader completed without a response"))?;
        debug!(
            host = %self.host,
            status = response.status.as_u16(),
            "response received"
        );
        self.response = Some(response);
        self.transition(ExchangeState::Complete);
        Ok(false)
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("method", &self.request.method)
            .field("host", &self.host)
            .field("state", &self.state)
            .field("error", &self.error)
            .finish()
    }
}
