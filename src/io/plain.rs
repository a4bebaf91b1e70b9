//! Plain TCP transport.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::task::Poll;

use mio::net::TcpStream;
use tracing::debug;

use crate::io::Transport;

impl Transport for TcpStream {
    fn source(&mut self) -> Option<&mut dyn mio::event::Source> {
        Some(self)
    }
}

/// Starts a non-blocking connect; completion is observed through
/// [`connect_status`] once the socket turns writable.
pub fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    debug!(%addr, "connecting");
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// `Ready(Ok)` once connected, `Ready(Err)` when the attempt failed,
/// `Pending` while still in progress.
pub fn connect_status(stream: &TcpStream) -> Poll<io::Result<()>> {
    match stream.take_error() {
        Ok(Some(e)) | Err(e) => return Poll::Ready(Err(e)),
        Ok(None) => {}
    }
    match stream.peer_addr() {
        Ok(_) => Poll::Ready(Ok(())),
        Err(e) if e.kind() == ErrorKind::NotConnected => Poll::Pending,
        Err(e) => Poll::Ready(Err(e)),
    }
}
