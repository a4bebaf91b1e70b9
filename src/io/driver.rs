//! Buffers a non-blocking transport and satisfies protocol signals.

use std::io::{self, ErrorKind};
use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::config::Limits;
use crate::error::{HttpError, Result};
use crate::http::signal::{Protocol, Signal};
use crate::io::{Pump, Transport};

/// Owns a transport plus its read buffer and write backlog.
///
/// `Poll::Pending` from any method means the transport would block; the
/// caller waits for readiness and calls again. Nothing is lost in between.
#[derive(Debug)]
pub struct Driver<T> {
    transport: T,
    limits: Limits,
    read_buf: BytesMut,
    backlog: BytesMut,
    eof: bool,
    want_disconnect: bool,
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: T, limits: Limits) -> Self {
        Self {
            transport,
            limits,
            read_buf: BytesMut::with_capacity(limits.read_chunk_size),
            backlog: BytesMut::new(),
            eof: false,
            want_disconnect: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Bytes accepted by [`Driver::write_data`] but not yet on the wire.
    pub fn backlog(&self) -> &[u8] {
        &self.backlog
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// A writer asked for the connection to close after its message.
    pub fn want_disconnect(&self) -> bool {
        self.want_disconnect
    }

    /// Reads can make progress without waiting on the socket. Bytes left in
    /// the read buffer do not count: a pump only stops on a short buffer.
    pub fn has_buffered_input(&self) -> bool {
        self.eof || self.transport.has_buffered_input()
    }

    pub fn wants_write(&self) -> bool {
        !self.backlog.is_empty() || self.transport.wants_write()
    }

    pub fn wants_read(&self) -> bool {
        self.transport.wants_read()
    }

    /// One read from the transport into the buffer. `Ready(0)` is end of
    /// stream.
    fn fill(&mut self) -> Result<Poll<usize>> {
        if self.eof {
            return Ok(Poll::Ready(0));
        }
        let start = self.read_buf.len();
        self.read_buf.resize(start + self.limits.read_chunk_size.max(1), 0);
        loop {
            match self.transport.read(&mut self.read_buf[start..]) {
                Ok(n) => {
                    self.read_buf.truncate(start + n);
                    if n == 0 {
                        trace!("transport reached end of stream");
                        self.eof = true;
                    }
                    return Ok(Poll::Ready(n));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.read_buf.truncate(start);
                    if e.kind() == ErrorKind::WouldBlock {
                        return Ok(Poll::Pending);
                    }
                    return Err(HttpError::from_io(e));
                }
            }
        }
    }

    /// Returns a line with its terminator, or at end of stream whatever
    /// remains (possibly nothing) without one.
    pub fn read_line(&mut self) -> Result<Poll<Bytes>> {
        let limit = self.limits.max_line_length;
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.read_buf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos + 1;
                if end > limit {
                    return Err(HttpError::LineTooLong { limit });
                }
                return Ok(Poll::Ready(self.read_buf.split_to(end).freeze()));
            }
            scanned = self.read_buf.len();
            if scanned > limit {
                return Err(HttpError::LineTooLong { limit });
            }
            if self.eof {
                return Ok(Poll::Ready(self.read_buf.split().freeze()));
            }
            if self.fill()?.is_pending() {
                return Ok(Poll::Pending);
            }
        }
    }

    /// Returns between 1 and `n` bytes, or an empty span at end of stream.
    pub fn read_data(&mut self, n: usize) -> Result<Poll<Bytes>> {
        loop {
            if !self.read_buf.is_empty() {
                let take = n.min(self.read_buf.len());
                return Ok(Poll::Ready(self.read_buf.split_to(take).freeze()));
            }
            if self.eof {
                return Ok(Poll::Ready(Bytes::new()));
            }
            if self.fill()?.is_pending() {
                return Ok(Poll::Pending);
            }
        }
    }

    /// Returns the next `n` bytes without consuming them; fewer only at end
    /// of stream.
    pub fn read_peek(&mut self, n: usize) -> Result<Poll<Bytes>> {
        loop {
            if self.read_buf.len() >= n || self.eof {
                let take = n.min(self.read_buf.len());
                return Ok(Poll::Ready(Bytes::copy_from_slice(&self.read_buf[..take])));
            }
            if self.fill()?.is_pending() {
                return Ok(Poll::Pending);
            }
        }
    }

    pub fn write_line(&mut self, line: &[u8]) -> Result<Poll<usize>> {
        self.write_data(line)
    }

    /// Accepts `data` for writing.
    ///
    /// An existing backlog is flushed first; if it cannot be, nothing is
    /// accepted and the result is `Pending`. Otherwise whatever the
    /// transport does not take right away joins the backlog and the whole
    /// length is reported as accepted.
    pub fn write_data(&mut self, data: &[u8]) -> Result<Poll<usize>> {
        if self.flush_backlog()?.is_pending() {
            return Ok(Poll::Pending);
        }
        let written = match self.write_some(data)? {
            Poll::Ready(n) => n,
            Poll::Pending => 0,
        };
        if written < data.len() {
            trace!(written, backlog = data.len() - written, "partial write");
            self.backlog.extend_from_slice(&data[written..]);
        }
        Ok(Poll::Ready(data.len()))
    }

    fn write_some(&mut self, data: &[u8]) -> Result<Poll<usize>> {
        loop {
            match self.transport.write(data) {
                Ok(0) if !data.is_empty() => {
                    return Err(HttpError::Io(io::Error::from(ErrorKind::WriteZero)));
                }
                Ok(n) => return Ok(Poll::Ready(n)),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Poll::Pending),
                Err(e) => return Err(HttpError::from_io(e)),
            }
        }
    }

    fn flush_backlog(&mut self) -> Result<Poll<()>> {
        while !self.backlog.is_empty() {
            let backlog = std::mem::take(&mut self.backlog);
            let result = self.write_some(&backlog);
            self.backlog = backlog;
            match result? {
                Poll::Ready(n) => self.backlog.advance(n),
                Poll::Pending => return Ok(Poll::Pending),
            }
        }
        Ok(Poll::Ready(()))
    }

    /// Pushes the backlog and anything the transport has queued.
    pub fn flush(&mut self) -> Result<Poll<()>> {
        if self.flush_backlog()?.is_pending() {
            return Ok(Poll::Pending);
        }
        match self.transport.flush() {
            Ok(()) => Ok(Poll::Ready(())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Poll::Pending),
            Err(e) => Err(HttpError::from_io(e)),
        }
    }

    /// Lets the transport make internal progress, e.g. on a handshake.
    pub fn drive(&mut self) -> Result<Poll<()>> {
        match self.transport.drive() {
            Ok(()) => Ok(Poll::Ready(())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Poll::Pending),
            Err(e) => Err(HttpError::from_io(e)),
        }
    }

    /// Runs `pump` until it completes or the transport would block.
    ///
    /// `Ready` means the machine completed and its output has been flushed.
    pub fn pump<M: Protocol>(&mut self, pump: &mut Pump<M>) -> Result<Poll<()>> {
        loop {
            let demand = match pump.pending.take() {
                Some(demand) => demand,
                None => pump.machine.step(None)?,
            };
            let input = match &demand {
                Signal::NeedLine => self.read_line()?.map(Signal::HaveLine),
                Signal::NeedData(n) => self.read_data(*n)?.map(Signal::HaveData),
                Signal::NeedPeek(n) => self.read_peek(*n)?.map(Signal::HavePeek),
                Signal::HaveLine(bytes) | Signal::HaveData(bytes) | Signal::HavePeek(bytes) => {
                    match self.write_data(bytes)? {
                        Poll::Ready(_) => {
                            pump.pending = Some(pump.machine.step(None)?);
                            continue;
                        }
                        Poll::Pending => Poll::Pending,
                    }
                }
                Signal::WantDisconnect => {
                    self.want_disconnect = true;
                    pump.pending = Some(pump.machine.step(None)?);
                    continue;
                }
                Signal::Complete => {
                    let flushed = self.flush()?;
                    pump.pending = Some(Signal::Complete);
                    return Ok(flushed);
                }
            };
            match input {
                Poll::Ready(input) => pump.pending = Some(pump.machine.step(Some(input))?),
                Poll::Pending => {
                    pump.pending = Some(demand);
                    return Ok(Poll::Pending);
                }
            }
        }
    }
}
