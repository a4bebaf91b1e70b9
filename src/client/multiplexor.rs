//! Readiness-driven progress for many exchanges at once.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace};

use crate::client::exchange::Exchange;
use crate::error::{HttpError, Result};

/// Default upper bound on one readiness wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives a set of exchanges until none wants I/O or a deadline passes.
///
/// Each round, exchanges that can progress without readiness (no socket yet,
/// or input already buffered) are stepped straight away; the rest are
/// registered with a `mio::Poll` and stepped as their sockets turn ready.
/// Every registration is re-armed each round, so readiness is seen
/// level-triggered even though mio reports edges.
#[derive(Debug, Clone, Copy)]
pub struct Multiplexor {
    poll_interval: Duration,
}

impl Default for Multiplexor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Multiplexor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Runs until every exchange is complete or failed, or `timeout`
    /// elapses. Unfinished exchanges are left as they are.
    pub fn run(&self, exchanges: &mut [Exchange], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(exchanges.len().max(16));
        // socket generation each exchange is registered with
        let mut registered: Vec<Option<u64>> = vec![None; exchanges.len()];

        loop {
            let mut forced = Vec::new();
            let mut waiting = 0usize;

            for (i, ex) in exchanges.iter_mut().enumerate() {
                let (read, write) = (ex.want_read(), ex.want_write());
                if !read && !write {
                    continue;
                }
                if (write && !ex.has_socket()) || (read && ex.has_buffered_input()) {
                    forced.push(i);
                    continue;
                }
                let interest = match (read, write) {
                    (true, true) => Interest::READABLE | Interest::WRITABLE,
                    (true, false) => Interest::READABLE,
                    _ => Interest::WRITABLE,
                };
                match arm(&poll, ex, Token(i), interest, &mut registered[i]) {
                    Ok(()) => waiting += 1,
                    Err(e) => ex.fail(HttpError::Io(e)),
                }
            }

            if forced.is_empty() && waiting == 0 {
                trace!("no exchange wants io");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(pending = forced.len() + waiting, "multiplexor deadline passed");
                break;
            }

            events.clear();
            if waiting > 0 {
                let wait = if forced.is_empty() {
                    self.poll_interval.min(deadline - now)
                } else {
                    Duration::ZERO
                };
                match poll.poll(&mut events, Some(wait)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }

            for &i in &forced {
                let ex = &mut exchanges[i];
                if ex.want_write() && !ex.has_socket() {
                    while ex.do_write() {}
                }
                if ex.want_read() && ex.has_buffered_input() {
                    while ex.do_read() {}
                }
            }

            for event in events.iter() {
                let Some(ex) = exchanges.get_mut(event.token().0) else {
                    continue;
                };
                if (event.is_writable() || event.is_error()) && ex.want_write() {
                    while ex.do_write() {}
                }
                if (event.is_readable() || event.is_read_closed() || event.is_error()) && ex.want_read() {
                    while ex.do_read() {}
                }
            }
        }

        for (ex, generation) in exchanges.iter_mut().zip(&registered) {
            if *generation == Some(ex.socket_generation()) {
                if let Some(source) = ex.source_mut() {
                    let _ = poll.registry().deregister(source);
                }
            }
        }
        Ok(())
    }
}

/// Registers the exchange's current socket, or re-arms it.
fn arm(
    poll: &Poll,
    ex: &mut Exchange,
    token: Token,
    interest: Interest,
    registered: &mut Option<u64>,
) -> std::io::Result<()> {
    let generation = ex.socket_generation();
    let Some(source) = ex.source_mut() else {
        return Err(ErrorKind::NotConnected.into());
    };
    if *registered == Some(generation) {
        poll.registry().reregister(source, token, interest)
    } else {
        poll.registry().register(source, token, interest)?;
        *registered = Some(generation);
        Ok(())
    }
}

/// Drives `exchanges` with the default poll interval and hands them back,
/// each complete, failed or (past the deadline) unfinished.
pub fn join(mut exchanges: Vec<Exchange>, timeout: Duration) -> Result<Vec<Exchange>> {
    Multiplexor::default().run(&mut exchanges, timeout)?;
    Ok(exchanges)
}
