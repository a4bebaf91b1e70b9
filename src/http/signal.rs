//! Signals exchanged between protocol state machines and their driver.

use bytes::Bytes;

use crate::error::Result;

/// A demand or a delivery.
///
/// Readers emit `Need*` and are stepped with the matching `Have*`. Writers
/// emit `HaveLine`/`HaveData` carrying bytes to put on the wire and are
/// stepped with `None` once the driver has accepted them. Lines always
/// carry their terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    NeedLine,
    NeedData(usize),
    NeedPeek(usize),
    HaveLine(Bytes),
    HaveData(Bytes),
    HavePeek(Bytes),
    Complete,
    WantDisconnect,
}

impl Signal {
    pub fn is_complete(&self) -> bool {
        matches!(self, Signal::Complete)
    }
}

/// A message state machine expressed as an explicit transition function.
///
/// Each call consumes at most one input signal and returns the next output
/// signal. All state lives in `self`; nothing is suspended on a call stack,
/// so a machine can be driven by hand in tests without any I/O.
pub trait Protocol {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal>;
}

impl<P: Protocol + ?Sized> Protocol for Box<P> {
    fn step(&mut self, input: Option<Signal>) -> Result<Signal> {
        (**self).step(input)
    }
}

/// Strips a trailing `\n` and an optional `\r` before it.
pub(crate) fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub(crate) fn is_terminated(line: &[u8]) -> bool {
    line.last() == Some(&b'\n')
}
