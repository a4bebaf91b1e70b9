//! Non-blocking transport plumbing.
//!
//! A [`Transport`] is a byte stream whose reads and writes fail with
//! `WouldBlock` instead of waiting. The [`Driver`](driver::Driver) buffers
//! it and satisfies the signals of a [`Protocol`] machine held in a
//! [`Pump`].

pub mod driver;
pub mod plain;
pub mod tls;

use std::io::{self, Read, Write};

use crate::http::signal::{Protocol, Signal};

pub use driver::Driver;

/// A non-blocking byte stream.
pub trait Transport: Read + Write {
    /// Input is needed before any progress can be made, whatever the
    /// message state (e.g. a TLS handshake waiting for the server).
    fn wants_read(&self) -> bool {
        false
    }

    /// Output is queued inside the transport itself.
    fn wants_write(&self) -> bool {
        false
    }

    /// Bytes are readable without touching the socket.
    fn has_buffered_input(&self) -> bool {
        false
    }

    /// Advances internal protocol state (e.g. a handshake) from whatever
    /// the socket has to offer. `WouldBlock` means wait for readiness.
    fn drive(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// The pollable socket underneath, if any.
    fn source(&mut self) -> Option<&mut dyn mio::event::Source> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn wants_read(&self) -> bool {
        (**self).wants_read()
    }

    fn wants_write(&self) -> bool {
        (**self).wants_write()
    }

    fn has_buffered_input(&self) -> bool {
        (**self).has_buffered_input()
    }

    fn drive(&mut self) -> io::Result<()> {
        (**self).drive()
    }

    fn source(&mut self) -> Option<&mut dyn mio::event::Source> {
        (**self).source()
    }
}

/// A protocol machine plus the signal it is currently waiting on.
#[derive(Debug)]
pub struct Pump<M> {
    machine: M,
    pending: Option<Signal>,
}

impl<M: Protocol> Pump<M> {
    pub fn new(machine: M) -> Self {
        Self {
            machine,
            pending: None,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn into_machine(self) -> M {
        self.machine
    }

    /// The outstanding demand; `None` before the first step.
    pub fn pending(&self) -> Option<&Signal> {
        self.pending.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.pending, Some(Signal::Complete))
    }

    /// Whether the machine is blocked on input.
    pub fn is_reading(&self) -> bool {
        matches!(
            self.pending,
            Some(Signal::NeedLine | Signal::NeedData(_) | Signal::NeedPeek(_))
        )
    }
}
