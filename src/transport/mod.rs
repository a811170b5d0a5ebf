//! Transport module - byte-stream endpoints to the backend.
//!
//! The transport knows nothing about the protocol and never retries; a failed
//! `open` or `connect` is reported once and the client decides what happens
//! next. Dropping an endpoint shuts it down and closes it.

mod socket;

use std::io::{Read, Write};
use std::os::fd::RawFd;

use crate::error::Result;

pub use socket::{UnixEndpoint, UnixTransport};

/// A bidirectional byte stream to the backend.
pub trait Endpoint: Read + Write {
    /// Write `carrier` with `fd` attached as ancillary data.
    ///
    /// The carrier bytes land in the stream like any other write. The local
    /// descriptor stays open.
    fn send_fd(&mut self, fd: RawFd, carrier: &[u8]) -> std::io::Result<()>;

    /// Switch between blocking (handshake) and non-blocking (steady state) reads.
    fn set_nonblocking(&mut self, nonblocking: bool) -> std::io::Result<()>;

    /// OS descriptor to hand to the readiness facility.
    fn raw_fd(&self) -> RawFd;

    /// Shut down both directions. Best effort: errors are ignored.
    fn shutdown(&mut self);
}

/// Factory for endpoints.
pub trait Transport {
    /// Endpoint type produced by this transport.
    type Endpoint: Endpoint;

    /// Create a fresh, unconnected endpoint.
    ///
    /// Fails with [`LinkError::EndpointCreation`](crate::LinkError::EndpointCreation).
    fn open(&mut self) -> Result<Self::Endpoint>;

    /// Connect `endpoint` to `address`.
    ///
    /// Fails with [`LinkError::Connect`](crate::LinkError::Connect).
    fn connect(&mut self, endpoint: &mut Self::Endpoint, address: &str) -> Result<()>;
}
