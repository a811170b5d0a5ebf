//! Interfaces consumed from the embedding environment.
//!
//! The client never owns a thread or a poller. The embedding loop implements
//! [`Reactor`] to arm timers and watch descriptors, and calls back into
//! [`Client::on_timer`](crate::Client::on_timer) and
//! [`Client::on_readable`](crate::Client::on_readable) when they fire. The
//! owning device implements [`Device`].

use std::fmt;
use std::os::fd::RawFd;
use std::time::Duration;

/// Handle to a one-shot timer armed through a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Stable logical identifier of a client's channel.
///
/// Allocated once per client and reused for every reconnect, so readiness
/// registration and deregistration always address the same key regardless
/// of which OS descriptor backs the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Guest memory the backend maps to reach packet buffers directly.
///
/// The descriptor is borrowed from the host: the client sends it during every
/// handshake but never closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    fd: RawFd,
    size: u64,
}

impl MemoryRegion {
    /// Describe a memory region backed by `fd` and `size` bytes long.
    pub fn new(fd: RawFd, size: u64) -> Self {
        Self { fd, size }
    }

    /// Descriptor of the backing file or shared-memory object.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Length of the region in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Timer and readiness facility of the embedding event loop.
pub trait Reactor {
    /// Arm a one-shot timer firing after `delay`.
    fn schedule_once(&mut self, delay: Duration) -> TimerId;

    /// Cancel a timer. Cancelling an unknown or already-fired timer is a no-op.
    fn cancel_timer(&mut self, timer: TimerId);

    /// Start reporting readability of `fd` under `channel`.
    fn register_readiness(&mut self, channel: ChannelId, fd: RawFd);

    /// Stop reporting readability for `channel`.
    fn deregister_readiness(&mut self, channel: ChannelId);
}

/// The virtual device that owns the link.
pub trait Device {
    /// Obtain the guest memory region. Called once, at attach time.
    fn memory_region(&mut self) -> std::io::Result<MemoryRegion>;

    /// Number of queues; KICKs at or above this index are discarded.
    fn queue_count(&self) -> u16;

    /// Update the device's link-state indicator.
    fn set_link_status(&mut self, up: bool);

    /// The backend reported new work on queue `queue_index`.
    fn notify_queue(&mut self, queue_index: u16);
}
