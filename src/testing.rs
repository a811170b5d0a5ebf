//! In-memory doubles for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{LinkError, Result};
use crate::host::{ChannelId, Device, MemoryRegion, Reactor, TimerId};
use crate::protocol::{Envelope, INIT_ACK_OK};
use crate::transport::{Endpoint, Transport};

#[derive(Debug, Default)]
struct WireState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    fds_sent: Vec<RawFd>,
    peer_closed: bool,
    fail_writes: bool,
    refuse_connect: bool,
    nonblocking: bool,
    shut_down: bool,
    dropped: bool,
}

/// Test-side view of one in-memory endpoint.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemWire(Rc<RefCell<WireState>>);

impl MemWire {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A wire whose backend will accept the handshake.
    pub(crate) fn accepting() -> Self {
        let wire = Self::new();
        wire.push_inbound(&Envelope::init_ack(INIT_ACK_OK).encode());
        wire
    }

    pub(crate) fn endpoint() -> (MemEndpoint, MemWire) {
        let wire = Self::new();
        (MemEndpoint::new(wire.clone(), 100), wire)
    }

    pub(crate) fn push_inbound(&self, bytes: &[u8]) {
        self.0.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    pub(crate) fn outbound(&self) -> Vec<u8> {
        self.0.borrow().outbound.clone()
    }

    pub(crate) fn fds_sent(&self) -> Vec<RawFd> {
        self.0.borrow().fds_sent.clone()
    }

    pub(crate) fn close_by_peer(&self) {
        self.0.borrow_mut().peer_closed = true;
    }

    pub(crate) fn fail_writes(&self) {
        self.0.borrow_mut().fail_writes = true;
    }

    pub(crate) fn is_nonblocking(&self) -> bool {
        self.0.borrow().nonblocking
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.0.borrow().shut_down
    }

    pub(crate) fn is_dropped(&self) -> bool {
        self.0.borrow().dropped
    }
}

/// Endpoint backed by a [`MemWire`].
#[derive(Debug)]
pub(crate) struct MemEndpoint {
    wire: MemWire,
    fd: RawFd,
}

impl MemEndpoint {
    fn new(wire: MemWire, fd: RawFd) -> Self {
        Self { wire, fd }
    }
}

impl Read for MemEndpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.wire.0.borrow_mut();
        if state.inbound.is_empty() {
            if state.peer_closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.wire.0.borrow_mut();
        if state.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Endpoint for MemEndpoint {
    fn send_fd(&mut self, fd: RawFd, carrier: &[u8]) -> io::Result<()> {
        let mut state = self.wire.0.borrow_mut();
        if state.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.outbound.extend_from_slice(carrier);
        state.fds_sent.push(fd);
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.wire.0.borrow_mut().nonblocking = nonblocking;
        Ok(())
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn shutdown(&mut self) {
        self.wire.0.borrow_mut().shut_down = true;
    }
}

impl Drop for MemEndpoint {
    fn drop(&mut self) {
        self.wire.0.borrow_mut().dropped = true;
    }
}

/// Outcome of one scripted connection attempt.
#[derive(Debug)]
pub(crate) enum Attempt {
    OpenFails,
    ConnectRefused,
    Accept(MemWire),
}

/// Every endpoint a [`ScriptedTransport`] has handed out.
#[derive(Debug, Clone, Default)]
pub(crate) struct TransportLog(Rc<RefCell<Vec<MemWire>>>);

impl TransportLog {
    pub(crate) fn opened(&self) -> usize {
        self.0.borrow().len()
    }

    /// Endpoints not yet dropped.
    pub(crate) fn live(&self) -> usize {
        self.0.borrow().iter().filter(|w| !w.is_dropped()).count()
    }
}

/// Transport replaying a script; refuses connections once it runs out.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    attempts: VecDeque<Attempt>,
    log: TransportLog,
    next_fd: RawFd,
}

impl ScriptedTransport {
    pub(crate) fn new(attempts: Vec<Attempt>) -> (Self, TransportLog) {
        let log = TransportLog::default();
        let transport = Self {
            attempts: attempts.into(),
            log: log.clone(),
            next_fd: 100,
        };
        (transport, log)
    }
}

impl Transport for ScriptedTransport {
    type Endpoint = MemEndpoint;

    fn open(&mut self) -> Result<MemEndpoint> {
        let attempt = self.attempts.pop_front().unwrap_or(Attempt::ConnectRefused);
        let wire = match attempt {
            Attempt::OpenFails => {
                return Err(LinkError::EndpointCreation(io::Error::from_raw_os_error(
                    libc::EMFILE,
                )))
            }
            Attempt::ConnectRefused => {
                let wire = MemWire::new();
                wire.0.borrow_mut().refuse_connect = true;
                wire
            }
            Attempt::Accept(wire) => wire,
        };
        self.log.0.borrow_mut().push(wire.clone());
        self.next_fd += 1;
        Ok(MemEndpoint::new(wire, self.next_fd))
    }

    fn connect(&mut self, endpoint: &mut MemEndpoint, address: &str) -> Result<()> {
        if endpoint.wire.0.borrow().refuse_connect {
            return Err(LinkError::Connect {
                address: address.to_string(),
                source: io::ErrorKind::ConnectionRefused.into(),
            });
        }
        Ok(())
    }
}

/// Reactor that records what the client asked for.
#[derive(Debug, Default)]
pub(crate) struct RecordingReactor {
    next_timer: u64,
    pub(crate) pending: Vec<(TimerId, Duration)>,
    pub(crate) cancelled: Vec<TimerId>,
    pub(crate) registered: Option<(ChannelId, RawFd)>,
    pub(crate) registrations: Vec<ChannelId>,
    pub(crate) deregistrations: Vec<ChannelId>,
}

impl RecordingReactor {
    /// Simulate the single pending timer firing; returns its id.
    pub(crate) fn fire(&mut self) -> Option<TimerId> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.pending.remove(0).0)
    }
}

impl Reactor for RecordingReactor {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.pending.push((id, delay));
        id
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        self.pending.retain(|(id, _)| *id != timer);
        self.cancelled.push(timer);
    }

    fn register_readiness(&mut self, channel: ChannelId, fd: RawFd) {
        self.registered = Some((channel, fd));
        self.registrations.push(channel);
    }

    fn deregister_readiness(&mut self, channel: ChannelId) {
        if matches!(self.registered, Some((id, _)) if id == channel) {
            self.registered = None;
        }
        self.deregistrations.push(channel);
    }
}

/// What the client told the device, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceEvent {
    Link(bool),
    Kick(u16),
}

/// Device that records link and queue notifications.
#[derive(Debug)]
pub(crate) struct RecordingDevice {
    pub(crate) events: Vec<DeviceEvent>,
    pub(crate) queues: u16,
    pub(crate) memory: Option<MemoryRegion>,
}

impl RecordingDevice {
    pub(crate) fn new(queues: u16) -> Self {
        Self {
            events: Vec::new(),
            queues,
            memory: Some(MemoryRegion::new(7, 64 << 20)),
        }
    }

    pub(crate) fn link_signals(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Link(up) => Some(*up),
                DeviceEvent::Kick(_) => None,
            })
            .collect()
    }

    pub(crate) fn kicks(&self) -> Vec<u16> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Kick(q) => Some(*q),
                DeviceEvent::Link(_) => None,
            })
            .collect()
    }
}

impl Device for RecordingDevice {
    fn memory_region(&mut self) -> io::Result<MemoryRegion> {
        self.memory
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no guest ram block"))
    }

    fn queue_count(&self) -> u16 {
        self.queues
    }

    fn set_link_status(&mut self, up: bool) {
        self.events.push(DeviceEvent::Link(up));
    }

    fn notify_queue(&mut self, queue_index: u16) {
        self.events.push(DeviceEvent::Kick(queue_index));
    }
}
