//! Handshake run once per successful connection.
//!
//! Steps, in order, each blocking on the endpoint:
//! 1. Send INIT (node id, memory size, size ceiling) followed by the memory
//!    region handle attached to the 4-byte carrier.
//! 2. Read INIT_ACK; any other kind or a nonzero status aborts.
//! 3. Bind the endpoint to the client's stable [`ChannelId`].
//! 4. Send RECONFIGURE and switch the endpoint to non-blocking reads.
//!
//! A failure at any step shuts the endpoint down and drops it. Nothing from a
//! failed handshake is kept; the next attempt starts from a fresh endpoint.

use std::os::fd::RawFd;

use crate::error::{HandshakeStage, LinkError, Result};
use crate::host::{ChannelId, MemoryRegion};
use crate::protocol::{
    Envelope, EnvelopeBuffer, MessageKind, ENVELOPE_SIZE, FD_CARRIER, INIT_ACK_OK,
};
use crate::transport::Endpoint;

/// An endpoint that completed the handshake and is bound to a channel id.
#[derive(Debug)]
pub struct ReadyChannel<E> {
    id: ChannelId,
    endpoint: E,
    buffer: EnvelopeBuffer,
}

impl<E: Endpoint> ReadyChannel<E> {
    fn bind(id: ChannelId, endpoint: E) -> Self {
        Self {
            id,
            endpoint,
            buffer: EnvelopeBuffer::new(),
        }
    }

    /// Stable id used for readiness registration.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Descriptor the readiness facility should watch.
    pub fn raw_fd(&self) -> RawFd {
        self.endpoint.raw_fd()
    }

    /// Read one envelope without blocking.
    ///
    /// `Ok(None)` means no complete envelope is available yet.
    pub fn read_envelope(&mut self) -> std::io::Result<Option<Envelope>> {
        self.buffer.read_from(&mut self.endpoint)
    }

    /// Shut down and close the endpoint.
    pub fn close(mut self) {
        self.endpoint.shutdown();
    }

    fn activate(&mut self) -> Result<()> {
        self.endpoint
            .write_all(&Envelope::reconfigure().encode())
            .and_then(|()| self.endpoint.flush())
            .map_err(|e| LinkError::handshake(HandshakeStage::Reconfigure, e))?;
        self.endpoint
            .set_nonblocking(true)
            .map_err(|e| LinkError::handshake(HandshakeStage::Activate, e))
    }
}

/// Run the handshake on a connected endpoint.
///
/// `init_message` is the pre-encoded INIT for this client; `memory` is sent
/// right after it.
pub fn perform<E: Endpoint>(
    mut endpoint: E,
    channel: ChannelId,
    init_message: &[u8],
    memory: &MemoryRegion,
) -> Result<ReadyChannel<E>> {
    let negotiated =
        send_init(&mut endpoint, init_message, memory).and_then(|()| await_ack(&mut endpoint));
    if let Err(e) = negotiated {
        endpoint.shutdown();
        return Err(e);
    }

    let mut ready = ReadyChannel::bind(channel, endpoint);
    if let Err(e) = ready.activate() {
        ready.close();
        return Err(e);
    }

    Ok(ready)
}

fn send_init<E: Endpoint>(
    endpoint: &mut E,
    init_message: &[u8],
    memory: &MemoryRegion,
) -> Result<()> {
    endpoint
        .write_all(init_message)
        .and_then(|()| endpoint.flush())
        .and_then(|()| endpoint.send_fd(memory.fd(), &FD_CARRIER))
        .map_err(|e| LinkError::handshake(HandshakeStage::Init, e))
}

fn await_ack<E: Endpoint>(endpoint: &mut E) -> Result<()> {
    let mut bytes = [0u8; ENVELOPE_SIZE];
    endpoint
        .read_exact(&mut bytes)
        .map_err(|e| LinkError::handshake(HandshakeStage::Acknowledge, e))?;

    let ack = Envelope::decode(&bytes)
        .ok_or_else(|| LinkError::handshake(HandshakeStage::Acknowledge, "short envelope"))?;

    match ack.message_kind() {
        Some(MessageKind::InitAck) if ack.value == INIT_ACK_OK => Ok(()),
        Some(MessageKind::InitAck) => Err(LinkError::handshake(
            HandshakeStage::Acknowledge,
            format!("backend rejected init with status {}", ack.value),
        )),
        _ => Err(LinkError::handshake(
            HandshakeStage::Acknowledge,
            format!("unexpected message kind {}", ack.kind),
        )),
    }
}
