//! Steady-state message dispatch.
//!
//! Invoked when the connected endpoint is readable. Each call reads at most
//! one envelope and routes it to the device. A read error or orderly close is
//! returned to the caller, which tears the channel down.

use crate::control::ReadyChannel;
use crate::error::{LinkError, Result};
use crate::host::Device;
use crate::protocol::{Envelope, MessageKind};
use crate::transport::Endpoint;

/// What an envelope means for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Deliver a queue notification.
    Kick(u16),
    /// KICK for a queue the device does not have.
    OutOfRange(u16),
    /// A known kind that is not valid after the handshake.
    Unexpected(MessageKind),
    /// An unknown kind tag.
    Unknown(u8),
}

impl Dispatch {
    /// Classify `envelope` for a device with `queue_count` queues.
    pub fn classify(envelope: &Envelope, queue_count: u16) -> Self {
        match envelope.message_kind() {
            Some(MessageKind::Kick) if envelope.value < queue_count => {
                Dispatch::Kick(envelope.value)
            }
            Some(MessageKind::Kick) => Dispatch::OutOfRange(envelope.value),
            Some(kind) => Dispatch::Unexpected(kind),
            None => Dispatch::Unknown(envelope.kind),
        }
    }
}

/// Result of one readiness callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A KICK was delivered to the device.
    Delivered(u16),
    /// An envelope was read and discarded.
    Ignored,
    /// No complete envelope was available.
    WouldBlock,
    /// The stream failed; the channel was torn down.
    Disconnected,
    /// The callback did not belong to a live channel and was dropped.
    Stale,
}

impl ReadOutcome {
    /// Whether the caller should invoke the dispatcher again for the same
    /// readiness event.
    pub fn may_have_more(&self) -> bool {
        matches!(self, ReadOutcome::Delivered(_) | ReadOutcome::Ignored)
    }
}

/// Read one envelope from `channel` and route it to `device`.
///
/// Returns [`LinkError::StreamRead`] when the stream failed or was closed.
pub fn dispatch<E: Endpoint, D: Device>(
    channel: &mut ReadyChannel<E>,
    device: &mut D,
) -> Result<ReadOutcome> {
    let envelope = match channel.read_envelope() {
        Ok(Some(envelope)) => envelope,
        Ok(None) => return Ok(ReadOutcome::WouldBlock),
        Err(e) => return Err(LinkError::StreamRead(e)),
    };

    match Dispatch::classify(&envelope, device.queue_count()) {
        Dispatch::Kick(queue) => {
            device.notify_queue(queue);
            Ok(ReadOutcome::Delivered(queue))
        }
        Dispatch::OutOfRange(queue) => {
            tracing::warn!(
                "{}: kick for queue {} but device has {} queues",
                channel.id(),
                queue,
                device.queue_count()
            );
            Ok(ReadOutcome::Ignored)
        }
        Dispatch::Unexpected(kind) => {
            tracing::warn!("{}: unexpected {:?} after handshake", channel.id(), kind);
            Ok(ReadOutcome::Ignored)
        }
        Dispatch::Unknown(tag) => {
            tracing::warn!("{}: invalid message type {}", channel.id(), tag);
            Ok(ReadOutcome::Ignored)
        }
    }
}
