//! Wire format encoding and decoding.
//!
//! Every message starts with the same 3-byte envelope:
//! ```text
//! ┌───────┬──────────┐
//! │ Kind  │ Value    │
//! │ 1 byte│ 2 bytes  │
//! │       │ uint16 BE│
//! └───────┴──────────┘
//! ```
//!
//! `Value` is the queue index for KICK, the status for INIT_ACK, and zero for
//! everything else. INIT is the only message with a body:
//! ```text
//! ┌──────────┬──────────────┬──────────────┐
//! │ Node ID  │ Memory size  │ Size ceiling │
//! │ 4 bytes  │ 8 bytes      │ 4 bytes      │
//! │ uint32 BE│ uint64 BE    │ uint32 BE    │
//! └──────────┴──────────────┴──────────────┘
//! ```
//! Right after INIT the client sends [`FD_CARRIER`]: four zero bytes carrying
//! the memory region handle as an `SCM_RIGHTS` control message. The carrier
//! bytes are part of the stream, so the backend reads 19 + 4 bytes before it
//! answers, and RECONFIGURE follows the carrier:
//! ```text
//! client → INIT (19) │ FD_CARRIER (4, + fd) │         │ RECONFIGURE (3)
//! backend →          │                      │ ACK (3) │
//! ```

use bytes::{Buf, BufMut};

use crate::error::{LinkError, Result};

/// Envelope size in bytes (fixed, exactly 3).
pub const ENVELOPE_SIZE: usize = 3;

/// Size of the INIT body following its envelope.
pub const INIT_BODY_SIZE: usize = 16;

/// Total size of an encoded INIT message.
pub const INIT_MESSAGE_SIZE: usize = ENVELOPE_SIZE + INIT_BODY_SIZE;

/// Size of the zero payload that carries the memory region handle.
pub const FD_CARRIER_SIZE: usize = 4;

/// Payload the memory region handle is attached to.
pub const FD_CARRIER: [u8; FD_CARRIER_SIZE] = [0; FD_CARRIER_SIZE];

/// INIT_ACK status meaning the backend accepted the init message.
pub const INIT_ACK_OK: u16 = 0;

/// Message kinds understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Queue activity notification (backend to device).
    Kick = 0,
    /// Node identity and memory descriptor (device to backend).
    Init = 1,
    /// Backend acknowledgment of INIT.
    InitAck = 2,
    /// Device is ready to exchange notifications.
    Reconfigure = 3,
}

impl MessageKind {
    /// Map a raw tag to a known kind.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Kick),
            1 => Some(MessageKind::Init),
            2 => Some(MessageKind::InitAck),
            3 => Some(MessageKind::Reconfigure),
            _ => None,
        }
    }

    /// Raw tag for this kind.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Fixed-size message envelope.
///
/// The kind is kept raw so unknown tags survive decoding and can be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// Raw message-kind tag.
    pub kind: u8,
    /// Queue index or status, depending on the kind.
    pub value: u16,
}

impl Envelope {
    /// Create an envelope of a known kind.
    pub fn new(kind: MessageKind, value: u16) -> Self {
        Self {
            kind: kind.as_u8(),
            value,
        }
    }

    /// KICK for `queue_index`.
    pub fn kick(queue_index: u16) -> Self {
        Self::new(MessageKind::Kick, queue_index)
    }

    /// INIT_ACK carrying `status`.
    pub fn init_ack(status: u16) -> Self {
        Self::new(MessageKind::InitAck, status)
    }

    /// RECONFIGURE (no value).
    pub fn reconfigure() -> Self {
        Self::new(MessageKind::Reconfigure, 0)
    }

    /// The kind, if the tag is known.
    #[inline]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_u8(self.kind)
    }

    /// Encode to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use vnet_ipc_client::protocol::Envelope;
    ///
    /// assert_eq!(Envelope::kick(3).encode(), [0, 0, 3]);
    /// ```
    pub fn encode(&self) -> [u8; ENVELOPE_SIZE] {
        let mut buf = [0u8; ENVELOPE_SIZE];
        let mut cursor = &mut buf[..];
        self.encode_into(&mut cursor);
        buf
    }

    /// Append the encoded envelope to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind);
        buf.put_u16(self.value);
    }

    /// Decode from bytes (Big Endian).
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENVELOPE_SIZE {
            return None;
        }
        let mut buf = buf;
        Some(Self {
            kind: buf.get_u8(),
            value: buf.get_u16(),
        })
    }
}

/// First handshake message: who we are and what memory the backend may map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitMessage {
    /// Node identifier of the device.
    pub node_id: u32,
    /// Length of the guest memory region.
    pub memory_size: u64,
    /// Upper bound the backend applies when mapping guest memory.
    pub size_ceiling: u32,
}

impl InitMessage {
    /// Append the encoded message (envelope + body) to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        Envelope::new(MessageKind::Init, 0).encode_into(buf);
        buf.put_u32(self.node_id);
        buf.put_u64(self.memory_size);
        buf.put_u32(self.size_ceiling);
    }

    /// Encode into a freshly allocated buffer.
    ///
    /// Allocation failure is reported as [`LinkError::ResourceExhausted`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(INIT_MESSAGE_SIZE)?;
        self.encode_into(&mut buf);
        Ok(buf)
    }

    /// Decode an INIT message, envelope included.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < INIT_MESSAGE_SIZE {
            return Err(LinkError::Protocol(format!(
                "init message needs {} bytes, got {}",
                INIT_MESSAGE_SIZE,
                buf.len()
            )));
        }
        let mut buf = buf;
        let kind = buf.get_u8();
        if MessageKind::from_u8(kind) != Some(MessageKind::Init) {
            return Err(LinkError::Protocol(format!(
                "expected init message, got kind {}",
                kind
            )));
        }
        let _ = buf.get_u16();
        Ok(Self {
            node_id: buf.get_u32(),
            memory_size: buf.get_u64(),
            size_ceiling: buf.get_u32(),
        })
    }
}
