//! Protocol module - wire format and envelope assembly.
//!
//! - 3-byte envelope encoding/decoding
//! - INIT message layout
//! - Envelope buffer for partial reads on a non-blocking stream

mod envelope_buffer;
mod wire_format;

pub use envelope_buffer::EnvelopeBuffer;
pub use wire_format::{
    Envelope, InitMessage, MessageKind, ENVELOPE_SIZE, FD_CARRIER, FD_CARRIER_SIZE,
    INIT_ACK_OK, INIT_BODY_SIZE, INIT_MESSAGE_SIZE,
};
