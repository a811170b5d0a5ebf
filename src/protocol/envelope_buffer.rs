//! Buffer for assembling envelopes from a non-blocking stream.
//!
//! Uses `bytes::BytesMut` to hold the bytes of an envelope that arrived in
//! pieces. Reads never ask the stream for more than the current envelope
//! still needs, so any following envelope stays in the socket and keeps the
//! descriptor readable.
//!
//! # Example
//!
//! ```
//! use vnet_ipc_client::protocol::{Envelope, EnvelopeBuffer};
//!
//! let mut buffer = EnvelopeBuffer::new();
//! let mut stream: &[u8] = &[0, 0, 3];
//!
//! let envelope = buffer.read_from(&mut stream).unwrap();
//! assert_eq!(envelope, Some(Envelope::kick(3)));
//! ```

use std::io::{self, Read};

use bytes::BytesMut;

use super::wire_format::{Envelope, ENVELOPE_SIZE};

/// Accumulates partial reads until a complete envelope is available.
#[derive(Debug)]
pub struct EnvelopeBuffer {
    buffer: BytesMut,
}

impl EnvelopeBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(ENVELOPE_SIZE),
        }
    }

    /// Read from `reader` until one envelope is complete.
    ///
    /// Returns:
    /// - `Ok(Some(envelope))` once a full envelope has been assembled
    /// - `Ok(None)` if the reader would block; partial bytes are kept
    /// - `Err(..)` on I/O error or when the peer closed the stream
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<Option<Envelope>> {
        let mut chunk = [0u8; ENVELOPE_SIZE];

        loop {
            if let Some(envelope) = self.try_extract() {
                return Ok(Some(envelope));
            }

            let want = self.missing();
            match reader.read(&mut chunk[..want]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "backend closed the channel",
                    ))
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Take one complete envelope off the front of the buffer.
    pub fn try_extract(&mut self) -> Option<Envelope> {
        if self.buffer.len() < ENVELOPE_SIZE {
            return None;
        }
        let bytes = self.buffer.split_to(ENVELOPE_SIZE);
        Envelope::decode(&bytes)
    }

    /// Bytes still needed to complete the next envelope.
    pub fn missing(&self) -> usize {
        ENVELOPE_SIZE - self.buffer.len() % ENVELOPE_SIZE
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for EnvelopeBuffer {
    fn default() -> Self {
        Self::new()
    }
}
