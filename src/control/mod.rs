//! Control plane - the per-connection handshake.
//!
//! The handshake runs synchronously on a freshly connected endpoint. Once it
//! succeeds the endpoint becomes a [`ReadyChannel`] and all further traffic
//! is steady-state envelopes handled by the dispatcher.
//!
//! # Workflow
//!
//! 1. Client connects a fresh endpoint
//! 2. Client sends INIT and the memory region handle
//! 3. Backend answers INIT_ACK
//! 4. Client binds the endpoint to its channel id and sends RECONFIGURE
//! 5. KICK notifications flow from backend to client

pub mod handshake;

pub use handshake::{perform, ReadyChannel};
