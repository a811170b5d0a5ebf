//! Error types for vnet-ipc-client.
//!
//! Every variant except [`LinkError::MemoryRegion`], [`LinkError::ResourceExhausted`]
//! and [`LinkError::Config`] is recoverable: the client tears down whatever the
//! failed attempt acquired and waits for the retry timer.

use std::collections::TryReserveError;
use std::fmt;

use thiserror::Error;

/// Step of the handshake that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// Sending the init message and the memory region handle.
    Init,
    /// Waiting for the backend's acknowledgment.
    Acknowledge,
    /// Sending the reconfigure/ready message.
    Reconfigure,
    /// Switching the stream into steady-state (non-blocking) mode.
    Activate,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStage::Init => "init",
            HandshakeStage::Acknowledge => "acknowledge",
            HandshakeStage::Reconfigure => "reconfigure",
            HandshakeStage::Activate => "activate",
        };
        f.write_str(name)
    }
}

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Socket endpoint could not be created.
    #[error("failed to create endpoint: {0}")]
    EndpointCreation(#[source] std::io::Error),

    /// Endpoint could not be connected to the backend address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Write error or unexpected response during the handshake.
    #[error("handshake failed during {stage}: {reason}")]
    Handshake {
        stage: HandshakeStage,
        reason: String,
    },

    /// I/O error or orderly close while reading a steady-state envelope.
    #[error("stream read failed: {0}")]
    StreamRead(#[source] std::io::Error),

    /// Allocation failure while building per-instance channel state.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[from] TryReserveError),

    /// The host could not provide the guest memory region.
    #[error("memory region unavailable: {0}")]
    MemoryRegion(#[source] std::io::Error),

    /// Invalid channel configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON deserialization error (configuration only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed wire data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The event loop could not watch or wait on a descriptor.
    #[error("event loop error: {0}")]
    EventLoop(#[source] std::io::Error),
}

impl LinkError {
    /// Build a handshake error for `stage`.
    pub(crate) fn handshake(stage: HandshakeStage, reason: impl fmt::Display) -> Self {
        LinkError::Handshake {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Whether the client can recover from this error by retrying.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LinkError::ResourceExhausted(_)
                | LinkError::MemoryRegion(_)
                | LinkError::Config(_)
                | LinkError::Json(_)
        )
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
