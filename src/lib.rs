//! # vnet-ipc-client
//!
//! Client side of the link between a virtual network device and its
//! packet-switching backend process.
//!
//! The device shares its guest memory with the backend over a Unix domain
//! socket. After a short handshake the backend sends queue notifications
//! (KICKs) that the client forwards to the device. When the backend is absent
//! or goes away, the client retries at a fixed interval until it comes back.
//!
//! ## Architecture
//!
//! - **Handshake** (blocking): INIT + memory descriptor, INIT_ACK, RECONFIGURE
//! - **Steady state** (non-blocking): 3-byte envelopes, one per readiness call
//! - **Host seams**: [`Reactor`] for timers and readiness, [`Device`] for the NIC
//!
//! ## Example
//!
//! ```ignore
//! use tokio::sync::oneshot;
//! use vnet_ipc_client::driver::{run, TokioReactor};
//! use vnet_ipc_client::{ChannelConfig, Client, UnixTransport};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> vnet_ipc_client::Result<()> {
//!     let config = ChannelConfig::new("/var/run/switch.sock", 1).retry_interval_secs(2);
//!     let client = Client::attach(config, UnixTransport::new(), TokioReactor::new(), device)?;
//!
//!     let (_stop, shutdown) = oneshot::channel();
//!     run(client, shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod host;
pub mod protocol;
pub mod retry;
pub mod transport;

mod client;
#[cfg(test)]
mod testing;

pub use client::{Client, LinkStats, Phase};
pub use config::ChannelConfig;
pub use dispatch::ReadOutcome;
pub use error::{HandshakeStage, LinkError, Result};
pub use host::{ChannelId, Device, MemoryRegion, Reactor, TimerId};
pub use transport::{UnixEndpoint, UnixTransport};
