//! Connection state machine.
//!
//! The [`Client`] owns one device's channel to the backend:
//! 1. Attach: obtain the memory region, encode INIT, arm the connect timer
//! 2. Timer fires: connect and handshake; on failure re-arm and wait
//! 3. On success: signal link-up and register the channel for readiness
//! 4. While connected: dispatch envelopes to the device
//! 5. On stream failure: deregister, close, signal link-down, arm the retry
//!
//! All transitions happen inside calls made by the embedding event loop
//! ([`Client::on_timer`], [`Client::on_readable`], [`Client::detach`]).
//!
//! # Example
//!
//! ```ignore
//! use vnet_ipc_client::{ChannelConfig, Client, UnixTransport};
//!
//! let config = ChannelConfig::new("/var/run/switch.sock", 1);
//! let mut client = Client::attach(config, UnixTransport::new(), reactor, device)?;
//!
//! // From the event loop:
//! client.on_timer(timer_id);
//! client.on_readable(channel_id);
//!
//! client.detach();
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::config::ChannelConfig;
use crate::control::{self, ReadyChannel};
use crate::dispatch::{self, ReadOutcome};
use crate::error::{LinkError, Result};
use crate::host::{ChannelId, Device, MemoryRegion, Reactor, TimerId};
use crate::protocol::InitMessage;
use crate::retry::RetryTimer;
use crate::transport::Transport;

static NEXT_CHANNEL_ID: AtomicU32 = AtomicU32::new(1);

/// Lifecycle phase of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Attached, no attempt made yet.
    Idle,
    /// Opening and connecting an endpoint.
    Connecting,
    /// Exchanging the handshake.
    Handshaking,
    /// Handshake done; envelopes are dispatched.
    Connected,
    /// Waiting for the retry timer.
    Disconnected,
    /// Torn down; every callback is a no-op.
    Detached,
}

/// Counters describing the channel's history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Connection attempts started.
    pub connect_attempts: u64,
    /// Attempts that failed to open or connect an endpoint.
    pub connect_failures: u64,
    /// Attempts that connected but failed the handshake.
    pub handshake_failures: u64,
    /// Transitions into `Connected`.
    pub links_up: u64,
    /// Transitions out of `Connected`.
    pub links_down: u64,
    /// KICKs delivered to the device.
    pub kicks_delivered: u64,
    /// Envelopes read and discarded.
    pub messages_ignored: u64,
}

/// What currently drives the next transition.
///
/// Holding a live channel and an armed retry at the same time is
/// unrepresentable.
#[derive(Debug)]
enum Slot<E> {
    Empty,
    Retry(RetryTimer),
    Live(ReadyChannel<E>),
}

/// Client side of one device's channel to the backend.
pub struct Client<T: Transport, R: Reactor, D: Device> {
    config: ChannelConfig,
    channel: ChannelId,
    transport: T,
    reactor: R,
    device: D,
    memory: MemoryRegion,
    init_message: Vec<u8>,
    slot: Slot<T::Endpoint>,
    phase: Phase,
    stats: LinkStats,
}

impl<T: Transport, R: Reactor, D: Device> Client<T, R, D> {
    /// Attach to `device` and arm the first connection attempt.
    ///
    /// Fails only if the configuration is invalid, the device cannot provide
    /// its memory region, or channel state cannot be allocated. A backend
    /// that is absent or misbehaving is not an error here: the client keeps
    /// retrying until detached.
    ///
    /// No I/O happens here: the client stays [`Phase::Idle`] until the
    /// first timer fires one retry interval later.
    pub fn attach(config: ChannelConfig, transport: T, reactor: R, mut device: D) -> Result<Self> {
        config.validate()?;

        let memory = device.memory_region().map_err(LinkError::MemoryRegion)?;
        let init_message = InitMessage {
            node_id: config.node_id,
            memory_size: memory.size(),
            size_ceiling: config.size_ceiling,
        }
        .encode()?;

        let channel = ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(
            "{} attached for node {} ({} bytes of guest memory)",
            channel,
            config.node_id,
            memory.size()
        );

        let mut client = Self {
            config,
            channel,
            transport,
            reactor,
            device,
            memory,
            init_message,
            slot: Slot::Empty,
            phase: Phase::Idle,
            stats: LinkStats::default(),
        };
        client.slot = Slot::Retry(RetryTimer::arm(
            &mut client.reactor,
            client.config.retry_interval(),
        ));
        Ok(client)
    }

    /// Timer callback from the event loop.
    ///
    /// Only the currently armed retry triggers a new attempt; anything else
    /// is stale and ignored.
    pub fn on_timer(&mut self, timer: TimerId) {
        if self.phase == Phase::Detached {
            tracing::debug!("{} ignoring {} after detach", self.channel, timer);
            return;
        }
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Retry(armed) if armed.matches(timer) => {}
            other => {
                self.slot = other;
                tracing::debug!("{} ignoring stale {}", self.channel, timer);
                return;
            }
        }
        self.connect();
    }

    /// Readiness callback from the event loop.
    ///
    /// Reads at most one envelope. Call again while the outcome
    /// [may have more](ReadOutcome::may_have_more).
    pub fn on_readable(&mut self, channel: ChannelId) -> ReadOutcome {
        if channel != self.channel {
            tracing::debug!("{} ignoring readiness for {}", self.channel, channel);
            return ReadOutcome::Stale;
        }
        let Slot::Live(ready) = &mut self.slot else {
            tracing::debug!("{} readable while {:?}", self.channel, self.phase);
            return ReadOutcome::Stale;
        };

        match dispatch::dispatch(ready, &mut self.device) {
            Ok(outcome) => {
                match outcome {
                    ReadOutcome::Delivered(_) => self.stats.kicks_delivered += 1,
                    ReadOutcome::Ignored => self.stats.messages_ignored += 1,
                    _ => {}
                }
                outcome
            }
            Err(e) => {
                tracing::warn!("{} can't receive data from backend: {}", self.channel, e);
                self.release();
                self.wait_for_retry();
                ReadOutcome::Disconnected
            }
        }
    }

    /// Tear the channel down. Safe to call more than once.
    ///
    /// Cancels a pending retry, deregisters and closes a live channel
    /// (signalling link-down), and turns every later callback into a no-op.
    pub fn detach(&mut self) {
        if self.phase == Phase::Detached {
            return;
        }
        self.release();
        self.phase = Phase::Detached;
        self.init_message = Vec::new();
        tracing::debug!("{} detached", self.channel);
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Stable channel id used for readiness registration.
    pub fn channel_id(&self) -> ChannelId {
        self.channel
    }

    /// Whether the handshake completed and the channel is live.
    ///
    /// Attempts run to completion inside one callback, so this is also the
    /// only time a transport handle is held.
    pub fn is_connected(&self) -> bool {
        matches!(self.slot, Slot::Live(_))
    }

    /// Whether a retry timer is currently armed.
    pub fn has_pending_retry(&self) -> bool {
        matches!(self.slot, Slot::Retry(_))
    }

    /// Id of the armed retry timer, if any.
    pub fn pending_retry(&self) -> Option<TimerId> {
        match &self.slot {
            Slot::Retry(timer) => Some(timer.id()),
            _ => None,
        }
    }

    /// Channel statistics.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// The channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Get a reference to the device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get a mutable reference to the device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Get a reference to the reactor.
    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    /// Get a mutable reference to the reactor.
    pub fn reactor_mut(&mut self) -> &mut R {
        &mut self.reactor
    }

    /// One attempt: Connecting → Handshaking → Connected, or Disconnected.
    fn connect(&mut self) {
        self.phase = Phase::Connecting;
        self.stats.connect_attempts += 1;

        match self.establish() {
            Ok(ready) => {
                let fd = ready.raw_fd();
                self.slot = Slot::Live(ready);
                self.phase = Phase::Connected;
                self.stats.links_up += 1;
                tracing::info!(
                    "{} connected to {} (node {})",
                    self.channel,
                    self.config.socket_path,
                    self.config.node_id
                );
                self.device.set_link_status(true);
                self.reactor.register_readiness(self.channel, fd);
            }
            Err(e) => {
                if matches!(e, LinkError::Handshake { .. }) {
                    self.stats.handshake_failures += 1;
                } else {
                    self.stats.connect_failures += 1;
                }
                tracing::warn!("{} connection attempt failed: {}", self.channel, e);
                self.wait_for_retry();
            }
        }
    }

    fn establish(&mut self) -> Result<ReadyChannel<T::Endpoint>> {
        let mut endpoint = self.transport.open()?;
        self.transport
            .connect(&mut endpoint, &self.config.socket_path)?;

        self.phase = Phase::Handshaking;
        control::perform(endpoint, self.channel, &self.init_message, &self.memory)
    }

    fn wait_for_retry(&mut self) {
        debug_assert!(matches!(self.slot, Slot::Empty));
        self.phase = Phase::Disconnected;
        self.slot = Slot::Retry(RetryTimer::arm(
            &mut self.reactor,
            self.config.retry_interval(),
        ));
    }

    /// Release whatever the slot holds. The only teardown path.
    fn release(&mut self) {
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Empty => {}
            Slot::Retry(timer) => timer.cancel(&mut self.reactor),
            Slot::Live(ready) => {
                self.reactor.deregister_readiness(ready.id());
                ready.close();
                self.stats.links_down += 1;
                tracing::info!("{} link down", self.channel);
                self.device.set_link_status(false);
            }
        }
    }
}

impl<T: Transport, R: Reactor, D: Device> Drop for Client<T, R, D> {
    fn drop(&mut self) {
        self.detach();
    }
}
