//! Reference event loop on tokio.
//!
//! [`TokioReactor`] records what the client asks for (one deadline, one
//! watched descriptor) and [`run`] turns those records into a `select!` over
//! a sleep, an `AsyncFd` readiness wait and a shutdown signal.
//!
//! # Architecture
//!
//! ```text
//! sleep_until(deadline) ──► Client::on_timer ──► connect + handshake
//! AsyncFd::readable     ──► Client::on_readable (until WouldBlock)
//! shutdown (oneshot)    ──► Client::detach
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tokio::sync::oneshot;
//! use vnet_ipc_client::driver::{run, TokioReactor};
//! use vnet_ipc_client::{ChannelConfig, Client, UnixTransport};
//!
//! let client = Client::attach(config, UnixTransport::new(), TokioReactor::new(), device)?;
//! let (stop, shutdown) = oneshot::channel();
//! let client = run(client, shutdown).await?;
//! ```

use std::future::pending;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

use tokio::io::unix::{AsyncFd, AsyncFdReadyGuard};
use tokio::io::Interest;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};

use crate::client::{Client, Phase};
use crate::dispatch::ReadOutcome;
use crate::error::{LinkError, Result};
use crate::host::{ChannelId, Device, Reactor, TimerId};
use crate::transport::Transport;

/// Descriptor registration requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watch {
    channel: ChannelId,
    fd: RawFd,
    generation: u64,
}

/// [`Reactor`] backed by the tokio timer and I/O driver.
///
/// Holds at most one deadline and one watched descriptor, which is all a
/// single client ever needs.
#[derive(Debug, Default)]
pub struct TokioReactor {
    next_timer: u64,
    timer: Option<(TimerId, Instant)>,
    watch: Option<Watch>,
    generation: u64,
}

impl TokioReactor {
    /// Create a reactor with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The armed timer and when it fires.
    pub fn deadline(&self) -> Option<(TimerId, Instant)> {
        self.timer
    }

    /// The channel and descriptor currently watched.
    pub fn watched(&self) -> Option<(ChannelId, RawFd)> {
        self.watch.map(|w| (w.channel, w.fd))
    }

    fn expire(&mut self, timer: TimerId) {
        if matches!(self.timer, Some((id, _)) if id == timer) {
            self.timer = None;
        }
    }
}

impl Reactor for TokioReactor {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.timer = Some((id, Instant::now() + delay));
        id
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        self.expire(timer);
    }

    fn register_readiness(&mut self, channel: ChannelId, fd: RawFd) {
        self.generation += 1;
        self.watch = Some(Watch {
            channel,
            fd,
            generation: self.generation,
        });
    }

    fn deregister_readiness(&mut self, channel: ChannelId) {
        if matches!(self.watch, Some(w) if w.channel == channel) {
            self.watch = None;
        }
    }
}

/// Drive `client` until `shutdown` fires or its sender is dropped.
///
/// Returns the detached client. Connect and handshake run inline on the
/// calling task, so a stalled backend stalls this loop until it answers.
pub async fn run<T, D>(
    mut client: Client<T, TokioReactor, D>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<Client<T, TokioReactor, D>>
where
    T: Transport,
    D: Device,
{
    // Readiness is tracked on a duplicate so the registration never outlives
    // the descriptor it watches, even after the client closes its own.
    let mut registered: Option<(Watch, AsyncFd<OwnedFd>)> = None;

    loop {
        if client.phase() == Phase::Detached {
            return Ok(client);
        }

        let wanted = client.reactor().watch;
        if registered.as_ref().map(|(w, _)| *w) != wanted {
            registered = None;
            if let Some(watch) = wanted {
                registered = Some((watch, watch_fd(watch.fd)?));
            }
        }
        let deadline = client.reactor().timer;

        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("{} shutting down", client.channel_id());
                client.detach();
                return Ok(client);
            }
            timer = wait_deadline(deadline) => {
                client.reactor_mut().expire(timer);
                client.on_timer(timer);
            }
            readable = wait_readable(registered.as_ref()) => {
                let (channel, mut guard) = match readable {
                    Ok(ready) => ready,
                    Err(e) => {
                        tracing::error!("{} readiness wait failed: {}", client.channel_id(), e);
                        return Err(LinkError::EventLoop(e));
                    }
                };
                loop {
                    let outcome = client.on_readable(channel);
                    if outcome == ReadOutcome::WouldBlock {
                        guard.clear_ready();
                    }
                    if !outcome.may_have_more() {
                        break;
                    }
                }
            }
        }
    }
}

fn watch_fd(fd: RawFd) -> Result<AsyncFd<OwnedFd>> {
    // SAFETY: `fd` is the client's live registration; it stays open until
    // the client deregisters, and the duplicate is taken before that.
    let dup = unsafe { BorrowedFd::borrow_raw(fd) }
        .try_clone_to_owned()
        .map_err(LinkError::EventLoop)?;
    // SAFETY: `dup` is open, owned by the returned AsyncFd and never replaced.
    unsafe { AsyncFd::register_with_interest(dup, Interest::READABLE) }
        .map_err(|e| LinkError::EventLoop(e.into()))
}

async fn wait_deadline(deadline: Option<(TimerId, Instant)>) -> TimerId {
    match deadline {
        Some((timer, at)) => {
            sleep_until(at).await;
            timer
        }
        None => pending().await,
    }
}

async fn wait_readable(
    registered: Option<&(Watch, AsyncFd<OwnedFd>)>,
) -> io::Result<(ChannelId, AsyncFdReadyGuard<'_, OwnedFd>)> {
    match registered {
        Some((watch, fd)) => {
            let guard = fd.readable().await?;
            Ok((watch.channel, guard))
        }
        None => pending().await,
    }
}
