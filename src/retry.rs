//! Reconnect scheduling.
//!
//! Retries use the configured interval every time; there is no backoff.

use std::time::Duration;

use crate::host::{Reactor, TimerId};

/// A one-shot retry armed on the reactor.
///
/// Holding a `RetryTimer` means the timer may still fire. It is consumed by
/// either [`RetryTimer::cancel`] or the client accepting its callback.
#[derive(Debug)]
#[must_use = "an armed retry must be cancelled or awaited"]
pub struct RetryTimer {
    id: TimerId,
}

impl RetryTimer {
    /// Arm a retry firing after `interval`.
    pub fn arm<R: Reactor>(reactor: &mut R, interval: Duration) -> Self {
        let id = reactor.schedule_once(interval);
        tracing::debug!("armed {} for {:?}", id, interval);
        Self { id }
    }

    /// Timer id the reactor will report.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Whether `fired` is this timer's callback.
    pub fn matches(&self, fired: TimerId) -> bool {
        self.id == fired
    }

    /// Cancel the timer on the reactor.
    pub fn cancel<R: Reactor>(self, reactor: &mut R) {
        tracing::debug!("cancelled {}", self.id);
        reactor.cancel_timer(self.id);
    }
}
