//! Cancellable periodic timers
//!
//! Each timer is a spawned task that pushes a [`TimerEvent`] into the link
//! driver's event channel. Events carry the connection generation they were
//! started for; the driver ignores events whose generation is no longer
//! current, so an event already queued when a timer is cancelled does nothing.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Transmit,
    Liveness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug)]
pub struct PeriodicTimer {
    kind: TimerKind,
    token: CancellationToken,
}

impl PeriodicTimer {
    /// First tick fires one full `period` after spawning.
    pub fn spawn(
        kind: TimerKind,
        period: Duration,
        generation: u64,
        events: mpsc::Sender<TimerEvent>,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => {
                        trace!("{:?} timer (generation {}) cancelled", kind, generation);
                        break;
                    }
                    _ = ticker.tick() => {
                        let event = TimerEvent { kind, generation };
                        if events.send(event).await.is_err() {
                            debug!("{:?} timer stopping, driver gone", kind);
                            break;
                        }
                    }
                }
            }
        });

        Self { kind, token }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
