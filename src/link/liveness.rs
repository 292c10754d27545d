use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(2000);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(1000);

/// Tracks the last accepted inbound frame of a connection.
///
/// The deadline is only evaluated when [`is_expired`](Self::is_expired) is
/// called, so a silent peer is noticed within one check interval after the
/// deadline passes.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    deadline: Duration,
    check_interval: Duration,
    last_rx: Option<Instant>,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE, DEFAULT_CHECK_INTERVAL)
    }
}

impl LivenessMonitor {
    pub fn new(deadline: Duration, check_interval: Duration) -> Self {
        Self {
            deadline,
            check_interval,
            last_rx: None,
        }
    }

    /// Restarts the deadline. Returns the time since the previous reset.
    pub fn reset(&mut self, now: Instant) -> Option<Duration> {
        let gap = self
            .last_rx
            .map(|last| now.saturating_duration_since(last));
        self.last_rx = Some(now);
        gap
    }

    /// True once more than the deadline has passed since the last reset.
    /// A monitor that was never reset does not expire.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.last_rx {
            Some(last) => now.saturating_duration_since(last) > self.deadline,
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.last_rx = None;
    }

    pub fn last_rx(&self) -> Option<Instant> {
        self.last_rx
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }
}
