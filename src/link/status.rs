use chrono::{DateTime, Local};
use std::fmt;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "Disconnected"),
            LinkState::Connecting => write!(f, "Connecting"),
            LinkState::Connected => write!(f, "Connected"),
        }
    }
}

/// Snapshot published on the status watch channel after every change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub enabled: bool,
    /// `host:port` of the current or last attempted peer
    pub peer: Option<String>,
    pub packets_rx: u64,
    pub packets_tx: u64,
    /// Frames dropped by receive-side checksum verification
    pub rx_rejected: u64,
    pub average_latency_ms: f64,
    pub controller_count: usize,
    pub connection_start: Option<DateTime<Local>>,
    /// Advances with every transmit tick while connected
    pub connection_end: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(peer) = &self.peer {
            write!(f, " ({})", peer)?;
        }
        write!(
            f,
            ", {}, controllers: {}, rx: {}, tx: {}, rejected: {}, latency: {:.1} ms",
            if self.enabled { "enabled" } else { "disabled" },
            self.controller_count,
            self.packets_rx,
            self.packets_tx,
            self.rx_rejected,
            self.average_latency_ms
        )?;
        if let Some(error) = &self.last_error {
            write!(f, ", last error: {}", error)?;
        }
        Ok(())
    }
}
