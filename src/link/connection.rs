//! Connection bookkeeping
//!
//! [`Connection`] holds everything a link session knows about itself: state,
//! enable flag, counters, joystick values, liveness and latency. It is plain
//! synchronous state; the driver feeds it timer ticks and datagrams and
//! performs whatever IO the returned values ask for.
//!
//! Every connect attempt and every disconnect bumps the generation. Timer
//! events carry the generation they were started for and are ignored once it
//! no longer matches.

use super::error::LinkError;
use super::latency::LatencyTracker;
use super::liveness::LivenessMonitor;
use super::scheduler::{OutboundFrame, TransmissionScheduler};
use super::status::{LinkState, LinkStatus};
use crate::config::Config;
use crate::joystick::{JoystickError, JoystickStore};
use crate::protocol::checksum::{Checksum, Crc16};
use crate::protocol::frame::{self, Frame, FrameError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// What to do with a checksum trailer on inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RxChecksumPolicy {
    /// Frames are taken as they are; a trailer, if any, stays in the payload
    #[default]
    Ignore,
    /// Frames must end in a valid checksum; others are dropped and counted
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// Event from a previous connection
    Stale,
    Alive,
    Expired,
}

/// An inbound datagram that counted as traffic from the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted<'a> {
    /// `None` for an empty datagram
    pub frame: Option<Frame<'a>>,
    pub chart_sample: Option<u64>,
}

pub struct Connection {
    state: LinkState,
    enabled: bool,
    generation: u64,
    peer: Option<String>,
    rx_count: u64,
    tx_count: u64,
    rx_rejected: u64,
    average_latency_ms: f64,
    connection_start: Option<DateTime<Local>>,
    connection_end: Option<DateTime<Local>>,
    last_error: Option<String>,
    joysticks: JoystickStore,
    scheduler: TransmissionScheduler,
    liveness: LivenessMonitor,
    latency: LatencyTracker,
    rx_policy: RxChecksumPolicy,
    checksum: Arc<dyn Checksum>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("generation", &self.generation)
            .field("peer", &self.peer)
            .field("rx_count", &self.rx_count)
            .field("tx_count", &self.tx_count)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Uses the built-in checksum selected in the configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_checksum(config, Arc::new(Crc16::new(config.protocol.checksum)))
    }

    pub fn with_checksum(config: &Config, checksum: Arc<dyn Checksum>) -> Self {
        Self {
            state: LinkState::Disconnected,
            enabled: false,
            generation: 0,
            peer: None,
            rx_count: 0,
            tx_count: 0,
            rx_rejected: 0,
            average_latency_ms: 0.0,
            connection_start: None,
            connection_end: None,
            last_error: None,
            joysticks: JoystickStore::new(),
            scheduler: TransmissionScheduler::new(
                config.link.transmit_period(),
                config.protocol.packing,
                Arc::clone(&checksum),
            ),
            liveness: LivenessMonitor::new(
                config.link.liveness_timeout(),
                config.link.liveness_check_interval(),
            ),
            latency: LatencyTracker::new(
                config.latency.window,
                config.latency.chart_sample_interval(),
            ),
            rx_policy: config.protocol.rx_checksum,
            checksum,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scheduler(&self) -> &TransmissionScheduler {
        &self.scheduler
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Disconnected -> Connecting. Returns the generation of the attempt.
    pub fn begin_connect(&mut self, host: &str, port: u16) -> Result<u64, LinkError> {
        if self.state != LinkState::Disconnected {
            return Err(LinkError::AlreadyConnected { state: self.state });
        }
        self.generation += 1;
        self.state = LinkState::Connecting;
        self.peer = Some(format!("{}:{}", host, port));
        self.last_error = None;
        debug!(
            "Connecting to {}:{} (generation {})",
            host, port, self.generation
        );
        Ok(self.generation)
    }

    /// Connecting -> Connected with fresh counters. The liveness deadline
    /// starts now.
    pub fn opened(&mut self, now: Instant) {
        self.state = LinkState::Connected;
        self.rx_count = 0;
        self.tx_count = 0;
        self.rx_rejected = 0;
        self.connection_start = Some(Local::now());
        self.connection_end = None;
        self.latency.reset();
        self.average_latency_ms = 0.0;
        self.liveness.reset(now);
        info!(
            "Connected to {}",
            self.peer.as_deref().unwrap_or("unknown peer")
        );
    }

    /// Connecting -> Disconnected after a failed open.
    pub fn open_failed(&mut self, error: &LinkError) {
        self.generation += 1;
        self.state = LinkState::Disconnected;
        self.enabled = false;
        self.last_error = Some(error.to_string());
    }

    /// Only takes effect while connected.
    pub fn enable(&mut self) -> bool {
        if self.state != LinkState::Connected {
            debug!("Ignoring enable while {}", self.state);
            return false;
        }
        if !self.enabled {
            info!("Robot enabled");
        }
        self.enabled = true;
        true
    }

    pub fn disable(&mut self) {
        if self.enabled {
            info!("Robot disabled");
        }
        self.enabled = false;
    }

    pub fn set_controller_count(&mut self, count: usize) -> usize {
        self.joysticks.set_controller_count(count)
    }

    pub fn set_channel(&mut self, slot: usize, channel: usize, value: u8) -> Result<(), JoystickError> {
        self.joysticks.set_channel(slot, channel, value)
    }

    /// Frame to send for a transmit tick, or `None` if the tick is stale.
    /// The tick counts as sent before the send is attempted.
    pub fn on_tx_tick(&mut self, generation: u64) -> Option<OutboundFrame> {
        if generation != self.generation || self.state != LinkState::Connected {
            trace!("Dropping stale transmit tick (generation {})", generation);
            return None;
        }
        self.tx_count += 1;
        self.connection_end = Some(Local::now());
        Some(self.scheduler.next_frame(self.enabled, &self.joysticks))
    }

    pub fn check_liveness(&self, generation: u64, now: Instant) -> LivenessVerdict {
        if generation != self.generation || self.state != LinkState::Connected {
            return LivenessVerdict::Stale;
        }
        if self.liveness.is_expired(now) {
            LivenessVerdict::Expired
        } else {
            LivenessVerdict::Alive
        }
    }

    /// Applies an inbound datagram. Returns `None` when it does not count as
    /// traffic: not connected, or rejected by checksum verification.
    pub fn on_datagram<'a>(&mut self, datagram: &'a [u8], now: Instant) -> Option<Accepted<'a>> {
        if self.state != LinkState::Connected {
            trace!("Ignoring {} bytes while {}", datagram.len(), self.state);
            return None;
        }

        let frame = match self.rx_policy {
            RxChecksumPolicy::Ignore => match frame::decode(datagram) {
                Ok(frame) => Some(frame),
                Err(FrameError::Empty) => None,
                Err(e) => {
                    trace!("Dropping malformed frame: {}", e);
                    return None;
                }
            },
            RxChecksumPolicy::Verify => {
                match frame::decode_verified(datagram, self.checksum.as_ref()) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        self.rx_rejected += 1;
                        trace!("Rejecting frame: {}", e);
                        return None;
                    }
                }
            }
        };

        self.rx_count += 1;
        let chart_sample = self.liveness.reset(now).and_then(|gap| {
            let update = self.latency.record(gap, now);
            self.average_latency_ms = update.average_ms;
            update.chart_sample
        });
        trace!("RX: {}", frame::hex_dump(datagram));

        Some(Accepted {
            frame,
            chart_sample,
        })
    }

    /// Back to Disconnected with zeroed counters. Returns false if there was
    /// nothing to tear down.
    pub fn disconnect(&mut self) -> bool {
        self.enabled = false;
        if self.state == LinkState::Disconnected {
            return false;
        }

        self.generation += 1;
        self.state = LinkState::Disconnected;
        self.rx_count = 0;
        self.tx_count = 0;
        self.rx_rejected = 0;
        self.latency.reset();
        self.average_latency_ms = 0.0;
        self.liveness.clear();
        if self.connection_start.is_some() {
            self.connection_end = Some(Local::now());
        }
        true
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            enabled: self.enabled,
            peer: self.peer.clone(),
            packets_rx: self.rx_count,
            packets_tx: self.tx_count,
            rx_rejected: self.rx_rejected,
            average_latency_ms: self.average_latency_ms,
            controller_count: self.joysticks.controller_count(),
            connection_start: self.connection_start,
            connection_end: self.connection_end,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::append_checksum;
    use std::time::Duration;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn connected(config: &Config) -> Result<(Connection, u64, Instant), LinkError> {
        let mut connection = Connection::new(config);
        let generation = connection.begin_connect("10.0.0.22", 22211)?;
        let now = Instant::now();
        connection.opened(now);
        Ok((connection, generation, now))
    }

    #[test]
    fn connect_only_from_disconnected() -> TestResult {
        let config = Config::default();
        let mut connection = Connection::new(&config);
        connection.begin_connect("10.0.0.22", 22211)?;
        assert_eq!(connection.state(), LinkState::Connecting);
        assert!(matches!(
            connection.begin_connect("10.0.0.22", 22211),
            Err(LinkError::AlreadyConnected {
                state: LinkState::Connecting
            })
        ));
        Ok(())
    }

    #[test]
    fn enable_needs_a_connection() -> TestResult {
        let config = Config::default();
        let mut connection = Connection::new(&config);
        assert!(!connection.enable());
        assert!(!connection.is_enabled());
        connection.disable();

        let (mut connection, _, _) = connected(&config)?;
        assert!(connection.enable());
        assert!(connection.is_enabled());
        connection.disable();
        assert!(!connection.is_enabled());
        Ok(())
    }

    #[test]
    fn ticks_count_and_pick_frames() -> TestResult {
        let config = Config::default();
        let (mut connection, generation, _) = connected(&config)?;

        let frame = connection.on_tx_tick(generation);
        assert_eq!(frame, Some(OutboundFrame::Heartbeat(vec![0x68, 0xEE, 0x01])));

        connection.set_controller_count(1);
        connection.enable();
        let frame = connection.on_tx_tick(generation);
        assert!(matches!(frame, Some(OutboundFrame::Joystick(ref bytes)) if bytes.len() == 27));

        assert_eq!(connection.status().packets_tx, 2);
        assert!(connection.status().connection_end.is_some());
        Ok(())
    }

    #[test]
    fn stale_generations_are_ignored() -> TestResult {
        let config = Config::default();
        let (mut connection, generation, now) = connected(&config)?;
        connection.disconnect();

        assert_eq!(connection.on_tx_tick(generation), None);
        assert_eq!(
            connection.check_liveness(generation, now + Duration::from_secs(10)),
            LivenessVerdict::Stale
        );

        let next = connection.begin_connect("10.0.0.22", 22211)?;
        connection.opened(now);
        assert_ne!(next, generation);
        assert_eq!(connection.on_tx_tick(generation), None);
        assert!(connection.on_tx_tick(next).is_some());
        Ok(())
    }

    #[test]
    fn liveness_expires_after_silence() -> TestResult {
        let config = Config::default();
        let (mut connection, generation, start) = connected(&config)?;

        let at = |ms| start + Duration::from_millis(ms);
        assert_eq!(connection.check_liveness(generation, at(1000)), LivenessVerdict::Alive);
        assert_eq!(connection.check_liveness(generation, at(2000)), LivenessVerdict::Alive);

        connection.on_datagram(b"s", at(1500));
        assert_eq!(connection.check_liveness(generation, at(3000)), LivenessVerdict::Alive);
        assert_eq!(connection.check_liveness(generation, at(4000)), LivenessVerdict::Expired);
        Ok(())
    }

    #[test]
    fn datagrams_feed_counters_and_latency() -> TestResult {
        let config = Config::default();
        let (mut connection, _, start) = connected(&config)?;

        let accepted = connection.on_datagram(b"phello", start + Duration::from_millis(40));
        let frame = accepted.and_then(|a| a.frame);
        assert_eq!(frame.map(|f| f.payload), Some(&b"hello"[..]));

        let accepted = connection.on_datagram(&[], start + Duration::from_millis(100));
        assert_eq!(accepted.map(|a| a.frame), Some(None));

        let status = connection.status();
        assert_eq!(status.packets_rx, 2);
        // gaps of 40 and 60 ms
        assert_eq!(status.average_latency_ms, 50.0);
        Ok(())
    }

    #[test]
    fn first_sample_is_charted() -> TestResult {
        let config = Config::default();
        let (mut connection, _, start) = connected(&config)?;

        let first = connection.on_datagram(b"s", start + Duration::from_millis(25));
        assert_eq!(first.and_then(|a| a.chart_sample), Some(25));
        let second = connection.on_datagram(b"s", start + Duration::from_millis(50));
        assert_eq!(second.and_then(|a| a.chart_sample), None);
        Ok(())
    }

    #[test]
    fn verify_policy_rejects_bad_trailers() -> TestResult {
        let mut config = Config::default();
        config.protocol.rx_checksum = RxChecksumPolicy::Verify;
        let (mut connection, generation, start) = connected(&config)?;

        let mut good = b"sok".to_vec();
        append_checksum(&mut good, &Crc16::default());
        let accepted = connection.on_datagram(&good, start);
        assert_eq!(
            accepted.and_then(|a| a.frame).map(|f| f.payload),
            Some(&b"ok"[..])
        );

        let late = start + Duration::from_millis(1900);
        assert_eq!(connection.on_datagram(b"sok\x00\x00", late), None);
        assert_eq!(connection.on_datagram(&[], late), None);

        let status = connection.status();
        assert_eq!(status.packets_rx, 1);
        assert_eq!(status.rx_rejected, 2);
        // rejected frames do not keep the link alive
        assert_eq!(
            connection.check_liveness(generation, start + Duration::from_millis(2001)),
            LivenessVerdict::Expired
        );
        Ok(())
    }

    #[test]
    fn disconnect_resets_and_is_idempotent() -> TestResult {
        let config = Config::default();
        let (mut connection, generation, start) = connected(&config)?;
        connection.enable();
        connection.on_tx_tick(generation);
        connection.on_datagram(b"s", start + Duration::from_millis(10));

        assert!(connection.disconnect());
        let status = connection.status();
        assert_eq!(status.state, LinkState::Disconnected);
        assert!(!status.enabled);
        assert_eq!((status.packets_rx, status.packets_tx), (0, 0));
        assert_eq!(status.average_latency_ms, 0.0);

        let generation_after = connection.generation();
        assert!(!connection.disconnect());
        assert_eq!(connection.generation(), generation_after);
        assert_eq!(connection.status().state, LinkState::Disconnected);
        Ok(())
    }

    #[test]
    fn datagrams_while_disconnected_are_ignored() {
        let config = Config::default();
        let mut connection = Connection::new(&config);
        assert_eq!(connection.on_datagram(b"phi", Instant::now()), None);
        assert_eq!(connection.status().packets_rx, 0);
    }

    #[test]
    fn open_failure_records_the_error() -> TestResult {
        let config = Config::default();
        let mut connection = Connection::new(&config);
        connection.begin_connect("10.0.0.22", 22211)?;
        connection.open_failed(&LinkError::OpenTimeout {
            host: "10.0.0.22".into(),
            port: 22211,
            timeout_ms: 3000,
        });

        let status = connection.status();
        assert_eq!(status.state, LinkState::Disconnected);
        assert!(status.last_error.is_some());
        Ok(())
    }
}
