//! Link driver with statum state machine
//!
//! Owns the [`Connection`], the transport and both timers, and runs as a
//! single tokio task. All outside requests arrive as [`LinkCommand`]s.
//!
//! # State Machine
//!
//! ```text
//!          connect              transport open
//! Idle ──────────────► Connecting ─────────────► Online
//!  ▲                       │                       │
//!  └───────────────────────┴───────────────────────┘
//!    open failure / timeout   disconnect / liveness timeout
//! ```

use super::connection::{Connection, LivenessVerdict};
use super::dispatch::RxDispatcher;
use super::error::LinkError;
use super::latency::LatencySample;
use super::scheduler::OutboundFrame;
use super::status::LinkStatus;
use super::timer::{PeriodicTimer, TimerEvent, TimerKind};
use super::transport::{Connector, Transport, TransportError};
use crate::config::Config;
use crate::protocol::frame::hex_dump;
use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

macro_rules! respond {
    ($response_tx:expr, $value:expr) => {
        if $response_tx.send($value).is_err() {
            debug!("Requester went away before the response");
        }
    };
}

/// Requests handled by the link task.
#[derive(Debug)]
pub enum LinkCommand {
    Connect {
        host: String,
        port: u16,
        response_tx: oneshot::Sender<Result<(), LinkError>>,
    },
    Enable {
        response_tx: oneshot::Sender<bool>,
    },
    Disable {
        response_tx: oneshot::Sender<()>,
    },
    Disconnect {
        response_tx: oneshot::Sender<bool>,
    },
    SetControllerCount {
        count: usize,
        response_tx: oneshot::Sender<usize>,
    },
    SetChannel {
        slot: usize,
        channel: usize,
        value: u8,
        response_tx: oneshot::Sender<Result<(), LinkError>>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub generation: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Idle,
    Connecting(ConnectTarget),
    Online,
}

struct Session {
    transport: Box<dyn Transport>,
    tx_timer: PeriodicTimer,
    liveness_timer: PeriodicTimer,
}

struct PendingConnect {
    host: String,
    port: u16,
    response_tx: oneshot::Sender<Result<(), LinkError>>,
}

enum Control {
    Continue,
    Disconnected,
    Shutdown,
}

enum Step {
    Command(Option<LinkCommand>),
    Timer(TimerEvent),
    Received(Result<Vec<u8>, TransportError>),
}

pub enum OpenOutcome {
    Online(LinkDriver<Online>),
    Failed(LinkDriver<Idle>),
    Shutdown,
}

#[machine]
pub struct LinkDriver<S: DriverState> {
    config: Config,
    connector: Arc<dyn Connector>,
    connection: Connection,
    dispatcher: RxDispatcher,
    commands: mpsc::Receiver<LinkCommand>,
    timer_tx: mpsc::Sender<TimerEvent>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    status: watch::Sender<LinkStatus>,
    chart: Option<mpsc::Sender<LatencySample>>,
    session: Option<Session>,
    pending_connect: Option<PendingConnect>,
}

impl<S: DriverState> LinkDriver<S> {
    /// Pushes a fresh snapshot to subscribers if anything changed.
    fn publish(&self) {
        let next = self.connection.status();
        self.status.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Stops timers, drops the transport and resets the connection.
    fn teardown(&mut self) -> bool {
        if let Some(session) = self.session.take() {
            session.tx_timer.cancel();
            session.liveness_timer.cancel();
            session.transport.close();
        }
        let changed = self.connection.disconnect();
        if changed {
            info!("Disconnected");
        }
        self.publish();
        changed
    }

    fn abort_pending_connect(&mut self) {
        if let Some(pending) = self.pending_connect.take() {
            respond!(
                pending.response_tx,
                Err(LinkError::ConnectAborted {
                    host: pending.host,
                    port: pending.port,
                })
            );
        }
    }

    /// Handles everything except a connect from Idle.
    fn apply(&mut self, command: LinkCommand) -> Control {
        match command {
            LinkCommand::Connect { response_tx, .. } => {
                let state = self.connection.state();
                respond!(response_tx, Err(LinkError::AlreadyConnected { state }));
                Control::Continue
            }
            LinkCommand::Enable { response_tx } => {
                let enabled = self.connection.enable();
                self.publish();
                respond!(response_tx, enabled);
                Control::Continue
            }
            LinkCommand::Disable { response_tx } => {
                self.connection.disable();
                self.publish();
                respond!(response_tx, ());
                Control::Continue
            }
            LinkCommand::Disconnect { response_tx } => {
                self.abort_pending_connect();
                let changed = self.teardown();
                respond!(response_tx, changed);
                if changed {
                    Control::Disconnected
                } else {
                    Control::Continue
                }
            }
            LinkCommand::SetControllerCount { count, response_tx } => {
                let stored = self.connection.set_controller_count(count);
                self.publish();
                respond!(response_tx, stored);
                Control::Continue
            }
            LinkCommand::SetChannel {
                slot,
                channel,
                value,
                response_tx,
            } => {
                let result = self
                    .connection
                    .set_channel(slot, channel, value)
                    .map_err(LinkError::from);
                respond!(response_tx, result);
                Control::Continue
            }
            LinkCommand::Shutdown => {
                self.abort_pending_connect();
                self.teardown();
                Control::Shutdown
            }
        }
    }

    fn stop(&mut self) {
        self.abort_pending_connect();
        self.teardown();
        info!("All link handles dropped, stopping");
    }
}

impl LinkDriver<Idle> {
    pub fn create(
        config: Config,
        connection: Connection,
        connector: Arc<dyn Connector>,
        dispatcher: RxDispatcher,
        commands: mpsc::Receiver<LinkCommand>,
        status: watch::Sender<LinkStatus>,
        chart: Option<mpsc::Sender<LatencySample>>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(32);
        debug!("Creating link driver for {}:{}", config.link.host, config.link.port);

        Self::new(
            config,
            connector,
            connection,
            dispatcher,
            commands,
            timer_tx,
            timer_rx,
            status,
            chart,
            None, // session
            None, // pending_connect
        )
    }

    /// Serves commands until a connect is accepted. `None` on shutdown.
    pub async fn wait_for_connect(mut self) -> Option<LinkDriver<Connecting>> {
        loop {
            let Some(command) = self.commands.recv().await else {
                self.stop();
                return None;
            };

            match command {
                LinkCommand::Connect {
                    host,
                    port,
                    response_tx,
                } => match self.connection.begin_connect(&host, port) {
                    Ok(generation) => {
                        self.publish();
                        self.pending_connect = Some(PendingConnect {
                            host: host.clone(),
                            port,
                            response_tx,
                        });
                        return Some(self.transition_with(ConnectTarget {
                            host,
                            port,
                            generation,
                        }));
                    }
                    Err(e) => respond!(response_tx, Err(e)),
                },
                other => {
                    if let Control::Shutdown = self.apply(other) {
                        return None;
                    }
                }
            }
        }
    }
}

impl LinkDriver<Connecting> {
    /// Opens the transport while still serving commands. A disconnect or
    /// shutdown in the meantime abandons the attempt.
    pub async fn open(mut self) -> OpenOutcome {
        let Some(target) = self.get_state_data().cloned() else {
            error!("Connecting without a target");
            self.abort_pending_connect();
            self.teardown();
            return OpenOutcome::Failed(self.transition());
        };

        let timeout = self.config.link.open_timeout();
        let connector = Arc::clone(&self.connector);
        let opening = tokio::time::timeout(timeout, connector.open(&target.host, target.port));
        tokio::pin!(opening);

        let opened = loop {
            let command = tokio::select! {
                result = &mut opening => break result,
                command = self.commands.recv() => command,
            };

            match command {
                None => {
                    self.stop();
                    return OpenOutcome::Shutdown;
                }
                Some(command) => match self.apply(command) {
                    Control::Continue => {}
                    Control::Disconnected => return OpenOutcome::Failed(self.transition()),
                    Control::Shutdown => return OpenOutcome::Shutdown,
                },
            }
        };

        let failure = match opened {
            Ok(Ok(transport)) => {
                self.connection.opened(Instant::now());
                self.start_session(transport, target.generation);
                self.publish();
                if let Some(pending) = self.pending_connect.take() {
                    respond!(pending.response_tx, Ok(()));
                }
                return OpenOutcome::Online(self.transition());
            }
            Ok(Err(source)) => LinkError::TransportOpen {
                host: target.host.clone(),
                port: target.port,
                source,
            },
            Err(_) => LinkError::OpenTimeout {
                host: target.host.clone(),
                port: target.port,
                timeout_ms: self.config.link.open_timeout_ms,
            },
        };

        error!("{}", failure);
        self.connection.open_failed(&failure);
        self.publish();
        if let Some(pending) = self.pending_connect.take() {
            respond!(pending.response_tx, Err(failure));
        }
        OpenOutcome::Failed(self.transition())
    }

    fn start_session(&mut self, transport: Box<dyn Transport>, generation: u64) {
        let tx_period = self.connection.scheduler().period();
        let check_interval = self.connection.liveness().check_interval();
        debug!(
            "Starting timers: transmit every {:?}, liveness check every {:?}",
            tx_period, check_interval
        );

        self.session = Some(Session {
            transport,
            tx_timer: PeriodicTimer::spawn(
                TimerKind::Transmit,
                tx_period,
                generation,
                self.timer_tx.clone(),
            ),
            liveness_timer: PeriodicTimer::spawn(
                TimerKind::Liveness,
                check_interval,
                generation,
                self.timer_tx.clone(),
            ),
        });
    }
}

impl LinkDriver<Online> {
    /// Main loop while connected. Returns to Idle after a disconnect and
    /// `None` on shutdown.
    pub async fn run_until_closed(mut self) -> Option<LinkDriver<Idle>> {
        loop {
            let step = match self.session.as_ref() {
                Some(session) => tokio::select! {
                    command = self.commands.recv() => Step::Command(command),
                    Some(event) = self.timer_rx.recv() => Step::Timer(event),
                    received = session.transport.recv() => Step::Received(received),
                },
                None => {
                    warn!("Online without a transport");
                    self.teardown();
                    return Some(self.transition());
                }
            };

            match step {
                Step::Command(None) => {
                    self.stop();
                    return None;
                }
                Step::Command(Some(command)) => match self.apply(command) {
                    Control::Continue => {}
                    Control::Disconnected => return Some(self.transition()),
                    Control::Shutdown => return None,
                },
                Step::Timer(event) => {
                    if self.on_timer(event).await {
                        return Some(self.transition());
                    }
                }
                Step::Received(Ok(datagram)) => self.on_datagram(&datagram),
                Step::Received(Err(TransportError::Closed)) => {
                    warn!("Transport closed by peer");
                    self.teardown();
                    return Some(self.transition());
                }
                Step::Received(Err(e)) => warn!("Receive failed: {}", e),
            }
        }
    }

    /// Returns true if the connection was dropped.
    async fn on_timer(&mut self, event: TimerEvent) -> bool {
        match event.kind {
            TimerKind::Transmit => {
                if let Some(frame) = self.connection.on_tx_tick(event.generation) {
                    if let Some(session) = self.session.as_ref() {
                        send_frame(session.transport.as_ref(), &frame).await;
                    }
                    self.publish();
                }
                false
            }
            TimerKind::Liveness => match self.connection.check_liveness(event.generation, Instant::now()) {
                LivenessVerdict::Expired => {
                    warn!(
                        "No packets from robot for more than {:?}, dropping connection",
                        self.connection.liveness().deadline()
                    );
                    self.teardown()
                }
                LivenessVerdict::Alive => false,
                LivenessVerdict::Stale => {
                    trace!("Ignoring stale liveness check");
                    false
                }
            },
        }
    }

    fn on_datagram(&mut self, datagram: &[u8]) {
        let Some(accepted) = self.connection.on_datagram(datagram, Instant::now()) else {
            self.publish();
            return;
        };

        if let Some(frame) = accepted.frame {
            self.dispatcher.dispatch(&frame);
        }

        if let (Some(latency_ms), Some(chart)) = (accepted.chart_sample, self.chart.as_ref()) {
            let sample = LatencySample {
                latency_ms,
                at: Local::now(),
            };
            if let Err(e) = chart.try_send(sample) {
                warn!("Dropping latency chart sample: {}", e);
            }
        }
        self.publish();
    }
}

async fn send_frame(transport: &dyn Transport, frame: &OutboundFrame) {
    let bytes = frame.bytes();
    trace!("TX: {}", hex_dump(bytes));
    if let Err(e) = transport.send(bytes).await {
        warn!("Failed to send frame: {}", e);
    }
}

/// Drives the link through its states until shutdown.
pub async fn run_link(driver: LinkDriver<Idle>) {
    let mut idle = driver;
    loop {
        let Some(connecting) = idle.wait_for_connect().await else {
            break;
        };

        idle = match connecting.open().await {
            OpenOutcome::Online(online) => match online.run_until_closed().await {
                Some(idle) => idle,
                None => break,
            },
            OpenOutcome::Failed(idle) => idle,
            OpenOutcome::Shutdown => break,
        };
    }
    info!("Link task stopped");
}
