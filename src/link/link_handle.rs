//! Link Handle - owned API for one robot link
//!
//! Spawns the link driver task and talks to it over a command channel. Every
//! request carries a oneshot responder, so a call returns once the driver has
//! applied it. Handles are cheap to clone; the task stops when the last one
//! is dropped or [`LinkHandle::shutdown`] is called.

use super::connection::Connection;
use super::dispatch::RxDispatcher;
use super::driver::{run_link, LinkCommand, LinkDriver};
use super::error::LinkError;
use super::latency::LatencySample;
use super::status::LinkStatus;
use super::transport::{Connector, UdpConnector};
use crate::config::{Config, ConfigError};
use crate::protocol::checksum::Checksum;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 64;

/// Collects the collaborators of a link before spawning it.
pub struct LinkBuilder {
    config: Config,
    connector: Arc<dyn Connector>,
    dispatcher: RxDispatcher,
    chart: Option<mpsc::Sender<LatencySample>>,
    checksum: Option<Arc<dyn Checksum>>,
}

impl LinkBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connector: Arc::new(UdpConnector),
            dispatcher: RxDispatcher::with_defaults(),
            chart: None,
            checksum: None,
        }
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn dispatcher(mut self, dispatcher: RxDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Receives at most one latency sample per chart interval.
    pub fn chart(mut self, chart: mpsc::Sender<LatencySample>) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Overrides the checksum algorithm selected in the configuration.
    pub fn checksum(mut self, checksum: Arc<dyn Checksum>) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Validates the configuration and starts the link task. Must be called
    /// from within a tokio runtime.
    pub fn spawn(self) -> Result<(LinkHandle, JoinHandle<()>), ConfigError> {
        self.config.validate()?;

        let connection = match self.checksum {
            Some(checksum) => Connection::with_checksum(&self.config, checksum),
            None => Connection::new(&self.config),
        };
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(connection.status());

        let handle = LinkHandle {
            tx,
            status_rx,
            default_host: self.config.link.host.clone(),
            default_port: self.config.link.port,
        };

        let driver = LinkDriver::create(
            self.config,
            connection,
            self.connector,
            self.dispatcher,
            rx,
            status_tx,
            self.chart,
        );
        let task = tokio::spawn(run_link(driver));
        info!("Link task started");

        Ok((handle, task))
    }
}

#[derive(Clone, Debug)]
pub struct LinkHandle {
    tx: mpsc::Sender<LinkCommand>,
    status_rx: watch::Receiver<LinkStatus>,
    default_host: String,
    default_port: u16,
}

impl LinkHandle {
    /// Spawns a UDP link with the default print/telemetry handlers.
    pub fn spawn(config: Config) -> Result<(Self, JoinHandle<()>), ConfigError> {
        LinkBuilder::new(config).spawn()
    }

    pub fn builder(config: Config) -> LinkBuilder {
        LinkBuilder::new(config)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> LinkCommand,
    ) -> Result<T, LinkError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(command(response_tx))
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        response_rx.await.map_err(|_| LinkError::ChannelClosed)
    }

    /// Resolves once the transport is open, or with the reason it is not.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), LinkError> {
        let host = host.to_string();
        self.request(|response_tx| LinkCommand::Connect {
            host,
            port,
            response_tx,
        })
        .await?
    }

    /// Connects to the host and port from the configuration.
    pub async fn connect_default(&self) -> Result<(), LinkError> {
        self.connect(&self.default_host, self.default_port).await
    }

    /// Returns whether the robot is now enabled; false unless connected.
    pub async fn enable(&self) -> Result<bool, LinkError> {
        self.request(|response_tx| LinkCommand::Enable { response_tx })
            .await
    }

    pub async fn disable(&self) {
        if self
            .request(|response_tx| LinkCommand::Disable { response_tx })
            .await
            .is_err()
        {
            debug!("Disable after link task stopped");
        }
    }

    /// Returns false if the link was already disconnected.
    pub async fn disconnect(&self) -> Result<bool, LinkError> {
        self.request(|response_tx| LinkCommand::Disconnect { response_tx })
            .await
    }

    /// Returns the stored count, clamped to the available slots.
    pub async fn handle_controller_count_change(&self, count: usize) -> Result<usize, LinkError> {
        self.request(|response_tx| LinkCommand::SetControllerCount { count, response_tx })
            .await
    }

    pub async fn handle_channel_update(
        &self,
        slot: usize,
        channel: impl Into<usize>,
        value: u8,
    ) -> Result<(), LinkError> {
        let channel = channel.into();
        self.request(|response_tx| LinkCommand::SetChannel {
            slot,
            channel,
            value,
            response_tx,
        })
        .await?
    }

    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    pub fn status(&self) -> LinkStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status_rx.clone()
    }

    /// Tears the link down and stops its task.
    pub async fn shutdown(&self) -> Result<(), LinkError> {
        self.tx
            .send(LinkCommand::Shutdown)
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }
}
