//! In-memory transport for link tests

#![allow(dead_code)]

use async_trait::async_trait;
use robotlink::link::{Connector, LinkState, LinkStatus, Transport, TransportError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// The robot side of one opened transport.
pub struct MockPeer {
    pub host: String,
    pub port: u16,
    /// Frames the link sent
    pub sent: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Datagrams to deliver to the link
    pub inbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockPeer {
    pub async fn next_frame(&mut self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        self.sent
            .recv()
            .await
            .ok_or_else(|| "transport dropped".into())
    }

    pub fn deliver(&self, datagram: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        self.inbound
            .send(datagram.to_vec())
            .map_err(|_| "link side of the transport is gone".into())
    }
}

pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    fail_next: AtomicBool,
    hang_next: AtomicBool,
    fail_sends: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers,
            fail_next: AtomicBool::new(false),
            hang_next: AtomicBool::new(false),
            fail_sends: Arc::new(AtomicBool::new(false)),
        };
        (connector, peer_rx)
    }

    /// The next open fails with a refused connection.
    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The next open never completes.
    pub fn hang_next_open(&self) {
        self.hang_next.store(true, Ordering::SeqCst);
    }

    /// While set, every send on every transport fails.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        if self.hang_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            host: host.to_string(),
            port,
            sent: sent_rx,
            inbound: inbound_tx,
        };
        self.peers.send(peer).map_err(|_| TransportError::Closed)?;

        Ok(Box::new(MockTransport {
            sent: sent_tx,
            inbound: Mutex::new(inbound_rx),
            fail_sends: Arc::clone(&self.fail_sends),
        }))
    }
}

struct MockTransport {
    sent: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "network unreachable",
            )));
        }
        self.sent
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)?;
        Ok(frame.len())
    }

    /// Stays silent once the peer stops sending, like a quiet UDP socket.
    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }
}

pub async fn wait_for_state(
    status: &mut watch::Receiver<LinkStatus>,
    state: LinkState,
) -> Result<LinkStatus, Box<dyn std::error::Error>> {
    let status = status.wait_for(|s| s.state == state).await?;
    Ok(status.clone())
}
