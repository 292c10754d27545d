//! Datagram transport seam
//!
//! The link driver only ever talks to a [`Transport`] obtained from a
//! [`Connector`]. [`UdpConnector`] is the production implementation; tests
//! plug in an in-memory one.

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

/// Largest inbound datagram accepted; longer ones are truncated by the socket.
pub const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("transport closed")]
    Closed,
}

/// One open datagram association with the robot.
///
/// `recv` must be cancel safe: the driver polls it inside `select!` and drops
/// the future whenever another branch wins.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: &[u8]) -> Result<usize, TransportError>;
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;
    fn close(&self) {}
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, TransportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UdpConnector;

#[async_trait]
impl Connector for UdpConnector {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, TransportError> {
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| TransportError::Resolve(format!("{}:{}", host, port)))?;

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(addr).await?;
        debug!(
            "UDP socket {} connected to {}",
            socket.local_addr()?,
            addr
        );

        Ok(Box::new(UdpTransport { socket }))
    }
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        Ok(self.socket.send(frame).await?)
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let len = self.socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn udp_round_trip_over_loopback() -> TestResult {
        let robot = UdpSocket::bind("127.0.0.1:0").await?;
        let port = robot.local_addr()?.port();

        let transport = UdpConnector.open("127.0.0.1", port).await?;
        transport.send(&[0x68, 0xEE, 0x01]).await?;

        let mut buf = [0u8; 16];
        let (len, console) = robot.recv_from(&mut buf).await?;
        assert_eq!(&buf[..len], &[0x68, 0xEE, 0x01]);

        robot.send_to(b"phi", console).await?;
        assert_eq!(transport.recv().await?, b"phi".to_vec());
        Ok(())
    }
}
