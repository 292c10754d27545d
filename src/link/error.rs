//! Error definitions for the link layer

use super::transport::TransportError;
use crate::joystick::JoystickError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport could not be opened; the link is back to Disconnected
    #[error("failed to open transport to {host}:{port}: {source}")]
    TransportOpen {
        host: String,
        port: u16,
        #[source]
        source: TransportError,
    },

    #[error("opening transport to {host}:{port} timed out after {timeout_ms} ms")]
    OpenTimeout {
        host: String,
        port: u16,
        timeout_ms: u64,
    },

    /// `connect` was called while connecting or connected
    #[error("link is already {state}")]
    AlreadyConnected { state: super::LinkState },

    /// The link was disconnected or shut down while the transport was opening
    #[error("connect to {host}:{port} aborted")]
    ConnectAborted { host: String, port: u16 },

    #[error(transparent)]
    Joystick(#[from] JoystickError),

    /// The link task is gone
    #[error("link task channel closed")]
    ChannelClosed,
}
