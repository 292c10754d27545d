//! Robot link
//!
//! A link keeps one best-effort UDP session with a robot alive:
//!
//! ```text
//! LinkHandle ──commands──► driver task ──► Connection ──► TransmissionScheduler ──► Transport
//!     ▲                         │                                                     │
//!     └──── watch<LinkStatus> ──┘◄── RxDispatcher ◄── LatencyTracker / Liveness ◄─────┘
//! ```
//!
//! While connected the driver sends a heartbeat or joystick frame every
//! transmit period and drops the connection when the robot has been silent
//! for longer than the liveness deadline. There is no automatic reconnect.

pub mod connection;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod latency;
pub mod link_handle;
pub mod liveness;
pub mod scheduler;
pub mod status;
pub mod timer;
pub mod transport;

pub use connection::{Connection, RxChecksumPolicy};
pub use dispatch::{FrameHandler, InboundMessage, RxDispatcher};
pub use error::LinkError;
pub use latency::{LatencySample, LatencyTracker};
pub use link_handle::{LinkBuilder, LinkHandle};
pub use liveness::LivenessMonitor;
pub use scheduler::{OutboundFrame, PackingMode, TransmissionScheduler};
pub use status::{LinkState, LinkStatus};
pub use transport::{Connector, Transport, TransportError, UdpConnector};
