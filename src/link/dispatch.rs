//! Routing of inbound frames to their consumers by command byte

use crate::protocol::frame::{Frame, InboundCommand};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Consumer of one kind of inbound frame. Gets the payload without the
/// command byte.
pub trait FrameHandler: Send {
    fn handle(&mut self, payload: &[u8]);
}

impl<F> FrameHandler for F
where
    F: FnMut(&[u8]) + Send,
{
    fn handle(&mut self, payload: &[u8]) {
        self(payload)
    }
}

#[derive(Default)]
pub struct RxDispatcher {
    handlers: HashMap<InboundCommand, Box<dyn FrameHandler>>,
}

impl std::fmt::Debug for RxDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxDispatcher")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RxDispatcher {
    /// A dispatcher without handlers drops everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Print frames go to the log as text, everything else is traced.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(InboundCommand::Print, |payload: &[u8]| {
            info!("Robot: {}", payload_text(payload));
        });
        for command in [
            InboundCommand::Dashboard,
            InboundCommand::Status,
            InboundCommand::Parameter,
        ] {
            dispatcher.register(command, move |payload: &[u8]| {
                debug!("{} frame, {} bytes", command, payload.len());
            });
        }
        dispatcher
    }

    /// Replaces any handler already registered for `command`.
    pub fn register<H>(&mut self, command: InboundCommand, handler: H)
    where
        H: FrameHandler + 'static,
    {
        self.handlers.insert(command, Box::new(handler));
    }

    /// Hands every known frame kind to an [`InboundMessage`] channel.
    pub fn forward_all(&mut self, sender: mpsc::Sender<InboundMessage>) {
        for command in [
            InboundCommand::Print,
            InboundCommand::Dashboard,
            InboundCommand::Status,
            InboundCommand::Parameter,
        ] {
            self.register(command, ChannelForwarder::new(command, sender.clone()));
        }
    }

    /// Returns whether a handler took the frame. Unknown command bytes and
    /// commands without a handler are dropped.
    pub fn dispatch(&mut self, frame: &Frame<'_>) -> bool {
        let Some(command) = frame.inbound_command() else {
            trace!("Dropping frame with unknown command {:#04x}", frame.command);
            return false;
        };

        match self.handlers.get_mut(&command) {
            Some(handler) => {
                handler.handle(frame.payload);
                true
            }
            None => {
                trace!("No handler for {} frame", command);
                false
            }
        }
    }
}

/// Owned copy of an inbound frame for consumers on other tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Print(String),
    Dashboard(Vec<u8>),
    Status(Vec<u8>),
    Parameter(Vec<u8>),
}

impl InboundMessage {
    pub fn from_payload(command: InboundCommand, payload: &[u8]) -> Self {
        match command {
            InboundCommand::Print => InboundMessage::Print(payload_text(payload)),
            InboundCommand::Dashboard => InboundMessage::Dashboard(payload.to_vec()),
            InboundCommand::Status => InboundMessage::Status(payload.to_vec()),
            InboundCommand::Parameter => InboundMessage::Parameter(payload.to_vec()),
        }
    }
}

/// Forwards frames into a bounded channel without blocking the link task.
/// Frames are dropped with a warning when the channel is full.
pub struct ChannelForwarder {
    command: InboundCommand,
    sender: mpsc::Sender<InboundMessage>,
}

impl ChannelForwarder {
    pub fn new(command: InboundCommand, sender: mpsc::Sender<InboundMessage>) -> Self {
        Self { command, sender }
    }
}

impl FrameHandler for ChannelForwarder {
    fn handle(&mut self, payload: &[u8]) {
        let message = InboundMessage::from_payload(self.command, payload);
        if let Err(e) = self.sender.try_send(message) {
            warn!("Dropping {} frame: {}", self.command, e);
        }
    }
}

/// Console text as sent by the robot, NUL padding removed.
pub fn payload_text(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}
