use crate::joystick::JoystickStore;
use crate::protocol::checksum::Checksum;
use crate::protocol::frame::{self, ChannelBlock, CHANNELS_PER_CONTROLLER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TRANSMIT_PERIOD: Duration = Duration::from_millis(100);

/// How active controller slots are laid out in a joystick frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackingMode {
    /// Every active slot's block, in slot order
    #[default]
    Concatenate,
    /// Slot 0's block first, remaining blocks zero-filled. Matches peers
    /// built against the legacy console.
    FirstSlotOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Heartbeat(Vec<u8>),
    Joystick(Vec<u8>),
}

impl OutboundFrame {
    pub fn bytes(&self) -> &[u8] {
        match self {
            OutboundFrame::Heartbeat(bytes) | OutboundFrame::Joystick(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OutboundFrame::Heartbeat(bytes) | OutboundFrame::Joystick(bytes) => bytes,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, OutboundFrame::Heartbeat(_))
    }
}

/// Decides what goes out on each transmit tick.
#[derive(Clone)]
pub struct TransmissionScheduler {
    period: Duration,
    packing: PackingMode,
    checksum: Arc<dyn Checksum>,
}

impl std::fmt::Debug for TransmissionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionScheduler")
            .field("period", &self.period)
            .field("packing", &self.packing)
            .finish_non_exhaustive()
    }
}

impl TransmissionScheduler {
    pub fn new(period: Duration, packing: PackingMode, checksum: Arc<dyn Checksum>) -> Self {
        Self {
            period,
            packing,
            checksum,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Heartbeat while disabled or without controllers, joystick frame
    /// otherwise.
    pub fn next_frame(&self, enabled: bool, joysticks: &JoystickStore) -> OutboundFrame {
        let count = joysticks.controller_count();
        if !enabled || count < 1 {
            return OutboundFrame::Heartbeat(frame::encode_heartbeat());
        }

        let bytes = match self.packing {
            PackingMode::Concatenate => {
                frame::encode_joystick(joysticks.active_blocks(), self.checksum.as_ref())
            }
            PackingMode::FirstSlotOnly => {
                let mut blocks: Vec<ChannelBlock> = vec![[0; CHANNELS_PER_CONTROLLER]; count];
                if let Some(first) = joysticks.slot(0) {
                    blocks[0] = *first;
                }
                frame::encode_joystick(&blocks, self.checksum.as_ref())
            }
        };
        OutboundFrame::Joystick(bytes)
    }
}
