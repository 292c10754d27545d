use crate::protocol::frame::{ChannelBlock, CHANNELS_PER_CONTROLLER};
use thiserror::Error;
use tracing::{debug, warn};

use super::channel::{AXIS_COUNT, AXIS_NEUTRAL};

pub const MAX_CONTROLLERS: usize = 4;

/// Axes centered, buttons released.
pub const NEUTRAL_BLOCK: ChannelBlock = neutral_block();

const fn neutral_block() -> ChannelBlock {
    let mut block = [0u8; CHANNELS_PER_CONTROLLER];
    let mut i = 0;
    while i < AXIS_COUNT {
        block[i] = AXIS_NEUTRAL;
        i += 1;
    }
    block
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoystickError {
    #[error("controller slot {slot} out of range (max {max})", max = MAX_CONTROLLERS - 1)]
    InvalidSlot { slot: usize },

    #[error("channel {channel} out of range (max {max})", max = CHANNELS_PER_CONTROLLER - 1)]
    InvalidChannel { channel: usize },
}

/// Channel values of all controller slots plus the number of active ones.
///
/// Only the first `controller_count` slots go on the wire, but writes to the
/// inactive slots are kept so a controller that comes back resumes with its
/// last values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoystickStore {
    slots: [ChannelBlock; MAX_CONTROLLERS],
    controller_count: usize,
}

impl Default for JoystickStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JoystickStore {
    pub fn new() -> Self {
        Self {
            slots: [NEUTRAL_BLOCK; MAX_CONTROLLERS],
            controller_count: 0,
        }
    }

    pub fn set_channel(
        &mut self,
        slot: usize,
        channel: usize,
        value: u8,
    ) -> Result<(), JoystickError> {
        let block = self
            .slots
            .get_mut(slot)
            .ok_or(JoystickError::InvalidSlot { slot })?;
        let entry = block
            .get_mut(channel)
            .ok_or(JoystickError::InvalidChannel { channel })?;
        *entry = value;
        Ok(())
    }

    /// Sets the number of active controllers and returns the stored count.
    pub fn set_controller_count(&mut self, count: usize) -> usize {
        let clamped = count.min(MAX_CONTROLLERS);
        if clamped != count {
            warn!(
                "Controller count {} exceeds {} slots, clamping",
                count, MAX_CONTROLLERS
            );
        }
        if clamped != self.controller_count {
            debug!(
                "Controller count changed: {} -> {}",
                self.controller_count, clamped
            );
        }
        self.controller_count = clamped;
        clamped
    }

    pub fn controller_count(&self) -> usize {
        self.controller_count
    }

    pub fn slot(&self, slot: usize) -> Option<&ChannelBlock> {
        self.slots.get(slot)
    }

    /// Blocks of the active controllers in slot order.
    pub fn active_blocks(&self) -> &[ChannelBlock] {
        &self.slots[..self.controller_count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joystick::channel::Channel;

    #[test]
    fn starts_neutral() {
        let store = JoystickStore::new();
        assert_eq!(store.controller_count(), 0);
        assert!(store.active_blocks().is_empty());

        for slot in 0..MAX_CONTROLLERS {
            let block = store.slot(slot).copied().unwrap_or_default();
            assert_eq!(&block[..4], &[127, 127, 127, 127]);
            assert!(block[4..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn writes_land_in_the_right_slot() -> Result<(), JoystickError> {
        let mut store = JoystickStore::new();
        store.set_channel(2, Channel::A.index(), 255)?;
        store.set_channel(0, Channel::LeftY.index(), 0)?;

        assert_eq!(store.slot(2).map(|b| b[4]), Some(255));
        assert_eq!(store.slot(0).map(|b| b[1]), Some(0));
        assert_eq!(store.slot(1), Some(&NEUTRAL_BLOCK));
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_ids() {
        let mut store = JoystickStore::new();
        assert_eq!(
            store.set_channel(4, 0, 1),
            Err(JoystickError::InvalidSlot { slot: 4 })
        );
        assert_eq!(
            store.set_channel(0, 24, 1),
            Err(JoystickError::InvalidChannel { channel: 24 })
        );
        assert_eq!(store, JoystickStore::new());
    }

    #[test]
    fn controller_count_is_clamped() {
        let mut store = JoystickStore::new();
        assert_eq!(store.set_controller_count(2), 2);
        assert_eq!(store.active_blocks().len(), 2);
        assert_eq!(store.set_controller_count(9), 4);
        assert_eq!(store.controller_count(), 4);
        assert_eq!(store.set_controller_count(0), 0);
        assert!(store.active_blocks().is_empty());
    }

    #[test]
    fn inactive_slots_keep_their_values() -> Result<(), JoystickError> {
        let mut store = JoystickStore::new();
        store.set_controller_count(1);
        store.set_channel(1, 5, 200)?;
        assert_eq!(store.active_blocks().len(), 1);

        store.set_controller_count(2);
        assert_eq!(store.active_blocks()[1][5], 200);
        Ok(())
    }
}
