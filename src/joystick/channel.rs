//! Channel names and input scaling
//!
//! A controller block is 4 analog axes followed by 20 buttons. Input sources
//! report axes in `-1.0..=1.0` and buttons in `0.0..=1.0`; the scaling helpers
//! map those onto the byte range the robot expects.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Axis readings inside this band are reported as neutral.
pub const AXIS_DEADZONE: f32 = 0.05;

/// Byte value of a centered axis.
pub const AXIS_NEUTRAL: u8 = 127;

/// Number of analog axes at the start of each block.
pub const AXIS_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    LeftX,
    LeftY,
    RightX,
    RightY,
    A,
    B,
    X,
    Y,
    LeftShoulder,
    RightShoulder,
    LeftTrigger,
    RightTrigger,
    Select,
    Start,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Aux1,
    Aux2,
    Aux3,
    Aux4,
}

impl Channel {
    pub const ALL: [Channel; 24] = [
        Channel::LeftX,
        Channel::LeftY,
        Channel::RightX,
        Channel::RightY,
        Channel::A,
        Channel::B,
        Channel::X,
        Channel::Y,
        Channel::LeftShoulder,
        Channel::RightShoulder,
        Channel::LeftTrigger,
        Channel::RightTrigger,
        Channel::Select,
        Channel::Start,
        Channel::LeftStick,
        Channel::RightStick,
        Channel::DPadUp,
        Channel::DPadDown,
        Channel::DPadLeft,
        Channel::DPadRight,
        Channel::Aux1,
        Channel::Aux2,
        Channel::Aux3,
        Channel::Aux4,
    ];

    /// Position of the channel inside a block.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_axis(self) -> bool {
        self.index() < AXIS_COUNT
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::LeftX => "left-x",
            Channel::LeftY => "left-y",
            Channel::RightX => "right-x",
            Channel::RightY => "right-y",
            Channel::A => "a",
            Channel::B => "b",
            Channel::X => "x",
            Channel::Y => "y",
            Channel::LeftShoulder => "left-shoulder",
            Channel::RightShoulder => "right-shoulder",
            Channel::LeftTrigger => "left-trigger",
            Channel::RightTrigger => "right-trigger",
            Channel::Select => "select",
            Channel::Start => "start",
            Channel::LeftStick => "left-stick",
            Channel::RightStick => "right-stick",
            Channel::DPadUp => "dpad-up",
            Channel::DPadDown => "dpad-down",
            Channel::DPadLeft => "dpad-left",
            Channel::DPadRight => "dpad-right",
            Channel::Aux1 => "aux1",
            Channel::Aux2 => "aux2",
            Channel::Aux3 => "aux3",
            Channel::Aux4 => "aux4",
        }
    }
}

impl From<Channel> for usize {
    fn from(channel: Channel) -> Self {
        channel.index()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown channel '{0}'")]
pub struct UnknownChannel(pub String);

/// Accepts either a channel name or its numeric index.
impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();

        if let Ok(index) = wanted.parse::<usize>() {
            return Channel::from_index(index).ok_or_else(|| UnknownChannel(s.to_string()));
        }

        Channel::ALL
            .iter()
            .copied()
            .find(|channel| channel.name() == wanted)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// Maps an axis reading in `-1.0..=1.0` to a channel byte.
///
/// Positive deflection spans 128 steps above neutral, negative deflection
/// 127 steps below it, so full scale lands on 255 and 0.
pub fn scale_axis(value: f32) -> u8 {
    let scaled = if value > AXIS_DEADZONE {
        (value * 128.0 + 127.0).round()
    } else if value < -AXIS_DEADZONE {
        (127.0 + value * 127.0).round()
    } else {
        return AXIS_NEUTRAL;
    };
    clamp_to_byte(scaled)
}

/// Maps a button/trigger reading in `0.0..=1.0` to a channel byte.
pub fn scale_button(value: f32) -> u8 {
    clamp_to_byte((value * 255.0).round())
}

fn clamp_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_block_layout() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
            assert_eq!(usize::from(*channel), i);
        }
        assert!(Channel::RightY.is_axis());
        assert!(!Channel::A.is_axis());
        assert_eq!(Channel::Aux4.index(), 23);
    }

    #[test]
    fn parses_names_and_indices() {
        assert_eq!("left-x".parse(), Ok(Channel::LeftX));
        assert_eq!("DPad-Up".parse(), Ok(Channel::DPadUp));
        assert_eq!("aux1".parse(), Ok(Channel::Aux1));
        assert_eq!("4".parse(), Ok(Channel::A));
        assert_eq!(
            "24".parse::<Channel>(),
            Err(UnknownChannel("24".to_string()))
        );
        assert!("throttle".parse::<Channel>().is_err());
    }

    #[test]
    fn names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(channel.to_string().parse(), Ok(channel));
        }
    }

    #[test]
    fn axis_scaling() {
        assert_eq!(scale_axis(0.0), 127);
        assert_eq!(scale_axis(0.04), 127);
        assert_eq!(scale_axis(-0.05), 127);
        assert_eq!(scale_axis(1.0), 255);
        assert_eq!(scale_axis(-1.0), 0);
        assert_eq!(scale_axis(0.5), 191);
        assert_eq!(scale_axis(-0.5), 64);
        assert_eq!(scale_axis(3.0), 255);
        assert_eq!(scale_axis(-3.0), 0);
    }

    #[test]
    fn button_scaling() {
        assert_eq!(scale_button(0.0), 0);
        assert_eq!(scale_button(1.0), 255);
        assert_eq!(scale_button(0.5), 128);
        assert_eq!(scale_button(-0.2), 0);
        assert_eq!(scale_button(1.7), 255);
        assert_eq!(scale_button(f32::NAN), 0);
    }
}
