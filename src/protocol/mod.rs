//! Robot link wire protocol
//!
//! - [`frame`] - frame layout, encoding and decoding
//! - [`checksum`] - pluggable 16-bit checksums for the frame trailer
//!
//! Nothing in here does IO; the link driver owns the socket.

pub mod checksum;
pub mod frame;

pub use checksum::{Checksum, ChecksumAlgorithm, Crc16};
pub use frame::{
    decode, decode_verified, encode_heartbeat, encode_joystick, ChannelBlock, Frame, FrameError,
    InboundCommand, CHANNELS_PER_CONTROLLER, HEARTBEAT_FRAME, JOYSTICK_COMMAND,
};
