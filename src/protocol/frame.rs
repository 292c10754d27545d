//! Wire frames
//!
//! One frame per datagram. Outbound frames are either the fixed heartbeat
//! literal or a joystick frame:
//!
//! ```text
//! Heartbeat:  68 EE 01                              (no checksum)
//! Joystick:   63 | 24 x N channel bytes | crc_hi crc_lo
//! Inbound:    p|d|s|r | payload
//! ```

use super::checksum::Checksum;
use std::fmt;
use thiserror::Error;

/// Channels carried per controller: 4 analog axes followed by 20 buttons.
pub const CHANNELS_PER_CONTROLLER: usize = 24;

/// Channel values of one controller slot.
pub type ChannelBlock = [u8; CHANNELS_PER_CONTROLLER];

/// Keep-alive frame sent while the robot is disabled. Peers match it
/// byte for byte.
pub const HEARTBEAT_FRAME: [u8; 3] = [0x68, 0xEE, 0x01];

/// Command byte of the joystick frame (`'c'`).
pub const JOYSTICK_COMMAND: u8 = b'c';

/// Length of the big-endian checksum trailer.
pub const CHECKSUM_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty datagram")]
    Empty,

    #[error("frame of {len} bytes is too short to carry a checksum")]
    Truncated { len: usize },

    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch { computed: u16, received: u16 },
}

/// Command bytes the console understands on the receive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundCommand {
    /// `'p'`: printable console text
    Print,
    /// `'d'`: dashboard bundle telemetry
    Dashboard,
    /// `'s'`: robot status
    Status,
    /// `'r'`: parameter report
    Parameter,
}

impl InboundCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'p' => Some(InboundCommand::Print),
            b'd' => Some(InboundCommand::Dashboard),
            b's' => Some(InboundCommand::Status),
            b'r' => Some(InboundCommand::Parameter),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            InboundCommand::Print => b'p',
            InboundCommand::Dashboard => b'd',
            InboundCommand::Status => b's',
            InboundCommand::Parameter => b'r',
        }
    }
}

impl fmt::Display for InboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundCommand::Print => write!(f, "Print"),
            InboundCommand::Dashboard => write!(f, "Dashboard"),
            InboundCommand::Status => write!(f, "Status"),
            InboundCommand::Parameter => write!(f, "Parameter"),
        }
    }
}

/// A decoded frame borrowing from the datagram it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub command: u8,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn inbound_command(&self) -> Option<InboundCommand> {
        InboundCommand::from_byte(self.command)
    }
}

pub fn encode_heartbeat() -> Vec<u8> {
    HEARTBEAT_FRAME.to_vec()
}

/// Total length of a joystick frame carrying `controllers` channel blocks.
pub fn joystick_frame_len(controllers: usize) -> usize {
    1 + CHANNELS_PER_CONTROLLER * controllers + CHECKSUM_LEN
}

/// Builds a joystick frame from the given channel blocks in slot order.
pub fn encode_joystick(blocks: &[ChannelBlock], checksum: &dyn Checksum) -> Vec<u8> {
    let mut frame = Vec::with_capacity(joystick_frame_len(blocks.len()));
    frame.push(JOYSTICK_COMMAND);
    for block in blocks {
        frame.extend_from_slice(block);
    }
    append_checksum(&mut frame, checksum);
    frame
}

/// Appends the big-endian checksum of everything currently in `frame`.
pub fn append_checksum(frame: &mut Vec<u8>, checksum: &dyn Checksum) {
    let crc = checksum.compute(frame);
    frame.extend_from_slice(&crc.to_be_bytes());
}

/// Splits a datagram into command byte and payload without any validation.
pub fn decode(datagram: &[u8]) -> Result<Frame<'_>, FrameError> {
    match datagram.split_first() {
        Some((&command, payload)) => Ok(Frame { command, payload }),
        None => Err(FrameError::Empty),
    }
}

/// Like [`decode`], but expects and verifies a checksum trailer. The trailer
/// is not part of the returned payload.
pub fn decode_verified<'a>(
    datagram: &'a [u8],
    checksum: &dyn Checksum,
) -> Result<Frame<'a>, FrameError> {
    if datagram.is_empty() {
        return Err(FrameError::Empty);
    }
    if datagram.len() < 1 + CHECKSUM_LEN {
        return Err(FrameError::Truncated {
            len: datagram.len(),
        });
    }

    let (body, trailer) = datagram.split_at(datagram.len() - CHECKSUM_LEN);
    let trailer: [u8; CHECKSUM_LEN] = trailer.try_into().map_err(|_| FrameError::Truncated {
        len: datagram.len(),
    })?;
    let received = u16::from_be_bytes(trailer);
    let computed = checksum.compute(body);

    if received != computed {
        return Err(FrameError::ChecksumMismatch { computed, received });
    }
    decode(body)
}

/// Space separated lowercase hex, used for frame tracing.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::Crc16;

    fn block(fill: u8) -> ChannelBlock {
        [fill; CHANNELS_PER_CONTROLLER]
    }

    #[test]
    fn heartbeat_is_the_fixed_literal() {
        assert_eq!(encode_heartbeat(), vec![0x68, 0xEE, 0x01]);
        assert_eq!(encode_heartbeat(), HEARTBEAT_FRAME);
    }

    #[test]
    fn joystick_frame_layout_for_each_controller_count() {
        let crc = Crc16::default();
        let blocks = [block(10), block(20), block(30), block(40)];

        for n in 1..=4 {
            let frame = encode_joystick(&blocks[..n], &crc);
            assert_eq!(frame.len(), 3 + 24 * n);
            assert_eq!(frame.len(), joystick_frame_len(n));
            assert_eq!(frame[0], 0x63);

            for (slot, expected) in blocks[..n].iter().enumerate() {
                let start = 1 + slot * CHANNELS_PER_CONTROLLER;
                assert_eq!(&frame[start..start + CHANNELS_PER_CONTROLLER], expected);
            }

            let body_len = 1 + 24 * n;
            let expected = crc.compute(&frame[..body_len]).to_be_bytes();
            assert_eq!(&frame[body_len..], &expected);
        }
    }

    #[test]
    fn empty_joystick_frame_still_carries_a_checksum() {
        let crc = Crc16::default();
        let frame = encode_joystick(&[], &crc);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame[0], JOYSTICK_COMMAND);
    }

    #[test]
    fn decode_splits_command_and_payload() {
        let frame = decode(b"phello");
        assert_eq!(
            frame,
            Ok(Frame {
                command: b'p',
                payload: b"hello"
            })
        );
        assert_eq!(
            frame.ok().and_then(|f| f.inbound_command()),
            Some(InboundCommand::Print)
        );
    }

    #[test]
    fn decode_rejects_empty_datagrams() {
        assert_eq!(decode(&[]), Err(FrameError::Empty));
    }

    #[test]
    fn decode_keeps_unknown_commands() {
        let frame = decode(&[0x7A, 1, 2]);
        assert_eq!(frame.map(|f| f.inbound_command()), Ok(None));
    }

    #[test]
    fn verified_decode_strips_a_valid_trailer() {
        let crc = Crc16::default();
        let mut datagram = b"sok".to_vec();
        append_checksum(&mut datagram, &crc);

        let frame = decode_verified(&datagram, &crc);
        assert_eq!(
            frame,
            Ok(Frame {
                command: b's',
                payload: b"ok"
            })
        );
    }

    #[test]
    fn verified_decode_reports_mismatches() {
        let crc = Crc16::default();
        let mut datagram = b"sok".to_vec();
        append_checksum(&mut datagram, &crc);
        let last = datagram.len() - 1;
        datagram[last] ^= 0xFF;

        assert!(matches!(
            decode_verified(&datagram, &crc),
            Err(FrameError::ChecksumMismatch { .. })
        ));
        assert_eq!(
            decode_verified(&[b's', 0x01], &crc),
            Err(FrameError::Truncated { len: 2 })
        );
        assert_eq!(decode_verified(&[], &crc), Err(FrameError::Empty));
    }

    #[test]
    fn inbound_command_bytes_are_stable() {
        for command in [
            InboundCommand::Print,
            InboundCommand::Dashboard,
            InboundCommand::Status,
            InboundCommand::Parameter,
        ] {
            assert_eq!(InboundCommand::from_byte(command.byte()), Some(command));
        }
        assert_eq!(InboundCommand::from_byte(b'c'), None);
    }

    #[test]
    fn hex_dump_formats_like_the_trace_output() {
        assert_eq!(hex_dump(&HEARTBEAT_FRAME), "68 ee 01");
        assert_eq!(hex_dump(&[]), "");
    }
}
