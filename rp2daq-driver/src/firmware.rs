//! Device identity reported by the identify handshake.
//!
//! The identify command is answered with a raw fixed-size block, not a
//! framed report: discovery runs it before the report stream is attached to
//! a decoder.

use crate::error::DriverError;

/// Size of the raw identity block.
pub const IDENTITY_LEN: usize = 30;

const IDENTITY_TAG: &[u8; 6] = b"rp2daq";

/// Parsed identity block of a connected instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    version: u16,
    serial: u64,
}

impl FirmwareInfo {
    /// Creates an identity from its parts.
    #[must_use]
    pub const fn new(version: u16, serial: u64) -> Self {
        Self { version, serial }
    }

    /// Parses a raw identity block.
    ///
    /// Layout: 6-byte literal tag `rp2daq`, `u16` firmware version, `u64`
    /// factory serial, the rest reserved. All little-endian.
    pub fn parse(block: &[u8]) -> Result<Self, DriverError> {
        if block.len() < IDENTITY_LEN {
            return Err(DriverError::IdentityTooShort(block.len()));
        }
        if &block[..6] != IDENTITY_TAG {
            return Err(DriverError::InvalidIdentityTag);
        }
        let version = u16::from_le_bytes([block[6], block[7]]);
        let mut serial = [0u8; 8];
        serial.copy_from_slice(&block[8..16]);
        Ok(Self {
            version,
            serial: u64::from_le_bytes(serial),
        })
    }

    /// Firmware version number.
    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Factory-programmed device serial.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Encodes the identity block; the inverse of [`FirmwareInfo::parse`].
    #[must_use]
    pub fn to_block(&self) -> [u8; IDENTITY_LEN] {
        let mut block = [0u8; IDENTITY_LEN];
        block[..6].copy_from_slice(IDENTITY_TAG);
        block[6..8].copy_from_slice(&self.version.to_le_bytes());
        block[8..16].copy_from_slice(&self.serial.to_le_bytes());
        block
    }
}

impl std::fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rp2daq v{}.{} (serial {:016X})",
            self.version >> 8,
            self.version & 0xFF,
            self.serial
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() -> anyhow::Result<()> {
        let info = FirmwareInfo::new(0x0203, 0x0123_4567_89AB_CDEF);
        assert_eq!(info, FirmwareInfo::parse(&info.to_block())?);
        Ok(())
    }

    #[test]
    fn parse_rejects_bad_tag() {
        let mut block = FirmwareInfo::new(1, 2).to_block();
        block[0] = b'x';
        assert_eq!(
            Err(DriverError::InvalidIdentityTag),
            FirmwareInfo::parse(&block)
        );
    }

    #[test]
    fn parse_rejects_short_block() {
        assert_eq!(
            Err(DriverError::IdentityTooShort(6)),
            FirmwareInfo::parse(b"rp2daq")
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            "rp2daq v2.3 (serial 00000000DEADBEEF)",
            FirmwareInfo::new(0x0203, 0xDEAD_BEEF).to_string()
        );
    }
}
