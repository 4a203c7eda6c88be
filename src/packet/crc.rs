//! # Payload Checksums
//!
//! Checksum schemes for the `packet_crc` header field.
//!
//! - **additive8**: 8-bit wrapping sum of all payload bytes. This is what the
//!   deployed sensor firmware transmits. It catches single-byte corruption but
//!   is blind to reordered bytes and offers no tamper resistance.
//! - **crc16**: CRC-16/IBM-3740 (poly 0x1021, init 0xFFFF). Order-sensitive.
//!   Only usable once every sensor on the link emits it too.

use crc::{Crc, CRC_16_IBM_3740};
use serde::Deserialize;

/// CRC-16/IBM-3740 engine
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Checksum scheme carried in the `packet_crc` header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumScheme {
    /// 8-bit wrapping additive sum (wire default)
    #[default]
    Additive8,

    /// CRC-16/IBM-3740
    Crc16,
}

impl ChecksumScheme {
    /// Compute the checksum of `payload` under this scheme
    ///
    /// # Arguments
    ///
    /// * `payload` - Payload bytes following the packet header
    ///
    /// # Returns
    ///
    /// * `u32` - Checksum, widened to the header field type
    pub fn compute(self, payload: &[u8]) -> u32 {
        match self {
            ChecksumScheme::Additive8 => additive8(payload) as u32,
            ChecksumScheme::Crc16 => crc16(payload) as u32,
        }
    }
}

/// Compute the payload checksum with the wire-default scheme
///
/// # Examples
///
/// ```
/// use atmos_gateway::packet::crc::compute_crc;
///
/// assert_eq!(compute_crc(&[0x01, 0x02, 0xFF]), 0x02);
/// ```
pub fn compute_crc(payload: &[u8]) -> u32 {
    ChecksumScheme::default().compute(payload)
}

/// 8-bit wrapping sum of all bytes
pub fn additive8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// CRC-16/IBM-3740 of all bytes
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
