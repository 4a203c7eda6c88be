//! # Radio Module
//!
//! Capability contract between the gateway and the LoRa transceiver.
//!
//! This module handles:
//! - One-time link configuration (frequency, bandwidth, spreading factor, ...)
//! - Registration of the frame-arrival callback
//! - Byte-level access to the frame that just arrived
//!
//! The concrete driver lives in [`rylr998`].

pub mod rylr998;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::RadioConfig;
use crate::error::Result;

/// LoRa link parameters applied once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    /// Carrier frequency in Hz
    pub frequency_hz: u64,

    /// Signal bandwidth in Hz
    pub bandwidth_hz: u32,

    /// Spreading factor (chips per symbol = 2^SF)
    pub spreading_factor: u8,

    /// Coding rate denominator (4/N)
    pub coding_rate_denominator: u8,

    /// Preamble length in symbols
    pub preamble_length: u16,
}

impl From<&RadioConfig> for RadioSettings {
    fn from(config: &RadioConfig) -> Self {
        Self {
            frequency_hz: config.frequency_hz,
            bandwidth_hz: config.bandwidth_hz,
            spreading_factor: config.spreading_factor,
            coding_rate_denominator: config.coding_rate_denominator,
            preamble_length: config.preamble_length,
        }
    }
}

/// Read access to the frame that just arrived
pub trait FrameReader {
    /// Consume the next byte of the frame, `None` once the frame is exhausted
    fn read_byte(&mut self) -> Option<u8>;

    /// Received signal strength of the frame in dBm
    fn signal_strength(&self) -> i16;
}

/// Callback invoked by the radio once per received frame, with the frame length
pub type FrameCallback = Box<dyn FnMut(&mut dyn FrameReader, usize) + Send + 'static>;

/// LoRa transceiver capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Radio: Send {
    /// Apply link parameters
    ///
    /// # Errors
    ///
    /// Returns error if the transceiver rejects any parameter. Callers must
    /// treat this as fatal.
    async fn configure(&mut self, settings: &RadioSettings) -> Result<()>;

    /// Register the frame-arrival callback, replacing any previous one
    fn on_frame_received(&mut self, callback: FrameCallback);

    /// Arm continuous receive mode
    async fn begin_listening(&mut self) -> Result<()>;
}

/// A frame buffered by a driver, handed to the callback as a [`FrameReader`]
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    data: Bytes,
    position: usize,
    rssi: i16,
}

impl ReceivedFrame {
    pub fn new(data: Bytes, rssi: i16) -> Self {
        Self {
            data,
            position: 0,
            rssi,
        }
    }

    /// Length of the whole frame
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl FrameReader for ReceivedFrame {
    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.data.get(self.position).copied()?;
        self.position += 1;
        Some(byte)
    }

    fn signal_strength(&self) -> i16 {
        self.rssi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_frame_reads_in_order() {
        let mut frame = ReceivedFrame::new(Bytes::from_static(&[0x00, 0x01, 0x7F]), -87);

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.signal_strength(), -87);
        assert_eq!(frame.read_byte(), Some(0x00));
        assert_eq!(frame.read_byte(), Some(0x01));
        assert_eq!(frame.read_byte(), Some(0x7F));
        assert_eq!(frame.read_byte(), None);
        assert_eq!(frame.read_byte(), None);
    }

    #[test]
    fn test_settings_from_config() {
        let config = RadioConfig {
            frequency_hz: 433_000_000,
            bandwidth_hz: 125_000,
            spreading_factor: 7,
            coding_rate_denominator: 8,
            preamble_length: 8,
        };
        let settings = RadioSettings::from(&config);

        assert_eq!(settings.frequency_hz, 433_000_000);
        assert_eq!(settings.bandwidth_hz, 125_000);
        assert_eq!(settings.spreading_factor, 7);
        assert_eq!(settings.coding_rate_denominator, 8);
        assert_eq!(settings.preamble_length, 8);
    }
}
