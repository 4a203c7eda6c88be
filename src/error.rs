//! # Error Types
//!
//! Custom error types for the Atmos gateway using `thiserror`.
//!
//! [`GatewayError`] covers startup and I/O failures that may end the process.
//! [`FrameError`] covers a single rejected frame and never leaves the frame
//! parser.

use thiserror::Error;

/// Main error type for the Atmos gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No LoRa modem found (tried: {0})")]
    SerialPortNotFound(String),

    /// Radio configuration or control errors
    #[error("Radio error: {0}")]
    Radio(String),

    /// Packet encoding errors
    #[error("Packet encoding error: {0}")]
    Encode(String),
}

/// Result type alias for the Atmos gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Reason a received frame was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Frame does not even hold the 2-byte type identifier
    #[error("corrupt frame: {0} bytes is too short for a packet type identifier")]
    TooShort(usize),

    /// Type identifier has no decoder
    #[error("unrecognized packet type: {0}")]
    UnrecognizedType(u16),

    /// Payload rejected by the schema decoder or by a field limit
    #[error("corrupt frame: {0}")]
    Malformed(String),

    /// Header checksum does not match the payload
    #[error("corrupt frame: CRC mismatch (header 0x{declared:02X}, computed 0x{computed:02X})")]
    CrcMismatch { declared: u32, computed: u32 },
}

impl FrameError {
    /// Whether the frame was damaged, as opposed to merely unknown
    pub fn is_corrupt(&self) -> bool {
        !matches!(self, FrameError::UnrecognizedType(_))
    }
}

impl From<prost::DecodeError> for FrameError {
    fn from(err: prost::DecodeError) -> Self {
        FrameError::Malformed(err.to_string())
    }
}
