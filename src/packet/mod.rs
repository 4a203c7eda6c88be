//! # Atmos Packet Module
//!
//! Implementation of the Atmos sensor packet protocol.
//!
//! This module handles:
//! - Packet type identifiers and frame limits
//! - Socket-Layout and Data packet schemas (protobuf)
//! - Payload checksum calculation
//! - Frame decoding with checksum validation, and the inverse encoding

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
