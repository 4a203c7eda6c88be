//! # Atmos Gateway Library
//!
//! Packet-ingestion pipeline for a LoRa gateway serving Atmos sensor devices.
//!
//! Frames flow from the radio callback through a single-slot channel to
//! the main loop, which classifies them by packet type, decodes the protobuf
//! payload, verifies the header checksum and renders a diagnostic grid.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handoff;
pub mod packet;
pub mod parser;
pub mod radio;
pub mod render;
