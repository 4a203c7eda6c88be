//! # Atmos Packet Decoder
//!
//! Decodes radio frames into Socket-Layout and Data packets. A packet is only
//! returned once its header checksum matches the payload bytes that follow
//! the header.

use prost::encoding::{decode_key, decode_varint, WireType};
use prost::Message;

use super::crc::ChecksumScheme;
use super::protocol::*;
use crate::error::FrameError;

/// Protobuf field number of the packet header
const HEADER_FIELD: u32 = 1;

/// Read the big-endian packet type identifier of a frame
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] if the frame has fewer than 2 bytes
pub fn packet_type_id(frame: &[u8]) -> Result<u16, FrameError> {
    match frame {
        [high, low, ..] => Ok(u16::from_be_bytes([*high, *low])),
        _ => Err(FrameError::TooShort(frame.len())),
    }
}

/// Decode a complete radio frame
///
/// # Arguments
///
/// * `frame` - Frame bytes (type identifier + payload)
/// * `scheme` - Checksum scheme used by the sending devices
///
/// # Returns
///
/// * `Result<Packet, FrameError>` - Validated packet, or the rejection reason
///
/// # Errors
///
/// Returns error if:
/// - Frame is shorter than the type identifier or longer than 256 bytes
/// - Type identifier is not recognized
/// - Payload does not decode, exceeds a field limit or lacks a header
/// - Header checksum does not match the payload
pub fn decode_frame(frame: &[u8], scheme: ChecksumScheme) -> Result<Packet, FrameError> {
    let id = packet_type_id(frame)?;

    if frame.len() > MAX_FRAME_SIZE {
        return Err(FrameError::Malformed(format!(
            "frame size {} exceeds maximum {}",
            frame.len(),
            MAX_FRAME_SIZE
        )));
    }

    let payload = &frame[PACKET_TYPE_ID_SIZE..];
    match PacketType::from_id(id) {
        Some(PacketType::SocketLayout) => {
            decode_socket_layout(payload, scheme).map(Packet::SocketLayout)
        }
        Some(PacketType::Data) => decode_data(payload, scheme).map(Packet::Data),
        None => Err(FrameError::UnrecognizedType(id)),
    }
}

/// Decode and validate a Socket-Layout payload
pub fn decode_socket_layout(
    payload: &[u8],
    scheme: ChecksumScheme,
) -> Result<SocketLayoutPacket, FrameError> {
    let packet = SocketLayoutPacket::decode(payload)?;
    let header = require_header(packet.header)?;
    check_entry_count(packet.socket_data.len())?;

    if let Some((slot, descriptor)) = packet
        .socket_data
        .iter()
        .enumerate()
        .find(|(_, descriptor)| descriptor.sensor_type > MAX_SENSOR_TYPE)
    {
        return Err(FrameError::Malformed(format!(
            "socket {} sensor type {} exceeds maximum {}",
            slot, descriptor.sensor_type, MAX_SENSOR_TYPE
        )));
    }

    verify_crc(payload, &header, scheme)?;
    Ok(packet)
}

/// Decode and validate a Data payload
pub fn decode_data(payload: &[u8], scheme: ChecksumScheme) -> Result<DataPacket, FrameError> {
    let packet = DataPacket::decode(payload)?;
    let header = require_header(packet.header)?;
    check_entry_count(packet.sensor_data.len())?;

    if let Some((slot, value)) = packet
        .sensor_data
        .iter()
        .enumerate()
        .find(|&(_, &value)| value > MAX_SENSOR_READING)
    {
        return Err(FrameError::Malformed(format!(
            "socket {} reading {} is not a 16-bit value",
            slot, value
        )));
    }

    verify_crc(payload, &header, scheme)?;
    Ok(packet)
}

/// Split a payload into the encoded header field and the bytes following it
///
/// # Returns
///
/// * `(header, body)` - `body` is exactly what `packet_crc` covers
///
/// # Errors
///
/// Returns error if the payload does not start with a complete header field
pub fn split_header(payload: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    let mut cursor = payload;

    let (field, wire_type) = decode_key(&mut cursor)?;
    if field != HEADER_FIELD || wire_type != WireType::LengthDelimited {
        return Err(FrameError::Malformed(
            "payload does not start with the packet header".to_string(),
        ));
    }

    let header_len = decode_varint(&mut cursor)? as usize;
    if header_len > cursor.len() {
        return Err(FrameError::Malformed(format!(
            "header length {} exceeds remaining {} bytes",
            header_len,
            cursor.len()
        )));
    }

    let header_end = payload.len() - cursor.len() + header_len;
    Ok(payload.split_at(header_end))
}

/// Compare the header checksum against the bytes following the header
pub fn verify_crc(
    payload: &[u8],
    header: &PacketHeader,
    scheme: ChecksumScheme,
) -> Result<(), FrameError> {
    let (_, body) = split_header(payload)?;
    let computed = scheme.compute(body);

    if computed != header.packet_crc {
        return Err(FrameError::CrcMismatch {
            declared: header.packet_crc,
            computed,
        });
    }

    Ok(())
}

fn require_header(header: Option<PacketHeader>) -> Result<PacketHeader, FrameError> {
    header.ok_or_else(|| FrameError::Malformed("packet header missing".to_string()))
}

fn check_entry_count(count: usize) -> Result<(), FrameError> {
    if count > MAX_SOCKETS {
        return Err(FrameError::Malformed(format!(
            "{} entries exceeds maximum {}",
            count, MAX_SOCKETS
        )));
    }
    Ok(())
}
