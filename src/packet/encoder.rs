//! # Atmos Packet Encoder
//!
//! Builds packets with a valid header checksum and serializes them into radio
//! frames. The gateway never transmits; this is the inverse of the decoder and
//! is what the remote devices run.

use prost::Message;

use super::crc::ChecksumScheme;
use super::protocol::*;
use crate::error::{GatewayError, Result};

/// Build a Socket-Layout packet whose header checksum covers its entries
///
/// # Arguments
///
/// * `device_id` - Identifier of the sending device
/// * `socket_data` - Socket descriptors in socket order
/// * `scheme` - Checksum scheme for `packet_crc`
pub fn seal_socket_layout(
    device_id: u32,
    socket_data: Vec<SocketDescriptor>,
    scheme: ChecksumScheme,
) -> SocketLayoutPacket {
    let mut packet = SocketLayoutPacket {
        header: None,
        socket_data,
    };
    let packet_crc = scheme.compute(&packet.encode_to_vec());
    packet.header = Some(PacketHeader {
        device_id,
        packet_crc,
    });
    packet
}

/// Build a Data packet whose header checksum covers its readings
///
/// # Arguments
///
/// * `device_id` - Identifier of the sending device
/// * `readings` - Sensor readings in socket order
/// * `scheme` - Checksum scheme for `packet_crc`
pub fn seal_data(device_id: u32, readings: &[u16], scheme: ChecksumScheme) -> DataPacket {
    let mut packet = DataPacket {
        header: None,
        sensor_data: readings.iter().map(|&value| value as u32).collect(),
    };
    let packet_crc = scheme.compute(&packet.encode_to_vec());
    packet.header = Some(PacketHeader {
        device_id,
        packet_crc,
    });
    packet
}

/// Serialize a packet payload (everything after the type identifier)
///
/// Fields are emitted in tag order, so the header always leads and the
/// checksummed entries follow it.
pub fn encode_payload(packet: &Packet) -> Vec<u8> {
    match packet {
        Packet::SocketLayout(packet) => packet.encode_to_vec(),
        Packet::Data(packet) => packet.encode_to_vec(),
    }
}

/// Serialize a complete radio frame: type identifier + payload
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Frame bytes
///
/// # Errors
///
/// Returns error if the packet has more than [`MAX_SOCKETS`] entries or the
/// frame would exceed [`MAX_FRAME_SIZE`] bytes.
///
/// # Examples
///
/// ```
/// use atmos_gateway::packet::crc::ChecksumScheme;
/// use atmos_gateway::packet::encoder::{encode_frame, seal_data};
/// use atmos_gateway::packet::protocol::Packet;
///
/// let packet = Packet::Data(seal_data(7, &[100, 200, 300], ChecksumScheme::Additive8));
/// let frame = encode_frame(&packet).unwrap();
/// assert_eq!(&frame[..2], &[0x00, 0x02]);
/// ```
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>> {
    if packet.slot_count() > MAX_SOCKETS {
        return Err(GatewayError::Encode(format!(
            "{} entries exceeds maximum {}",
            packet.slot_count(),
            MAX_SOCKETS
        )));
    }

    let payload = encode_payload(packet);
    let frame_len = PACKET_TYPE_ID_SIZE + payload.len();
    if frame_len > MAX_FRAME_SIZE {
        return Err(GatewayError::Encode(format!(
            "frame size {} exceeds maximum {}",
            frame_len, MAX_FRAME_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(frame_len);
    frame.extend_from_slice(&packet.packet_type().id().to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
