//! # Atmos Packet Protocol Constants and Types
//!
//! Core protocol definitions shared by the gateway and the remote sensor
//! devices.
//!
//! ## Frame layout
//!
//! ```text
//! +-----------+-----------------------------------------------+
//! | type (BE) | protobuf payload                              |
//! | 2 bytes   | header (field 1) | entries (field 2, repeated)|
//! +-----------+-----------------------------------------------+
//! ```
//!
//! A frame is at most [`MAX_FRAME_SIZE`] bytes long.

/// Socket-Layout packet type identifier
pub const PACKET_TYPE_SOCKET_LAYOUT: u16 = 0x0001;

/// Data packet type identifier
pub const PACKET_TYPE_DATA: u16 = 0x0002;

/// Size of the big-endian packet type identifier
pub const PACKET_TYPE_ID_SIZE: usize = 2;

/// Maximum radio frame size (type identifier + payload)
pub const MAX_FRAME_SIZE: usize = 256;

/// Maximum payload size after the type identifier
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - PACKET_TYPE_ID_SIZE;

/// Maximum number of socket/sensor entries in one packet
pub const MAX_SOCKETS: usize = 64;

/// Largest sensor type code a socket descriptor may carry
pub const MAX_SENSOR_TYPE: u32 = u8::MAX as u32;

/// Largest value a sensor reading may carry (readings are 16-bit)
pub const MAX_SENSOR_READING: u32 = u16::MAX as u32;

/// Header present at the start of every packet payload
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct PacketHeader {
    /// Identifier of the sending device
    #[prost(uint32, tag = "1")]
    pub device_id: u32,

    /// Checksum of the payload bytes following this header
    #[prost(uint32, tag = "2")]
    pub packet_crc: u32,
}

/// Sensor assignment of one socket
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct SocketDescriptor {
    /// Sensor type code (fits in a byte)
    #[prost(uint32, tag = "1")]
    pub sensor_type: u32,

    /// Sensor identifier
    #[prost(uint32, tag = "2")]
    pub sensor_id: u32,
}

/// Socket-Layout packet: which sensor sits in which socket
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SocketLayoutPacket {
    #[prost(message, optional, tag = "1")]
    pub header: Option<PacketHeader>,

    /// One descriptor per socket, in socket order
    #[prost(message, repeated, tag = "2")]
    pub socket_data: Vec<SocketDescriptor>,
}

/// Data packet: one reading per socket
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct DataPacket {
    #[prost(message, optional, tag = "1")]
    pub header: Option<PacketHeader>,

    /// Readings in socket order (16-bit values carried as varints)
    #[prost(uint32, repeated, tag = "2")]
    pub sensor_data: Vec<u32>,
}

/// Known packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    SocketLayout,
    Data,
}

impl PacketType {
    /// Map a wire identifier to its packet type
    ///
    /// # Returns
    ///
    /// * `Option<PacketType>` - `None` for identifiers without a decoder
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            PACKET_TYPE_SOCKET_LAYOUT => Some(PacketType::SocketLayout),
            PACKET_TYPE_DATA => Some(PacketType::Data),
            _ => None,
        }
    }

    /// Wire identifier of this packet type
    pub fn id(self) -> u16 {
        match self {
            PacketType::SocketLayout => PACKET_TYPE_SOCKET_LAYOUT,
            PacketType::Data => PACKET_TYPE_DATA,
        }
    }

    /// Human readable name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            PacketType::SocketLayout => "socket layout",
            PacketType::Data => "data",
        }
    }
}

/// A decoded packet of any known type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    SocketLayout(SocketLayoutPacket),
    Data(DataPacket),
}

impl Packet {
    /// Type of this packet
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::SocketLayout(_) => PacketType::SocketLayout,
            Packet::Data(_) => PacketType::Data,
        }
    }

    /// Packet header (all-zero if the payload carried none)
    pub fn header(&self) -> PacketHeader {
        let header = match self {
            Packet::SocketLayout(packet) => packet.header,
            Packet::Data(packet) => packet.header,
        };
        header.unwrap_or_default()
    }

    /// Number of socket/sensor entries
    pub fn slot_count(&self) -> usize {
        match self {
            Packet::SocketLayout(packet) => packet.socket_data.len(),
            Packet::Data(packet) => packet.sensor_data.len(),
        }
    }
}
