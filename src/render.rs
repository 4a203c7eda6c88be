//! # Diagnostic Renderer
//!
//! Fixed-width text views of decoded packets for the operator console.
//!
//! A grid starts with a header block (device id, packet CRC) followed by rows
//! of up to three 15-character cells. The CRC is padded to 3 characters in
//! socket-layout grids and to 2 in data grids, so a small data CRC leaves the
//! header line one character short of the cell border:
//!
//! ```text
//! +---------------+
//! |               |
//! |Device ID: 4   |
//! |Packet CRC: 175|
//! +---------------+---------------+---------------+
//! |               |               |               |
//! |               |               |               |
//! |SoID: 0        |SoID: 1        |SoID: 2        |
//! |Type: 1        |Type: 2        |Type: 1        |
//! |ID: 10         |ID: 11         |ID: 12         |
//! +---------------+---------------+---------------+
//! ```

use std::fmt;

use crate::packet::protocol::Packet;

/// Slots per grid row
pub const SLOTS_PER_ROW: usize = 3;

/// Inner width of a grid cell
pub const CELL_WIDTH: usize = 15;

/// Minimum width of the packet CRC in the header block, per packet type
fn crc_width(packet: &Packet) -> usize {
    match packet {
        Packet::SocketLayout(_) => 3,
        Packet::Data(_) => 2,
    }
}

/// Grid view of one packet, limited to `rows` rows of slots
#[derive(Debug, Clone, Copy)]
pub struct PacketGrid<'a> {
    packet: &'a Packet,
    rows: usize,
}

impl<'a> PacketGrid<'a> {
    pub fn new(packet: &'a Packet, rows: usize) -> Self {
        Self { packet, rows }
    }

    /// Text lines of each rendered slot, in slot order
    fn cells(&self) -> Vec<Vec<String>> {
        let limit = self.rows.saturating_mul(SLOTS_PER_ROW);

        match self.packet {
            Packet::SocketLayout(packet) => packet
                .socket_data
                .iter()
                .take(limit)
                .enumerate()
                .map(|(slot, descriptor)| {
                    vec![
                        format!("SoID: {:<9}", slot),
                        format!("Type: {:<9}", descriptor.sensor_type),
                        format!("ID: {:<11}", descriptor.sensor_id),
                    ]
                })
                .collect(),
            Packet::Data(packet) => packet
                .sensor_data
                .iter()
                .take(limit)
                .enumerate()
                .map(|(slot, value)| {
                    vec![format!("SoID: {:<9}", slot), format!("Val : {:<9}", value)]
                })
                .collect(),
        }
    }
}

impl fmt::Display for PacketGrid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.packet.header();
        let cells = self.cells();

        writeln!(f, "{}", border(1))?;
        writeln!(f, "{}", blank(1))?;
        writeln!(f, "|Device ID: {:<4}|", header.device_id)?;
        writeln!(
            f,
            "|Packet CRC: {:<width$}|",
            header.packet_crc,
            width = crc_width(self.packet)
        )?;
        writeln!(f, "{}", border(cells.len().clamp(1, SLOTS_PER_ROW)))?;

        for row in cells.chunks(SLOTS_PER_ROW) {
            writeln!(f, "{}", blank(row.len()))?;
            writeln!(f, "{}", blank(row.len()))?;

            let lines = row.first().map_or(0, Vec::len);
            for line in 0..lines {
                for cell in row {
                    write!(f, "|{}", cell[line])?;
                }
                writeln!(f, "|")?;
            }

            writeln!(f, "{}", border(row.len()))?;
        }

        Ok(())
    }
}

/// Render a packet as a grid of at most `rows` rows
///
/// # Examples
///
/// ```
/// use atmos_gateway::packet::protocol::{DataPacket, Packet, PacketHeader};
/// use atmos_gateway::render::render_packet;
///
/// let packet = Packet::Data(DataPacket {
///     header: Some(PacketHeader { device_id: 9, packet_crc: 42 }),
///     sensor_data: vec![512],
/// });
/// let grid = render_packet(&packet, 1);
/// assert!(grid.contains("|Val : 512      |"));
/// ```
pub fn render_packet(packet: &Packet, rows: usize) -> String {
    PacketGrid::new(packet, rows).to_string()
}

/// Bit-level dump of a frame, one 8-digit group per byte
#[derive(Debug, Clone, Copy)]
pub struct BinaryDump<'a>(pub &'a [u8]);

impl fmt::Display for BinaryDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:08b}", byte)?;
        }
        Ok(())
    }
}

fn border(cells: usize) -> String {
    format!("+{}", format!("{}+", "-".repeat(CELL_WIDTH)).repeat(cells))
}

fn blank(cells: usize) -> String {
    format!("|{}", format!("{}|", " ".repeat(CELL_WIDTH)).repeat(cells))
}
