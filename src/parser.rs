//! # Frame Parser
//!
//! Classifies a staged frame by its packet type identifier and routes it to
//! the matching decoder. Every rejection is logged with its own message and
//! returned to the caller; nothing here panics on bad input.

use tracing::{debug, info, warn};

use crate::error::FrameError;
use crate::packet::crc::ChecksumScheme;
use crate::packet::decoder::decode_frame;
use crate::packet::protocol::Packet;
use crate::render::BinaryDump;

/// Result of parsing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Decoded and checksum-verified, ready for rendering
    Accepted(Packet),

    /// Discarded
    Rejected(FrameError),
}

impl FrameOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FrameOutcome::Accepted(_))
    }
}

/// Parse one staged frame
///
/// # Arguments
///
/// * `frame` - Staged frame bytes (type identifier + payload)
/// * `scheme` - Checksum scheme used by the sending devices
pub fn dispatch(frame: &[u8], scheme: ChecksumScheme) -> FrameOutcome {
    debug!("Frame ({} bytes): {}", frame.len(), BinaryDump(frame));

    match decode_frame(frame, scheme) {
        Ok(packet) => {
            let header = packet.header();
            info!(
                "{} packet received (device {}, {} slots)",
                packet.packet_type().name(),
                header.device_id,
                packet.slot_count()
            );
            FrameOutcome::Accepted(packet)
        }
        Err(err) => {
            warn!("{}", err);
            FrameOutcome::Rejected(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encoder::{encode_frame, seal_data, seal_socket_layout};
    use crate::packet::protocol::{PacketType, SocketDescriptor};

    fn layout_frame() -> Vec<u8> {
        let descriptors = vec![
            SocketDescriptor { sensor_type: 1, sensor_id: 10 },
            SocketDescriptor { sensor_type: 2, sensor_id: 11 },
        ];
        let packet = Packet::SocketLayout(seal_socket_layout(4, descriptors, ChecksumScheme::Additive8));
        encode_frame(&packet).unwrap()
    }

    #[test]
    fn test_dispatch_socket_layout() {
        match dispatch(&layout_frame(), ChecksumScheme::Additive8) {
            FrameOutcome::Accepted(packet) => {
                assert_eq!(packet.packet_type(), PacketType::SocketLayout);
                assert_eq!(packet.header().device_id, 4);
            }
            other => panic!("Expected accepted packet, got: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_data() {
        let packet = Packet::Data(seal_data(8, &[1, 2, 3], ChecksumScheme::Crc16));
        let frame = encode_frame(&packet).unwrap();

        assert_eq!(dispatch(&frame, ChecksumScheme::Crc16), FrameOutcome::Accepted(packet));
    }

    #[test]
    fn test_dispatch_unrecognized_type() {
        let outcome = dispatch(&[0x00, 0x03, 0x0A, 0x00], ChecksumScheme::Additive8);

        match outcome {
            FrameOutcome::Rejected(err) => {
                assert_eq!(err, FrameError::UnrecognizedType(3));
                assert_eq!(err.to_string(), "unrecognized packet type: 3");
                assert!(!err.is_corrupt());
            }
            other => panic!("Expected rejection, got: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_short_frames_are_corrupt() {
        for frame in [&[][..], &[0x00][..]] {
            match dispatch(frame, ChecksumScheme::Additive8) {
                FrameOutcome::Rejected(err) => {
                    assert!(err.is_corrupt());
                    assert!(err.to_string().starts_with("corrupt frame"));
                }
                other => panic!("Expected rejection, got: {:?}", other),
            }
        }
    }

    #[test]
    fn test_dispatch_garbage_payload_is_corrupt() {
        let outcome = dispatch(&[0x00, 0x01, 0xFF, 0xFF, 0xFF], ChecksumScheme::Additive8);

        assert!(matches!(outcome, FrameOutcome::Rejected(ref err) if err.is_corrupt()));
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn test_dispatch_checksum_mismatch_is_corrupt() {
        let mut frame = layout_frame();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;

        assert!(matches!(
            dispatch(&frame, ChecksumScheme::Additive8),
            FrameOutcome::Rejected(FrameError::CrcMismatch { .. })
        ));
    }
}
