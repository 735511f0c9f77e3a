/// Receiver-side framing for the serial byte stream coming off a LoRa
/// gateway.
///
/// The gateway forwards raw payloads with no delimiters, so packets are
/// recovered by hunting for the magic prefix and taking the next
/// [`PACKET_LEN`] bytes. Validation is left to [`packet::decode`].
use heapless::Vec;

use crate::packet::{self, DecodeError, EmergencyPacket, MAGIC, PACKET_LEN};
use crate::protocol::DeviceMessage;

/// Byte-at-a-time packet framer.
pub struct PacketFramer {
    buf: Vec<u8, PACKET_LEN>,
}

impl PacketFramer {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed one byte. Returns a complete candidate frame once `PACKET_LEN`
    /// bytes starting with the magic prefix have been collected.
    pub fn feed(&mut self, byte: u8) -> Option<[u8; PACKET_LEN]> {
        match self.buf.len() {
            0 => {
                if byte == MAGIC[0] {
                    let _ = self.buf.push(byte);
                }
                None
            }
            1 => {
                if byte == MAGIC[1] {
                    let _ = self.buf.push(byte);
                } else if byte != MAGIC[0] {
                    // A repeated first magic byte may itself start the frame
                    self.buf.clear();
                }
                None
            }
            _ => {
                let _ = self.buf.push(byte);
                if self.buf.is_full() {
                    let mut frame = [0u8; PACKET_LEN];
                    frame.copy_from_slice(&self.buf);
                    self.buf.clear();
                    Some(frame)
                } else {
                    None
                }
            }
        }
    }

    /// Number of bytes of the frame in progress.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a framed packet, logging why it was rejected if it is invalid.
pub fn accept_frame(frame: &[u8; PACKET_LEN]) -> Result<EmergencyPacket, DecodeError> {
    let result = packet::decode(frame);
    match &result {
        Ok(p) => log::info!(
            "Received {} from device {:#06x} (seq {}, battery {}%)",
            p.packet_type.as_str(),
            p.device_id,
            p.sequence,
            p.battery_level
        ),
        Err(e) => log::warn!("Dropping frame: {}", e),
    }
    result
}

/// Alert report for a validated packet.
pub fn alert_message(packet: &EmergencyPacket) -> DeviceMessage<'static> {
    DeviceMessage::alert(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Clock;
    use crate::packet::{PacketCodec, PacketType};

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0
        }
    }

    fn frame(packet_type: PacketType, sequence: u16) -> [u8; PACKET_LEN] {
        PacketCodec::starting_at(sequence).encode(packet_type, 90, 0x0042, &FixedClock(12_000))
    }

    fn feed_all(framer: &mut PacketFramer, bytes: &[u8]) -> std::vec::Vec<[u8; PACKET_LEN]> {
        bytes.iter().filter_map(|&b| framer.feed(b)).collect()
    }

    #[test]
    fn frames_back_to_back_packets() {
        let a = frame(PacketType::Emergency, 1);
        let b = frame(PacketType::Cancel, 2);
        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        let mut framer = PacketFramer::new();
        let frames = feed_all(&mut framer, &stream);
        assert_eq!(frames, [a, b]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn skips_leading_noise() {
        let a = frame(PacketType::Heartbeat, 0);
        let mut stream = std::vec![0x00, 0x13, 0xFD, 0x7F];
        stream.extend_from_slice(&a);

        let mut framer = PacketFramer::new();
        assert_eq!(feed_all(&mut framer, &stream), [a]);
    }

    #[test]
    fn bad_second_magic_byte_resets() {
        let a = frame(PacketType::Emergency, 5);
        let mut stream = std::vec![0xEF, 0x00];
        stream.extend_from_slice(&a);

        let mut framer = PacketFramer::new();
        assert_eq!(feed_all(&mut framer, &stream), [a]);
    }

    #[test]
    fn repeated_first_magic_byte_resyncs() {
        let a = frame(PacketType::Emergency, 9);
        let mut stream = std::vec![0xEF];
        stream.extend_from_slice(&a);

        let mut framer = PacketFramer::new();
        assert_eq!(feed_all(&mut framer, &stream), [a]);
    }

    #[test]
    fn partial_frame_is_held() {
        let a = frame(PacketType::Cancel, 3);
        let mut framer = PacketFramer::new();
        assert!(feed_all(&mut framer, &a[..7]).is_empty());
        assert_eq!(framer.pending(), 7);
        assert_eq!(feed_all(&mut framer, &a[7..]), [a]);
    }

    #[test]
    fn accept_frame_decodes_valid_and_rejects_corrupt() {
        let a = frame(PacketType::Emergency, 77);
        let p = accept_frame(&a).unwrap();
        assert_eq!(p.device_id, 0x0042);
        assert_eq!(p.sequence, 77);
        assert_eq!(p.timestamp, 12);

        let mut corrupt = a;
        corrupt[4] ^= 0x01;
        assert!(matches!(
            accept_frame(&corrupt),
            Err(DecodeError::Checksum { .. })
        ));
    }

    #[test]
    fn alert_message_carries_packet_fields() {
        let p = accept_frame(&frame(PacketType::Cancel, 4)).unwrap();
        match alert_message(&p) {
            DeviceMessage::Alert {
                device,
                kind,
                battery,
                uptime,
                seq,
            } => {
                assert_eq!(device, 0x0042);
                assert_eq!(kind, "cancel");
                assert_eq!(battery, 90);
                assert_eq!(uptime, 12);
                assert_eq!(seq, 4);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
