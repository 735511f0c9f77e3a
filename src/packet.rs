/// Emergency packet wire format.
///
/// Every radio frame carries exactly one fixed 12-byte record. Multi-byte
/// fields are big-endian and written byte by byte, never by reinterpreting
/// a struct in memory:
///
/// ```text
///  0      2          4     5        6          8         10        12
///  +------+----------+-----+--------+----------+---------+---------+
///  | EF FD| deviceId | type| battery| uptime s | sequence| CRC-16  |
///  +------+----------+-----+--------+----------+---------+---------+
/// ```
///
/// The CRC (CCITT-FALSE) covers bytes 0..10 and is stored in bytes 10..12.
use core::fmt;

use crate::hal::Clock;

/// Size of one packet on the air.
pub const PACKET_LEN: usize = 12;

/// Identification tag at the start of every packet.
pub const MAGIC: [u8; 2] = [0xEF, 0xFD];

/// Offset of the checksum; everything before it is covered by the CRC.
pub const CHECKSUM_OFFSET: usize = PACKET_LEN - 2;

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;

/// What the packet announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Emergency = 0x01,
    Cancel = 0x02,
    Heartbeat = 0x03,
}

impl PacketType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Emergency => "emergency",
            PacketType::Cancel => "cancel",
            PacketType::Heartbeat => "heartbeat",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketType::Emergency),
            0x02 => Ok(PacketType::Cancel),
            0x03 => Ok(PacketType::Heartbeat),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

/// Why a received frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame is not exactly [`PACKET_LEN`] bytes.
    Length(usize),
    /// First two bytes are not [`MAGIC`].
    Magic([u8; 2]),
    /// Stored checksum does not match the recomputed one.
    Checksum { stored: u16, computed: u16 },
    /// Packet type byte is not a known [`PacketType`].
    UnknownType(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Length(len) => {
                write!(f, "expected {} bytes, got {}", PACKET_LEN, len)
            }
            DecodeError::Magic([a, b]) => write!(f, "bad magic {:02X} {:02X}", a, b),
            DecodeError::Checksum { stored, computed } => {
                write!(f, "checksum {:04X} does not match {:04X}", stored, computed)
            }
            DecodeError::UnknownType(t) => write!(f, "unknown packet type {:#04x}", t),
        }
    }
}

/// Decoded contents of one packet (magic and checksum are implied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyPacket {
    pub device_id: u16,
    pub packet_type: PacketType,
    /// 0..=100 percent
    pub battery_level: u8,
    /// Seconds since boot, wrapped to 16 bits
    pub timestamp: u16,
    pub sequence: u16,
}

impl EmergencyPacket {
    /// Serialize to the wire layout, computing the checksum.
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut frame = [0u8; PACKET_LEN];
        frame[0..2].copy_from_slice(&MAGIC);
        frame[2..4].copy_from_slice(&self.device_id.to_be_bytes());
        frame[4] = self.packet_type.as_u8();
        frame[5] = self.battery_level;
        frame[6..8].copy_from_slice(&self.timestamp.to_be_bytes());
        frame[8..10].copy_from_slice(&self.sequence.to_be_bytes());
        let crc = crc16_ccitt_false(&frame[..CHECKSUM_OFFSET]);
        frame[CHECKSUM_OFFSET..].copy_from_slice(&crc.to_be_bytes());
        frame
    }
}

/// Builds outgoing packets and owns the device's sequence counter.
///
/// The counter starts at 0 on every boot and advances once per packet
/// built, wrapping silently at 65536.
pub struct PacketCodec {
    next_sequence: u16,
}

impl PacketCodec {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(sequence: u16) -> Self {
        Self {
            next_sequence: sequence,
        }
    }

    /// Sequence number the next encoded packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    /// Build a complete packet. `battery_level` must already be clamped
    /// to 0..=100 by the caller.
    pub fn encode<C: Clock + ?Sized>(
        &mut self,
        packet_type: PacketType,
        battery_level: u8,
        device_id: u16,
        clock: &C,
    ) -> [u8; PACKET_LEN] {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        EmergencyPacket {
            device_id,
            packet_type,
            battery_level,
            // Truncation is the wire contract: wraps every ~18.2 hours
            timestamp: (clock.now_ms() / 1000) as u16,
            sequence,
        }
        .to_bytes()
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, MSB first, no final XOR.
pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

fn stored_checksum(frame: &[u8; PACKET_LEN]) -> u16 {
    u16::from_be_bytes([frame[CHECKSUM_OFFSET], frame[CHECKSUM_OFFSET + 1]])
}

/// Recompute the CRC over bytes 0..10 and compare with bytes 10..12.
pub fn verify_checksum(frame: &[u8; PACKET_LEN]) -> bool {
    crc16_ccitt_false(&frame[..CHECKSUM_OFFSET]) == stored_checksum(frame)
}

/// Parse and validate a received frame.
///
/// Checks run cheapest first: length, magic, checksum, then packet type.
pub fn decode(data: &[u8]) -> Result<EmergencyPacket, DecodeError> {
    let frame: &[u8; PACKET_LEN] = data
        .try_into()
        .map_err(|_| DecodeError::Length(data.len()))?;

    if frame[0..2] != MAGIC {
        return Err(DecodeError::Magic([frame[0], frame[1]]));
    }

    let stored = stored_checksum(frame);
    let computed = crc16_ccitt_false(&frame[..CHECKSUM_OFFSET]);
    if stored != computed {
        return Err(DecodeError::Checksum { stored, computed });
    }

    Ok(EmergencyPacket {
        device_id: u16::from_be_bytes([frame[2], frame[3]]),
        packet_type: PacketType::try_from(frame[4])?,
        battery_level: frame[5],
        timestamp: u16::from_be_bytes([frame[6], frame[7]]),
        sequence: u16::from_be_bytes([frame[8], frame[9]]),
    })
}
