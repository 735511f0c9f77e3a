/// JSON status reports written to the serial console.
///
/// One newline-delimited JSON object per event, so a host on the USB port
/// (or a receiver gateway) can follow what the beacon does without parsing
/// log text. Uses `heapless` buffers for no_std/no-alloc operation.
use heapless::Vec;
use serde::Serialize;

use crate::packet::EmergencyPacket;
use crate::transmit::SendReport;

/// Messages emitted on the serial console
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Emitted once at startup, before the radio is brought up
    #[serde(rename = "boot")]
    Boot {
        device: u16,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
    /// Outcome of one transmission request
    #[serde(rename = "tx")]
    Tx {
        /// "emergency", "cancel" or "heartbeat"
        kind: &'static str,
        /// Sequence number of the last packet handed to the radio
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u16>,
        attempts: u8,
        delivered: bool,
        battery: u8,
        /// Uptime in milliseconds
        ts: u32,
    },
    /// Unrecoverable condition; the device has stopped accepting input
    #[serde(rename = "fault")]
    Fault { reason: &'a str },
    /// A packet received and validated on the receiver side
    #[serde(rename = "alert")]
    Alert {
        device: u16,
        kind: &'static str,
        battery: u8,
        /// Sender uptime in seconds (16-bit, wraps)
        uptime: u16,
        seq: u16,
    },
}

impl DeviceMessage<'static> {
    pub fn tx(report: &SendReport, battery: u8, now_ms: u64) -> Self {
        DeviceMessage::Tx {
            kind: report.packet_type.as_str(),
            seq: report.sequence,
            attempts: report.attempts,
            delivered: report.delivered,
            battery,
            ts: (now_ms & 0xFFFF_FFFF) as u32,
        }
    }

    pub fn alert(packet: &EmergencyPacket) -> Self {
        DeviceMessage::Alert {
            device: packet.device_id,
            kind: packet.packet_type.as_str(),
            battery: packet.battery_level,
            uptime: packet.timestamp,
            seq: packet.sequence,
        }
    }
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 160;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
