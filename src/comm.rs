/// Serial NDJSON output.
///
/// Status reports go out as one JSON object per line through the `log`
/// facade, which the firmware routes to the UART/USB console.
use crate::protocol::{DeviceMessage, MsgBuffer, MAX_MSG_LEN};

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into an owned, newline-terminated buffer.
pub fn render(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = [0u8; MAX_MSG_LEN];
    let len = serialize_message(msg, &mut buf)?;
    MsgBuffer::from_slice(&buf[..len]).ok()
}

/// Write a report line to the console.
pub fn emit(msg: &DeviceMessage) {
    let mut buf = [0u8; MAX_MSG_LEN];
    match serialize_message(msg, &mut buf) {
        Some(len) => match core::str::from_utf8(&buf[..len]) {
            Ok(line) => log::info!("{}", line.trim_end()),
            Err(_) => log::warn!("Report is not valid UTF-8"),
        },
        None => log::warn!("Report too large for {} byte buffer", MAX_MSG_LEN),
    }
}
