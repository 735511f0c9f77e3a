/// Compile-time device configuration.
///
/// Protocol timings and radio parameters. Board pin maps live in
/// [`board`](crate::board). The device id defaults to `0x0001` and can be
/// set per unit at build time:
///
/// ```text
/// SAFEBEACON_DEVICE_ID=0x002A cargo build --release --features devkit
/// ```

/// Identifier embedded in every packet.
pub const DEVICE_ID: u16 = match option_env!("SAFEBEACON_DEVICE_ID") {
    Some(id) => parse_hex_u16(id),
    None => 0x0001,
};

/// Timing and identity parameters of the emergency protocol.
#[derive(Clone, Copy, Debug)]
pub struct BeaconConfig {
    pub device_id: u16,
    /// Minimum gap between accepted button presses
    pub debounce_ms: u32,
    /// Window after the first press during which a second press cancels
    pub confirm_delay_ms: u32,
    /// How long `Cancelled` is held before returning to `Idle`
    pub cancel_hold_ms: u32,
    /// LED toggle period while the confirmation window runs
    pub blink_period_ms: u32,
    /// Wait before the single transmission retry
    pub retry_backoff_ms: u32,
    /// LED flashes after an emergency packet went out
    pub success_flashes: u8,
    pub success_flash_ms: u32,
    /// LED on/off period of the fail-stop indication
    pub fault_blink_ms: u32,
    /// Pause between polling loop iterations
    pub poll_interval_ms: u32,
    /// Reserved. Only one heartbeat is sent, at boot; nothing reads this.
    pub heartbeat_interval_ms: u32,
}

impl BeaconConfig {
    pub const fn new() -> Self {
        Self {
            device_id: DEVICE_ID,
            debounce_ms: 50,
            confirm_delay_ms: 3_000,
            cancel_hold_ms: 1_000,
            blink_period_ms: 200,
            retry_backoff_ms: 500,
            success_flashes: 10,
            success_flash_ms: 100,
            fault_blink_ms: 1_000,
            poll_interval_ms: 10,
            heartbeat_interval_ms: 60_000,
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// LoRa signal bandwidth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bandwidth {
    Khz62_5,
    Khz125,
    Khz250,
    Khz500,
}

impl Bandwidth {
    pub const fn hz(self) -> u32 {
        match self {
            Bandwidth::Khz62_5 => 62_500,
            Bandwidth::Khz125 => 125_000,
            Bandwidth::Khz250 => 250_000,
            Bandwidth::Khz500 => 500_000,
        }
    }
}

/// LoRa forward error correction rate 4/x.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CodingRate {
    Cr4_5,
    Cr4_6,
    Cr4_7,
    Cr4_8,
}

/// Transceiver parameters. Only the firmware's radio driver reads these;
/// the protocol core never sees them.
#[derive(Clone, Copy, Debug)]
pub struct RadioConfig {
    /// Carrier frequency. 868 MHz for EU; use 915 MHz in the US.
    pub frequency_hz: u32,
    pub bandwidth: Bandwidth,
    /// 6..=12. SF7 keeps airtime short for a 12-byte payload.
    pub spreading_factor: u8,
    pub coding_rate: CodingRate,
    pub tx_power_dbm: i8,
    /// 0x12 = private network
    pub sync_word: u8,
}

impl RadioConfig {
    pub const fn new() -> Self {
        Self {
            frequency_hz: 868_000_000,
            bandwidth: Bandwidth::Khz125,
            spreading_factor: 7,
            coding_rate: CodingRate::Cr4_5,
            tx_power_dbm: 20,
            sync_word: 0x12,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a hex `u16` with optional `0x` prefix. Invalid input fails the
/// build when used in a const context.
pub const fn parse_hex_u16(s: &str) -> u16 {
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes.len() >= 2 && bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X') {
        i = 2;
    }
    if i == bytes.len() || bytes.len() - i > 4 {
        panic!("device id must be 1 to 4 hex digits");
    }

    let mut value: u16 = 0;
    while i < bytes.len() {
        let digit = match bytes[i] {
            b'0'..=b'9' => bytes[i] - b'0',
            b'a'..=b'f' => bytes[i] - b'a' + 10,
            b'A'..=b'F' => bytes[i] - b'A' + 10,
            _ => panic!("device id contains a non-hex character"),
        };
        value = (value << 4) | digit as u16;
        i += 1;
    }
    value
}
