/// Capabilities the signaling core needs from the board.
///
/// The core never touches GPIO, SPI or hardware timers itself. The firmware
/// binary implements these traits on top of esp-hal and embassy; host tests
/// provide fakes. The status LED and blocking waits use the `embedded-hal`
/// traits (`OutputPin`, `DelayNs`) directly instead of a local trait.
use crate::packet::PACKET_LEN;

/// Long-range radio link that carries one packet per frame.
pub trait RadioLink {
    /// Bring the transceiver up. A `false` here means the device cannot
    /// do its job and must fail-stop.
    fn initialize(&mut self) -> bool;

    /// Whether the transceiver can take a new frame right now.
    fn is_ready(&mut self) -> bool;

    /// Send `frame` as the entire payload of one radio frame. Blocks until
    /// the transceiver reports completion or gives up.
    fn transmit(&mut self, frame: &[u8; PACKET_LEN]) -> bool;
}

/// One-shot confirmation timer.
///
/// Expiry is not delivered through this trait: the timer's own context
/// calls [`Signals::expire_delay`](crate::signal::Signals::expire_delay).
pub trait DelayTimer {
    fn start_once(&mut self, duration_ms: u32);
    fn cancel(&mut self);
}

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Battery charge estimate.
pub trait BatteryMonitor {
    /// Charge in percent, 0..=100.
    fn read_level(&mut self) -> u8;
}
