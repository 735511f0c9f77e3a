/// Emergency protocol states.
///
/// Stored as a `u8` inside [`Signals`](crate::signal::Signals) so the
/// timer context can flip it atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolState {
    /// Waiting for a press.
    Idle = 0,
    /// Confirmation window running; a second press cancels.
    Delay = 1,
    /// Window elapsed without a cancel; alert pending transmission.
    Confirmed = 2,
    /// Cancelled by a second press; held briefly before `Idle`.
    Cancelled = 3,
}

impl ProtocolState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8). Unknown values map to `Idle`,
    /// which cannot happen for values written through `as_u8`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ProtocolState::Delay,
            2 => ProtocolState::Confirmed,
            3 => ProtocolState::Cancelled,
            _ => ProtocolState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolState::Idle => "idle",
            ProtocolState::Delay => "delay",
            ProtocolState::Confirmed => "confirmed",
            ProtocolState::Cancelled => "cancelled",
        }
    }

    /// Only `Idle` and `Delay` react to button presses.
    pub fn accepts_press(&self) -> bool {
        matches!(self, ProtocolState::Idle | ProtocolState::Delay)
    }
}
