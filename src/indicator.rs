/// Status LED patterns.
///
/// `Idle` and `Cancelled` are dark, the confirmation window blinks, and a
/// confirmed emergency is solid on. The only state kept here is the blink
/// phase. The fail-stop pattern is a pure function of time.
use embedded_hal::digital::{OutputPin, PinState};

use crate::state::ProtocolState;

pub struct StatusIndicator {
    blink_period_ms: u32,
    last_toggle_ms: u64,
    lit: bool,
}

impl StatusIndicator {
    pub const fn new(blink_period_ms: u32) -> Self {
        Self {
            blink_period_ms,
            last_toggle_ms: 0,
            lit: false,
        }
    }

    /// LED level for `state` at `now_ms`. Call once per loop iteration.
    pub fn level(&mut self, state: ProtocolState, now_ms: u64) -> bool {
        match state {
            ProtocolState::Idle | ProtocolState::Cancelled => {
                self.lit = false;
                false
            }
            ProtocolState::Delay => {
                if now_ms.saturating_sub(self.last_toggle_ms) > self.blink_period_ms as u64 {
                    self.lit = !self.lit;
                    self.last_toggle_ms = now_ms;
                }
                self.lit
            }
            ProtocolState::Confirmed => true,
        }
    }
}

/// Fail-stop indication: on for `period_ms`, off for `period_ms`.
pub fn fault_level(now_ms: u64, period_ms: u32) -> bool {
    (now_ms / period_ms.max(1) as u64) % 2 == 0
}

/// Drive the LED, ignoring pin errors (GPIO writes are infallible on the
/// supported boards).
pub fn set_led<L: OutputPin + ?Sized>(led: &mut L, on: bool) {
    let _ = led.set_state(PinState::from(on));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_and_cancelled_are_off() {
        let mut ind = StatusIndicator::new(200);
        assert!(!ind.level(ProtocolState::Idle, 1_000));
        assert!(!ind.level(ProtocolState::Cancelled, 1_300));
    }

    #[test]
    fn confirmed_is_solid_on() {
        let mut ind = StatusIndicator::new(200);
        for t in [0, 150, 201, 999] {
            assert!(ind.level(ProtocolState::Confirmed, t));
        }
    }

    #[test]
    fn delay_toggles_after_each_period() {
        let mut ind = StatusIndicator::new(200);
        assert!(ind.level(ProtocolState::Delay, 1_000));
        assert!(ind.level(ProtocolState::Delay, 1_100));
        assert!(ind.level(ProtocolState::Delay, 1_200));
        assert!(!ind.level(ProtocolState::Delay, 1_201));
        assert!(!ind.level(ProtocolState::Delay, 1_400));
        assert!(ind.level(ProtocolState::Delay, 1_410));
    }

    #[test]
    fn blink_restarts_lit_after_leaving_delay() {
        let mut ind = StatusIndicator::new(200);
        assert!(ind.level(ProtocolState::Delay, 1_000));
        assert!(!ind.level(ProtocolState::Idle, 1_050));
        assert!(ind.level(ProtocolState::Delay, 5_000));
    }

    #[test]
    fn fault_blink_is_slow_square_wave() {
        assert!(fault_level(0, 1_000));
        assert!(fault_level(999, 1_000));
        assert!(!fault_level(1_000, 1_000));
        assert!(!fault_level(1_999, 1_000));
        assert!(fault_level(2_000, 1_000));
    }
}
