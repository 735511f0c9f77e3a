/// State shared between the asynchronous producers and the polling loop.
///
/// Three single-slot cells, each with one asynchronous writer:
/// - the press mailbox, posted by the edge-detection context
/// - the debounce guard, written only by the edge-detection context
/// - the protocol state, written by the polling loop except for the
///   `Delay -> Confirmed` flip done by the confirmation timer
///
/// Everything is lock-free so the producers never block. The firmware keeps
/// one instance in a `static`; tests create their own.
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::debounce::Debouncer;
use crate::state::ProtocolState;

pub struct Signals {
    state: AtomicU8,
    press: AtomicBool,
    debouncer: Debouncer,
}

impl Signals {
    pub const fn new(debounce_ms: u32) -> Self {
        Self {
            state: AtomicU8::new(ProtocolState::Idle.as_u8()),
            press: AtomicBool::new(false),
            debouncer: Debouncer::new(debounce_ms),
        }
    }

    // ── Edge-detection context ─────────────────────────────────────

    /// Run the debounce filter for a raw falling edge and, if accepted,
    /// post a press for the polling loop. Never blocks.
    pub fn on_press_edge(&self, now_ms: u32) -> bool {
        if !self.debouncer.accept(now_ms) {
            return false;
        }
        self.press.store(true, Ordering::Release);
        true
    }

    // ── Timer context ──────────────────────────────────────────────

    /// Confirmation window elapsed. Only moves `Delay -> Confirmed`;
    /// returns `false` for a stale expiry that lost a race with a cancel.
    pub fn expire_delay(&self) -> bool {
        self.transition(ProtocolState::Delay, ProtocolState::Confirmed)
    }

    // ── Polling loop ───────────────────────────────────────────────

    /// Consume a posted press, if any.
    pub fn take_press(&self) -> bool {
        self.press.swap(false, Ordering::Acquire)
    }

    pub fn state(&self) -> ProtocolState {
        ProtocolState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ProtocolState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Compare-and-swap `from -> to`. Fails if another context changed the
    /// state first.
    pub(crate) fn transition(&self, from: ProtocolState, to: ProtocolState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new(crate::debounce::DEBOUNCE_MS)
    }
}
