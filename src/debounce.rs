/// Button debounce guard.
///
/// Runs in the edge-detection context, so it only takes `&self` and keeps
/// its single piece of state in an atomic. There is exactly one writer (the
/// edge context), which makes a plain load/compare/store sufficient.
use core::sync::atomic::{AtomicU32, Ordering};

/// Minimum gap between two accepted presses.
pub const DEBOUNCE_MS: u32 = 50;

pub struct Debouncer {
    last_accepted_ms: AtomicU32,
    min_gap_ms: u32,
}

impl Debouncer {
    /// The guard starts at 0 ms, so edges within the first `min_gap_ms`
    /// after boot are treated as bounce.
    pub const fn new(min_gap_ms: u32) -> Self {
        Self {
            last_accepted_ms: AtomicU32::new(0),
            min_gap_ms,
        }
    }

    /// Returns `true` and records `now_ms` if at least `min_gap_ms` passed
    /// since the last accepted press. Timestamps wrap at `u32::MAX`.
    pub fn accept(&self, now_ms: u32) -> bool {
        let last = self.last_accepted_ms.load(Ordering::Relaxed);
        if now_ms.wrapping_sub(last) < self.min_gap_ms {
            return false;
        }
        self.last_accepted_ms.store(now_ms, Ordering::Relaxed);
        true
    }

    pub fn last_accepted_ms(&self) -> u32 {
        self.last_accepted_ms.load(Ordering::Relaxed)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_MS)
    }
}
