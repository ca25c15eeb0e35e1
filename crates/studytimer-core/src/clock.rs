//! Wall-clock sampling.
//!
//! Every duration in the crate is the difference of two `now_ms()`
//! samples (or of a sample against a stored instant). Nothing counts
//! ticks: a suspended process or a long GC-style stall cannot
//! desynchronize displayed time from real elapsed time, because the
//! next sample already includes the gap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A source of the current instant, in milliseconds since the Unix epoch.
///
/// Implementations must be monotonically nondecreasing between calls.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// System wall clock.
///
/// Clamps against the last returned sample so that an NTP step
/// backwards can never make `now_ms()` decrease.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_ms: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let wall = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_ms.fetch_max(wall, Ordering::Relaxed);
        self.last_ms.load(Ordering::Relaxed).max(wall)
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Clones share the same underlying instant, so a clock handed to an
/// engine can be advanced from the test body.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }

    pub fn set(&self, instant_ms: u64) {
        self.now_ms.store(instant_ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_nondecreasing() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(0);
        let other = clock.clone();
        clock.advance(5_000);
        assert_eq!(other.now_ms(), 5_000);
    }
}
