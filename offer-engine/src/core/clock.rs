//! Time source
//!
//! Every expiry decision reads the clock through [`Clock`] so tests and
//! simulations can move time forward without sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Millisecond wall clock
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> i64;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }
}

/// Manually driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            current: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.current.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn advance_hours(&self, hours: i64) {
        self.advance_millis(hours * shared::util::HOUR_MILLIS);
    }

    pub fn set(&self, millis: i64) {
        self.current.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance_hours(1);
        assert_eq!(other.now_millis(), 1_000 + 3_600_000);
        other.set(5);
        assert_eq!(clock.now_millis(), 5);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2024-01-01
        assert!(SystemClock.now_millis() > 1_704_067_200_000);
    }
}
