use std::sync::atomic::{AtomicU64, Ordering};

/// Per-window byte accounting for the outbound budget.
///
/// Bytes are reserved before the budget check and are not returned when the check fails, so
/// throttled traffic keeps counting against the window until the next reset. Under sustained
/// overload this over-counts slightly and throttles a little earlier than the nominal budget.
#[derive(Debug, Default)]
pub struct BandwidthLimiter {
    /// Bytes reserved in the current window.
    bytes_this_window: AtomicU64,
}

impl BandwidthLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `size` bytes against the current window. Returns `true` if the window total,
    /// including this reservation, is within `budget`.
    #[inline]
    pub fn try_reserve(&self, size: u64, budget: u64) -> bool {
        let total = self.bytes_this_window.fetch_add(size, Ordering::Relaxed) + size;
        total <= budget
    }

    /// Starts a new window.
    #[inline]
    pub fn reset(&self) {
        self.bytes_this_window.store(0, Ordering::Relaxed);
    }

    /// Bytes reserved in the current window.
    #[inline]
    pub fn current(&self) -> u64 {
        self.bytes_this_window.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_until_budget_is_exceeded() {
        let limiter = BandwidthLimiter::new();
        assert!(limiter.try_reserve(40, 100));
        assert!(limiter.try_reserve(60, 100));
        assert!(!limiter.try_reserve(1, 100));
        assert_eq!(limiter.current(), 101);
    }

    #[test]
    fn rejected_reservations_are_not_rolled_back() {
        let limiter = BandwidthLimiter::new();
        assert!(!limiter.try_reserve(150, 100));
        // The failed 150 bytes still count, so even a small message is throttled
        assert!(!limiter.try_reserve(10, 100));
        assert_eq!(limiter.current(), 160);
    }

    #[test]
    fn reset_opens_a_new_window() {
        let limiter = BandwidthLimiter::new();
        assert!(!limiter.try_reserve(500, 100));
        limiter.reset();
        assert_eq!(limiter.current(), 0);
        assert!(limiter.try_reserve(100, 100));
    }
}
