//! Counting guard against runaway contention.
//!
//! Each lock carries a ceiling on how many callers may be holding or waiting
//! on it at once. An acquisition that would cross the ceiling is refused
//! instead of parked. This trips on long legitimate queues and misses any
//! deadlock that stays below the ceiling; what it buys is that a caller is
//! never parked behind a queue that has already grown past it.

pub const DEFAULT_DEADLOCK_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlockHeuristic {
    enabled: bool,
    threshold: usize,
}

impl DeadlockHeuristic {
    pub fn new(enabled: bool, threshold: usize) -> Self {
        Self { enabled, threshold }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Whether one more caller may join a lock that already has `count`
    /// active or queued callers.
    pub fn admits(&self, count: usize) -> bool {
        !self.enabled || count < self.threshold
    }
}

impl Default for DeadlockHeuristic {
    fn default() -> Self {
        Self::new(true, DEFAULT_DEADLOCK_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_at_threshold() {
        let h = DeadlockHeuristic::new(true, 3);
        assert!(h.admits(0));
        assert!(h.admits(2));
        assert!(!h.admits(3));
        assert!(!h.admits(4));
    }

    #[test]
    fn disabled_admits_everything() {
        let h = DeadlockHeuristic::new(false, 0);
        assert!(h.admits(0));
        assert!(h.admits(usize::MAX));
    }

    #[test]
    fn zero_threshold_refuses_first_caller() {
        assert!(!DeadlockHeuristic::new(true, 0).admits(0));
    }
}
