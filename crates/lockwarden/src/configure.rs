use std::{
    fmt::Debug,
    time::{SystemTime, UNIX_EPOCH},
};

use lockwarden_common::{OrderViolation, Timestamp};

use crate::heuristic::DEFAULT_DEADLOCK_THRESHOLD;

/// Registry-wide settings, fixed when the registry is built.
///
/// `trace` and `fail_fast` only seed the registry's runtime flags; they can
/// be flipped later with [`crate::LockRegistry::set_trace`] and
/// [`crate::LockRegistry::set_fail_fast`].
#[derive(Clone)]
pub struct Configure {
    pub get_time: fn() -> Timestamp,
    /// Called when an order violation is found while fail-fast is on.
    pub on_fatal_violation: fn(&OrderViolation) -> !,
    pub trace: bool,
    pub fail_fast: bool,
    pub deadlock_heuristic: bool,
    pub deadlock_threshold: usize,
}

impl Debug for Configure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configure")
            .field("get_time", &self.get_time)
            .field("trace", &self.trace)
            .field("fail_fast", &self.fail_fast)
            .field("deadlock_heuristic", &self.deadlock_heuristic)
            .field("deadlock_threshold", &self.deadlock_threshold)
            .finish()
    }
}

fn system_time() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

fn abort_on_violation(_: &OrderViolation) -> ! {
    std::process::abort()
}

impl Configure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_time(mut self, get_time: fn() -> Timestamp) -> Self {
        self.get_time = get_time;
        self
    }

    pub fn on_fatal_violation(mut self, hook: fn(&OrderViolation) -> !) -> Self {
        self.on_fatal_violation = hook;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn deadlock_heuristic(mut self, enabled: bool) -> Self {
        self.deadlock_heuristic = enabled;
        self
    }

    pub fn deadlock_threshold(mut self, threshold: usize) -> Self {
        self.deadlock_threshold = threshold;
        self
    }
}

impl Default for Configure {
    fn default() -> Self {
        Self {
            get_time: system_time,
            on_fatal_violation: abort_on_violation,
            trace: false,
            fail_fast: true,
            deadlock_heuristic: true,
            deadlock_threshold: DEFAULT_DEADLOCK_THRESHOLD,
        }
    }
}
