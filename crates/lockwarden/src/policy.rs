use std::{
    panic::Location,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use lockwarden_common::{LockResult, OrderViolation, RegistryId, Timestamp};
use tracing::error;

use crate::configure::Configure;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide switches and counters shared by a registry and its locks.
///
/// The flags are plain relaxed atomics. They are diagnostic toggles, so a
/// reader briefly observing a stale value is fine.
pub(crate) struct Policy {
    registry: RegistryId,
    trace: AtomicBool,
    fail_fast: AtomicBool,
    get_time: fn() -> Timestamp,
    on_fatal_violation: fn(&OrderViolation) -> !,
    order_violations: AtomicU64,
    deadlock_suspicions: AtomicU64,
}

impl Policy {
    pub(crate) fn new(config: &Configure) -> Self {
        Self {
            registry: RegistryId::new(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed)),
            trace: AtomicBool::new(config.trace),
            fail_fast: AtomicBool::new(config.fail_fast),
            get_time: config.get_time,
            on_fatal_violation: config.on_fatal_violation,
            order_violations: AtomicU64::new(0),
            deadlock_suspicions: AtomicU64::new(0),
        }
    }

    pub(crate) fn registry(&self) -> RegistryId {
        self.registry
    }

    pub(crate) fn trace(&self) -> bool {
        self.trace.load(Ordering::Relaxed)
    }

    pub(crate) fn set_trace(&self, enabled: bool) {
        self.trace.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::Relaxed)
    }

    pub(crate) fn set_fail_fast(&self, enabled: bool) {
        self.fail_fast.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn now(&self) -> Timestamp {
        (self.get_time)()
    }

    pub(crate) fn order_violations(&self) -> u64 {
        self.order_violations.load(Ordering::Relaxed)
    }

    pub(crate) fn deadlock_suspicions(&self) -> u64 {
        self.deadlock_suspicions.load(Ordering::Relaxed)
    }

    pub(crate) fn record_deadlock_suspicion(&self) {
        self.deadlock_suspicions.fetch_add(1, Ordering::Relaxed);
    }

    /// Report an order violation and decide what happens to the acquisition.
    ///
    /// Under fail-fast this never returns. Otherwise an out-of-order request
    /// is let through, while a self re-entry is refused: engaging a
    /// non-recursive primitive the session already holds can only hang.
    pub(crate) fn on_violation(
        &self,
        violation: OrderViolation,
        caller: &'static Location<'static>,
    ) -> LockResult<()> {
        self.order_violations.fetch_add(1, Ordering::Relaxed);
        error!(
            op = "acquire",
            caller = %caller,
            lock = %violation.lock_id(),
            "CRITICAL: {}",
            violation
        );
        if self.fail_fast() {
            (self.on_fatal_violation)(&violation);
        }

        match violation {
            OrderViolation::OutOfOrder { .. } => Ok(()),
            OrderViolation::SelfReentrant { .. } => Err(violation.into()),
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("registry", &self.registry)
            .field("trace", &self.trace())
            .field("fail_fast", &self.fail_fast())
            .field("order_violations", &self.order_violations())
            .field("deadlock_suspicions", &self.deadlock_suspicions())
            .finish()
    }
}
