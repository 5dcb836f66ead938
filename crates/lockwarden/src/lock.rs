use std::{
    fmt::Debug,
    panic::Location,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use lockwarden_common::{
    LockError, LockId, LockKind, LockMode, LockResult, RegistryId, SessionId,
};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::{
    heuristic::DeadlockHeuristic,
    policy::Policy,
    primitive::Primitive,
    report::{CallerReport, LockReport},
    stats::{CallerRecord, LockStats},
};

/// A named lock created by a [`crate::LockRegistry`].
///
/// Locks are not taken directly; a [`crate::Session`] acquires and releases
/// them so that ordering can be validated and callers recorded.
///
/// The statistics live behind their own guard, separate from the primitive,
/// so diagnostics can be read while the primitive is held or contended.
pub struct Lock {
    id: LockId,
    name: Arc<str>,
    kind: LockKind,
    primitive: Primitive,
    stats: Mutex<LockStats>,
    removed: AtomicBool,
    policy: Arc<Policy>,
}

impl Lock {
    pub(crate) fn new(
        id: LockId,
        name: Arc<str>,
        kind: LockKind,
        heuristic: DeadlockHeuristic,
        policy: Arc<Policy>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            primitive: Primitive::new(kind),
            stats: Mutex::new(LockStats::new(heuristic)),
            removed: AtomicBool::new(false),
            policy,
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    /// The registry that created this lock.
    pub fn registry(&self) -> RegistryId {
        self.policy.registry()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Number of sessions currently holding or waiting on this lock.
    pub fn count(&self) -> usize {
        self.stats.lock().count()
    }

    pub fn threshold(&self) -> usize {
        self.stats.lock().heuristic.threshold()
    }

    pub fn deadlock_heuristic(&self) -> bool {
        self.stats.lock().heuristic.enabled()
    }

    pub fn set_deadlock_threshold(&self, threshold: usize) {
        self.stats.lock().heuristic.set_threshold(threshold);
    }

    pub fn set_deadlock_heuristic(&self, enabled: bool) {
        self.stats.lock().heuristic.set_enabled(enabled);
    }

    /// Whether the underlying primitive is held by anyone right now.
    pub fn is_locked(&self) -> bool {
        self.primitive.is_locked()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub fn report(&self) -> LockReport {
        let stats = self.stats.lock();
        LockReport {
            id: self.id,
            name: self.name.to_string(),
            kind: self.kind,
            count: stats.count(),
            threshold: stats.heuristic.threshold(),
            callers: stats.callers().iter().map(CallerReport::from).collect(),
        }
    }

    pub(crate) fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Mark the lock removed and drop its caller queue. Returns the number of
    /// callers that were still recorded.
    pub(crate) fn finalize(&self) -> usize {
        let mut stats = self.stats.lock();
        self.removed.store(true, Ordering::Release);
        stats.drain().len()
    }

    /// Like [`Lock::finalize`], but only if nobody holds or waits on the lock.
    /// The check and the removal happen under one stats guard, so no
    /// acquisition can slip in between.
    pub(crate) fn try_finalize(&self) -> Result<(), usize> {
        let stats = self.stats.lock();
        match stats.count() {
            0 => {
                self.removed.store(true, Ordering::Release);
                Ok(())
            }
            count => Err(count),
        }
    }

    pub(crate) fn ensure_live(&self) -> LockResult<()> {
        if self.is_removed() {
            return Err(LockError::LockRemoved {
                name: (*self.name).into(),
                id: self.id,
            });
        }

        Ok(())
    }

    /// Run the deadlock heuristic and, if it admits the caller, record it.
    /// Nothing is changed when the caller is refused.
    pub(crate) fn enter(&self, record: CallerRecord) -> LockResult<()> {
        let caller = record.location;
        let mut stats = self.stats.lock();
        if self.is_removed() {
            drop(stats);
            return self.ensure_live();
        }

        let count = stats.count();
        if !stats.heuristic.admits(count) {
            let threshold = stats.heuristic.threshold();
            drop(stats);
            self.policy.record_deadlock_suspicion();
            error!(
                op = "acquire",
                caller = %caller,
                lock = %self.name,
                "CRITICAL: Deadlock suspected. Count: {} Max: {}!!",
                count,
                threshold
            );
            return Err(LockError::DeadlockSuspected {
                name: (*self.name).into(),
                count,
                threshold,
            });
        }

        if stats.push(record).is_err() {
            drop(stats);
            error!(op = "acquire", caller = %caller, lock = %self.name, "Failed to create caller");
            return Err(LockError::AllocationFailure((*self.name).into()));
        }

        Ok(())
    }

    /// Undo [`Lock::enter`] for the most recent record of `session`.
    pub(crate) fn leave(&self, session: SessionId) -> LockResult<CallerRecord> {
        self.stats
            .lock()
            .remove_latest(session)
            .ok_or_else(|| LockError::NotHeld {
                name: (*self.name).into(),
                session,
            })
    }

    pub(crate) fn engage(&self, mode: LockMode, caller: &'static Location<'static>) {
        self.log_transition("LOCKING", mode, caller);
        self.primitive.lock(mode);
        self.log_transition("LOCKED", mode, caller);
    }

    /// # Safety
    ///
    /// The calling thread must hold the primitive in `mode` through a prior
    /// [`Lock::engage`].
    pub(crate) unsafe fn disengage(&self, mode: LockMode, caller: &'static Location<'static>) {
        self.log_transition("UNLOCKING", mode, caller);
        // SAFETY: upheld by the caller
        unsafe { self.primitive.unlock(mode) };
        self.log_transition("UNLOCKED", mode, caller);
    }

    fn log_transition(&self, action: &str, mode: LockMode, caller: &'static Location<'static>) {
        if self.policy.trace() {
            debug!(
                caller = %caller,
                id = %self.id,
                "{}{}: {}",
                action,
                mode.log_suffix(),
                self.name
            );
        }
    }
}

impl Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("id", &self.id)
            .field("registry", &self.registry())
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let count = self.stats.get_mut().count();
        if count > 0 {
            warn!(lock = %self.name, id = %self.id, "Lock dropped with {} caller(s) still recorded", count);
        }
    }
}
