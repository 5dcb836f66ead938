use std::{
    marker::PhantomData,
    panic::Location,
    sync::atomic::{AtomicU64, Ordering},
};

use itertools::Itertools;
use lockwarden_common::{LockError, LockMode, LockResult, SessionId};
use smallvec::SmallVec;
use tracing::{error, warn};

use crate::{
    lock::Lock,
    order::{check_order, HeldLock},
    stats::CallerRecord,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// The locks one thread of execution currently holds, in acquisition order.
///
/// A session is `!Send`: a recursive primitive belongs to the thread that
/// took it, so every release has to happen on the acquiring thread.
///
/// Dropping a session that still holds locks is reported but does not
/// release anything.
pub struct Session {
    id: SessionId,
    held: SmallVec<[HeldLock; 8]>,
    _not_send: PhantomData<*const ()>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            held: SmallVec::new(),
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Held locks, oldest acquisition first.
    pub fn held(&self) -> &[HeldLock] {
        &self.held
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn holds(&self, lock: &Lock) -> bool {
        self.position(lock).is_some()
    }

    /// Acquire `lock` in `mode`, blocking until the primitive is available.
    ///
    /// Ordering and the deadlock heuristic are checked before anything can
    /// block, so a refused acquisition returns immediately and leaves the
    /// lock's stats and this session untouched.
    ///
    /// With fail-fast enabled an order violation does not return: the
    /// registry's fatal-violation hook runs instead (by default the process
    /// aborts).
    #[track_caller]
    pub fn acquire(&mut self, lock: &Lock, mode: LockMode) -> LockResult<()> {
        let caller = Location::caller();
        let mode = lock.kind().normalize(mode);
        if let Err(err) = lock.ensure_live() {
            error!(op = "acquire", caller = %caller, session = %self.id, "{}", err);
            return Err(err);
        }

        let policy = lock.policy();
        let record = CallerRecord::new(self.id, caller, policy.now(), mode);
        if let Err(violation) = check_order(
            &self.held,
            lock.registry(),
            lock.id(),
            lock.name(),
            lock.kind(),
        ) {
            policy.on_violation(violation, caller)?;
        }

        lock.enter(record)?;
        self.held.push(HeldLock {
            registry: lock.registry(),
            id: lock.id(),
            name: lock.shared_name(),
            mode,
        });
        lock.engage(mode, caller);
        Ok(())
    }

    #[track_caller]
    pub fn lock(&mut self, lock: &Lock) -> LockResult<()> {
        self.acquire(lock, LockMode::Basic)
    }

    #[track_caller]
    pub fn read(&mut self, lock: &Lock) -> LockResult<()> {
        self.acquire(lock, LockMode::Read)
    }

    #[track_caller]
    pub fn write(&mut self, lock: &Lock) -> LockResult<()> {
        self.acquire(lock, LockMode::Write)
    }

    /// Release the most recent hold of `lock` taken by this session.
    ///
    /// Releasing a lock the session does not hold, or in a different mode
    /// than it was taken, is reported and changes nothing.
    #[track_caller]
    pub fn release(&mut self, lock: &Lock, mode: LockMode) -> LockResult<()> {
        let caller = Location::caller();
        let mode = lock.kind().normalize(mode);
        let Some(pos) = self.position(lock) else {
            let err = LockError::NotHeld {
                name: lock.name().into(),
                session: self.id,
            };
            error!(op = "release", caller = %caller, session = %self.id, "{}", err);
            return Err(err);
        };

        let held = self.held[pos].mode;
        if held != mode {
            let err = LockError::ModeMismatch {
                name: lock.name().into(),
                held,
                requested: mode,
            };
            error!(op = "release", caller = %caller, session = %self.id, "{}", err);
            return Err(err);
        }

        if lock.is_removed() {
            warn!(op = "release", caller = %caller, lock = %lock.name(), "Releasing a lock that was removed from the registry");
        }

        if let Err(err) = lock.leave(self.id) {
            // Only possible when remove_all drained the queue under us; the
            // primitive is still ours and must be released regardless.
            warn!(op = "release", caller = %caller, session = %self.id, "{}", err);
        }

        // SAFETY: the held entry was pushed right after `engage` succeeded in
        // this mode, and `Session` is !Send, so this is the acquiring thread.
        unsafe { lock.disengage(mode, caller) };
        self.held.remove(pos);
        Ok(())
    }

    #[track_caller]
    pub fn unlock(&mut self, lock: &Lock) -> LockResult<()> {
        self.release(lock, LockMode::Basic)
    }

    #[track_caller]
    pub fn release_read(&mut self, lock: &Lock) -> LockResult<()> {
        self.release(lock, LockMode::Read)
    }

    #[track_caller]
    pub fn release_write(&mut self, lock: &Lock) -> LockResult<()> {
        self.release(lock, LockMode::Write)
    }

    /// End the session. Fails if locks are still held; those holds are
    /// leaked, not released.
    #[track_caller]
    pub fn close(mut self) -> LockResult<()> {
        if self.held.is_empty() {
            return Ok(());
        }

        let err = LockError::SessionNotEmpty {
            session: self.id,
            held: self.held.len(),
        };
        let caller = Location::caller();
        let held = self.held_names();
        error!(op = "close", caller = %caller, held = %held, "{}", err);
        self.held.clear();
        Err(err)
    }

    fn held_names(&self) -> String {
        self.held.iter().map(|h| &*h.name).join(", ")
    }

    fn position(&self, lock: &Lock) -> Option<usize> {
        self.held
            .iter()
            .rposition(|h| h.is(lock.registry(), lock.id()))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("held", &self.held.iter().map(|h| h.id).collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            let held = self.held_names();
            error!(
                op = "close",
                session = %self.id,
                held = %held,
                "Session dropped while still holding {} lock(s)",
                self.held.len()
            );
        }
    }
}
