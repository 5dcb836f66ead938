use lockwarden_common::{LockKind, LockMode};
use parking_lot::lock_api::{RawMutex as _, RawReentrantMutex, RawRwLock as _};
use parking_lot::{RawMutex, RawRwLock, RawThreadId};

/// The native lock a [`crate::Lock`] delegates blocking to.
///
/// Raw lock types are used because acquisition and release happen in two
/// separate calls; the session, not a guard, remembers what is held.
pub(crate) enum Primitive {
    Mutex(RawMutex),
    Recursive(RawReentrantMutex<RawMutex, RawThreadId>),
    ReadWrite(RawRwLock),
}

impl Primitive {
    pub(crate) fn new(kind: LockKind) -> Self {
        match kind {
            LockKind::Mutex => Primitive::Mutex(RawMutex::INIT),
            LockKind::RecursiveMutex => Primitive::Recursive(RawReentrantMutex::INIT),
            LockKind::ReadWrite => Primitive::ReadWrite(RawRwLock::INIT),
        }
    }

    /// Blocks until the primitive is held in `mode`. `mode` must already be
    /// normalized for this primitive's kind.
    pub(crate) fn lock(&self, mode: LockMode) {
        match self {
            Primitive::Mutex(m) => m.lock(),
            Primitive::Recursive(m) => m.lock(),
            Primitive::ReadWrite(rw) => match mode {
                LockMode::Read => rw.lock_shared(),
                LockMode::Basic | LockMode::Write => rw.lock_exclusive(),
            },
        }
    }

    /// # Safety
    ///
    /// The primitive must currently be held in `mode` by the calling thread,
    /// through a matching [`Primitive::lock`].
    pub(crate) unsafe fn unlock(&self, mode: LockMode) {
        match self {
            // SAFETY: upheld by the caller
            Primitive::Mutex(m) => unsafe { m.unlock() },
            // SAFETY: upheld by the caller
            Primitive::Recursive(m) => unsafe { m.unlock() },
            Primitive::ReadWrite(rw) => match mode {
                // SAFETY: upheld by the caller
                LockMode::Read => unsafe { rw.unlock_shared() },
                // SAFETY: upheld by the caller
                LockMode::Basic | LockMode::Write => unsafe { rw.unlock_exclusive() },
            },
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        match self {
            Primitive::Mutex(m) => m.is_locked(),
            Primitive::Recursive(m) => m.is_locked(),
            Primitive::ReadWrite(rw) => rw.is_locked(),
        }
    }
}
