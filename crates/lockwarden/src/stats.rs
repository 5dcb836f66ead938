use std::{collections::TryReserveError, panic::Location, sync::Arc, thread::ThreadId};

use lockwarden_common::{LockMode, SessionId, Timestamp};

use crate::heuristic::DeadlockHeuristic;

/// One active or queued acquisition of a lock.
#[derive(Debug, Clone)]
pub struct CallerRecord {
    pub session: SessionId,
    pub thread: ThreadId,
    pub thread_name: Option<Arc<str>>,
    pub location: &'static Location<'static>,
    pub timestamp: Timestamp,
    pub mode: LockMode,
}

impl CallerRecord {
    pub(crate) fn new(
        session: SessionId,
        location: &'static Location<'static>,
        timestamp: Timestamp,
        mode: LockMode,
    ) -> Self {
        let thread = std::thread::current();
        Self {
            session,
            thread: thread.id(),
            thread_name: thread.name().map(Arc::from),
            location,
            timestamp,
            mode,
        }
    }
}

/// Per-lock usage statistics. Lives behind the lock's own stats guard,
/// never behind the primitive.
///
/// The count is the queue length, so the two cannot drift apart.
#[derive(Debug, Default)]
pub(crate) struct LockStats {
    pub(crate) heuristic: DeadlockHeuristic,
    queue: Vec<CallerRecord>,
}

impl LockStats {
    pub(crate) fn new(heuristic: DeadlockHeuristic) -> Self {
        Self {
            heuristic,
            queue: Vec::new(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn callers(&self) -> &[CallerRecord] {
        &self.queue
    }

    pub(crate) fn push(&mut self, record: CallerRecord) -> Result<(), TryReserveError> {
        self.queue.try_reserve(1)?;
        self.queue.push(record);
        Ok(())
    }

    /// Detach the most recent record `session` added. Removal is LIFO per
    /// session so it always pairs with the session's own held sequence.
    pub(crate) fn remove_latest(&mut self, session: SessionId) -> Option<CallerRecord> {
        let pos = self.queue.iter().rposition(|r| r.session == session)?;
        Some(self.queue.remove(pos))
    }

    pub(crate) fn drain(&mut self) -> Vec<CallerRecord> {
        std::mem::take(&mut self.queue)
    }
}
