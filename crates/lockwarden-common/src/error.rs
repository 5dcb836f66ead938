use thiserror::Error;

use crate::{LockId, LockMode, SessionId};

pub type LockResult<T> = Result<T, LockError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Invalid argument ({0})")]
    ArgErr(Box<str>),
    #[error("Lock order violation: {0}")]
    OrderViolation(#[from] OrderViolation),
    #[error("Deadlock suspected on lock \"{name}\". Count: {count} Max: {threshold}")]
    DeadlockSuspected {
        name: Box<str>,
        count: usize,
        threshold: usize,
    },
    #[error("Failed to record a caller for lock \"{0}\"")]
    AllocationFailure(Box<str>),
    #[error("Lock \"{name}\" is not held by {session}")]
    NotHeld { name: Box<str>, session: SessionId },
    #[error("Lock \"{name}\" is held in {held} mode but was released in {requested} mode")]
    ModeMismatch {
        name: Box<str>,
        held: LockMode,
        requested: LockMode,
    },
    #[error("{session} still holds {held} lock(s)")]
    SessionNotEmpty { session: SessionId, held: usize },
    #[error("Lock \"{name}\" is still held by {count} caller(s)")]
    LockHeld { name: Box<str>, count: usize },
    #[error("Lock \"{name}\" ({id}) has been removed from the registry")]
    LockRemoved { name: Box<str>, id: LockId },
}

impl LockError {
    /// Errors that signal a misuse of the API rather than a policy refusal.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            LockError::NotHeld { .. }
                | LockError::ModeMismatch { .. }
                | LockError::SessionNotEmpty { .. }
                | LockError::LockHeld { .. }
                | LockError::LockRemoved { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderViolation {
    #[error("lock \"{name}\" ({id}) is not recursive and is already held by this session")]
    SelfReentrant { id: LockId, name: Box<str> },
    #[error("lock \"{name}\" ({id}) requested while holding \"{held_name}\" ({held})")]
    OutOfOrder {
        id: LockId,
        name: Box<str>,
        held: LockId,
        held_name: Box<str>,
    },
}

impl OrderViolation {
    /// The lock whose acquisition was checked.
    pub fn lock_id(&self) -> LockId {
        match self {
            OrderViolation::SelfReentrant { id, .. } | OrderViolation::OutOfOrder { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn violation_converts_into_lock_error() {
        let v = OrderViolation::OutOfOrder {
            id: LockId::new(1),
            name: "lock1".into(),
            held: LockId::new(2),
            held_name: "lock2".into(),
        };
        let err: LockError = v.clone().into();
        assert_eq!(err, LockError::OrderViolation(v));
        assert_eq!(
            err.to_string(),
            "Lock order violation: lock \"lock1\" (#1) requested while holding \"lock2\" (#2)"
        );
        assert!(!err.is_usage_error());
    }

    #[test]
    fn deadlock_message_mentions_count_and_max() {
        let err = LockError::DeadlockSuspected {
            name: "simpleton".into(),
            count: 10,
            threshold: 10,
        };
        assert_eq!(
            err.to_string(),
            "Deadlock suspected on lock \"simpleton\". Count: 10 Max: 10"
        );
    }
}
