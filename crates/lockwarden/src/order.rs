//! Acquisition-order validation.
//!
//! Lock ids are handed out in creation order and form a total order within
//! one registry. A session that only ever acquires ids at or above
//! everything it already holds from the same registry can never be part of
//! a cyclic wait with another such session. Locks of different registries
//! are never compared.

use std::sync::Arc;

use lockwarden_common::{LockId, LockKind, LockMode, OrderViolation, RegistryId};

/// One entry of a session's held sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldLock {
    pub registry: RegistryId,
    pub id: LockId,
    pub name: Arc<str>,
    pub mode: LockMode,
}

impl HeldLock {
    /// Whether this entry refers to lock `id` of `registry`.
    pub fn is(&self, registry: RegistryId, id: LockId) -> bool {
        self.registry == registry && self.id == id
    }
}

/// Check whether a session holding `held` (in acquisition order) may
/// acquire the lock `id` of `registry`.
///
/// Re-entry is checked before ordering, so taking a held non-recursive lock
/// again reports [`OrderViolation::SelfReentrant`] even when a higher id is
/// also held.
pub fn check_order(
    held: &[HeldLock],
    registry: RegistryId,
    id: LockId,
    name: &str,
    kind: LockKind,
) -> Result<(), OrderViolation> {
    if !kind.is_recursive() && held.iter().any(|h| h.is(registry, id)) {
        return Err(OrderViolation::SelfReentrant {
            id,
            name: name.into(),
        });
    }

    if let Some(h) = held.iter().find(|h| h.registry == registry && id < h.id) {
        return Err(OrderViolation::OutOfOrder {
            id,
            name: name.into(),
            held: h.id,
            held_name: (*h.name).into(),
        });
    }

    Ok(())
}

/// Whether `held` respects the non-decreasing id order within each registry.
pub fn is_ordered(held: &[HeldLock]) -> bool {
    held.iter().enumerate().all(|(i, a)| {
        held[i + 1..]
            .iter()
            .all(|b| a.registry != b.registry || a.id <= b.id)
    })
}
