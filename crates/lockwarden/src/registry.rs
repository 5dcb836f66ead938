use std::sync::Arc;

use lockwarden_common::{LockError, LockId, LockKind, LockResult, RegistryId};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::{
    configure::Configure,
    heuristic::DeadlockHeuristic,
    lock::Lock,
    policy::Policy,
    report::{LockReport, RegistryReport},
};

/// Owns every live [`Lock`] and the process-wide policy flags.
///
/// Structural changes take the writer side of the registry guard; listing
/// and name lookup take the reader side and may run concurrently. Build one
/// at startup and pass it by reference to whatever creates locks.
pub struct LockRegistry {
    inner: RwLock<RegistryInner>,
    policy: Arc<Policy>,
    heuristic: DeadlockHeuristic,
}

struct RegistryInner {
    locks: Vec<Arc<Lock>>,
    next_id: u64,
}

/// Counters over the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub locks: usize,
    pub created: u64,
    pub order_violations: u64,
    pub deadlock_suspicions: u64,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::with_config(Configure::default())
    }

    pub fn with_config(config: Configure) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                locks: Vec::new(),
                next_id: 1,
            }),
            policy: Arc::new(Policy::new(&config)),
            heuristic: DeadlockHeuristic::new(config.deadlock_heuristic, config.deadlock_threshold),
        }
    }

    /// Create a lock and register it. The id is assigned and the lock
    /// inserted in a single writer-guarded step.
    pub fn create_lock(&self, name: &str, kind: LockKind) -> LockResult<Arc<Lock>> {
        if name.is_empty() {
            error!(op = "create_lock", "No lock name provided");
            return Err(LockError::ArgErr("lock name must not be empty".into()));
        }

        let name: Arc<str> = Arc::from(name);
        let mut inner = self.inner.write();
        let id = LockId::new(inner.next_id);
        inner.next_id += 1;
        let lock = Arc::new(Lock::new(
            id,
            name,
            kind,
            self.heuristic,
            self.policy.clone(),
        ));
        inner.locks.push(lock.clone());
        Ok(lock)
    }

    pub fn create_mutex(&self, name: &str) -> LockResult<Arc<Lock>> {
        self.create_lock(name, LockKind::Mutex)
    }

    pub fn create_recursive(&self, name: &str) -> LockResult<Arc<Lock>> {
        self.create_lock(name, LockKind::RecursiveMutex)
    }

    pub fn create_rw(&self, name: &str) -> LockResult<Arc<Lock>> {
        self.create_lock(name, LockKind::ReadWrite)
    }

    /// Unregister `lock` and drop its caller queue. Refused while any
    /// session holds or waits on it.
    pub fn remove_lock(&self, lock: &Lock) -> LockResult<()> {
        if lock.registry() != self.policy.registry() {
            let err = LockError::ArgErr(
                format!(
                    "lock \"{}\" ({}) belongs to {}, not {}",
                    lock.name(),
                    lock.id(),
                    lock.registry(),
                    self.policy.registry()
                )
                .into(),
            );
            error!(op = "remove_lock", "{}", err);
            return Err(err);
        }

        let mut inner = self.inner.write();
        let Some(pos) = inner.locks.iter().position(|l| std::ptr::eq(&**l, lock)) else {
            let err = LockError::LockRemoved {
                name: lock.name().into(),
                id: lock.id(),
            };
            error!(op = "remove_lock", "{}", err);
            return Err(err);
        };

        if let Err(count) = lock.try_finalize() {
            let err = LockError::LockHeld {
                name: lock.name().into(),
                count,
            };
            error!(op = "remove_lock", id = %lock.id(), "{}", err);
            return Err(err);
        }

        inner.locks.remove(pos);
        Ok(())
    }

    /// Unregister every lock. Locks that are still in use are reported and
    /// removed anyway; their holders can still release them.
    pub fn remove_all(&self) -> usize {
        let locks = std::mem::take(&mut self.inner.write().locks);
        for lock in &locks {
            let dropped = lock.finalize();
            if dropped > 0 {
                warn!(
                    op = "remove_all",
                    lock = %lock.name(),
                    id = %lock.id(),
                    "Removed lock still had {} caller(s)",
                    dropped
                );
            }
        }
        locks.len()
    }

    /// Name of the live lock with `id`. Removed locks are not remembered.
    pub fn name_by_id(&self, id: LockId) -> Option<String> {
        let inner = self.inner.read();
        inner
            .locks
            .iter()
            .find(|l| l.id() == id)
            .map(|l| l.name().to_owned())
    }

    pub fn get(&self, id: LockId) -> Option<Arc<Lock>> {
        let inner = self.inner.read();
        inner.locks.iter().find(|l| l.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the state of every live lock. For diagnostics only: the
    /// numbers may be stale by the time they are read.
    pub fn list_snapshot(&self) -> Vec<LockReport> {
        let inner = self.inner.read();
        inner.locks.iter().map(|l| l.report()).collect()
    }

    pub fn report(&self) -> RegistryReport {
        RegistryReport {
            locks: self.list_snapshot(),
        }
    }

    /// Print the current snapshot to stdout and the log.
    pub fn show_all(&self) {
        let report = self.report();
        if report.is_empty() {
            info!(op = "show_all", "No locks registered");
            return;
        }

        print!("{report}");
        info!(op = "show_all", locks = report.locks.len(), "\n{}", report);
    }

    pub fn id(&self) -> RegistryId {
        self.policy.registry()
    }

    pub fn set_trace(&self, enabled: bool) {
        self.policy.set_trace(enabled);
    }

    pub fn trace(&self) -> bool {
        self.policy.trace()
    }

    pub fn set_fail_fast(&self, enabled: bool) {
        self.policy.set_fail_fast(enabled);
    }

    pub fn fail_fast(&self) -> bool {
        self.policy.fail_fast()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read();
        RegistryStats {
            locks: inner.locks.len(),
            created: inner.next_id - 1,
            order_violations: self.policy.order_violations(),
            deadlock_suspicions: self.policy.deadlock_suspicions(),
        }
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("id", &self.id())
            .field("locks", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Drop for LockRegistry {
    fn drop(&mut self) {
        self.remove_all();
    }
}
