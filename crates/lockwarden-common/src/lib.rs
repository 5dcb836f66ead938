use std::fmt::Display;

mod error;
mod id;

pub use error::{LockError, LockResult, OrderViolation};
pub use id::{LockId, RegistryId, SessionId};

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// The kind of native primitive backing a lock. Fixed for the lock's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Mutex,
    RecursiveMutex,
    ReadWrite,
}

impl LockKind {
    /// Map a requested mode onto the modes this kind actually supports.
    ///
    /// Exclusive kinds only know [`LockMode::Basic`]. A read/write lock
    /// treats a basic request as a write.
    pub fn normalize(self, mode: LockMode) -> LockMode {
        match (self, mode) {
            (LockKind::Mutex | LockKind::RecursiveMutex, _) => LockMode::Basic,
            (LockKind::ReadWrite, LockMode::Read) => LockMode::Read,
            (LockKind::ReadWrite, _) => LockMode::Write,
        }
    }

    pub fn is_recursive(self) -> bool {
        matches!(self, LockKind::RecursiveMutex)
    }
}

impl Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LockKind::Mutex => "MUTEX",
            LockKind::RecursiveMutex => "RECURSIVE",
            LockKind::ReadWrite => "Read/Write",
        })
    }
}

/// How a session wants to hold a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockMode {
    #[default]
    Basic,
    Read,
    Write,
}

impl LockMode {
    /// Suffix used in lock transition logs, e.g. `LOCKED (RW-READ): name`.
    pub fn log_suffix(self) -> &'static str {
        match self {
            LockMode::Basic => "",
            LockMode::Read => " (RW-READ)",
            LockMode::Write => " (RW-WRITE)",
        }
    }
}

impl Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LockMode::Basic => "basic",
            LockMode::Read => "read",
            LockMode::Write => "write",
        })
    }
}
