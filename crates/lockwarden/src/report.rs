use std::{fmt::Display, sync::Arc};

use lockwarden_common::{LockId, LockKind, LockMode, SessionId, Timestamp};

use crate::stats::CallerRecord;

const HEAVY_RULE: &str = "=====================================";
const LIGHT_RULE: &str = "-----------------------------";

/// Point-in-time copy of one caller record. Owns everything it shows, so it
/// stays valid after the lock is released or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerReport {
    pub session: SessionId,
    pub thread_name: Option<Arc<str>>,
    pub file: &'static str,
    pub line: u32,
    pub timestamp: Timestamp,
    pub mode: LockMode,
}

impl From<&CallerRecord> for CallerReport {
    fn from(r: &CallerRecord) -> Self {
        Self {
            session: r.session,
            thread_name: r.thread_name.clone(),
            file: r.location.file(),
            line: r.location.line(),
            timestamp: r.timestamp,
            mode: r.mode,
        }
    }
}

impl Display for CallerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Caller: {} - {} - Timestamp: {} ({}",
            self.file, self.line, self.timestamp, self.session
        )?;
        if let Some(name) = &self.thread_name {
            write!(f, " on {name}")?;
        }
        if self.mode != LockMode::Basic {
            write!(f, ", {}", self.mode)?;
        }
        f.write_str(")")
    }
}

/// Snapshot of one lock, for printing only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockReport {
    pub id: LockId,
    pub name: String,
    pub kind: LockKind,
    pub count: usize,
    pub threshold: usize,
    pub callers: Vec<CallerReport>,
}

impl Display for LockReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{HEAVY_RULE}")?;
        writeln!(f, "Lock: {} ({})", self.name, self.id)?;
        writeln!(f, "Type: {}", self.kind)?;
        writeln!(f, "Count: {}", self.count)?;
        writeln!(f, "Callers")?;
        writeln!(f, "{LIGHT_RULE}")?;
        for caller in &self.callers {
            writeln!(f, "{caller}")?;
        }
        writeln!(f, "{HEAVY_RULE}")
    }
}

/// Snapshot of every live lock in a registry, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryReport {
    pub locks: Vec<LockReport>,
}

impl RegistryReport {
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Display for RegistryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for lock in &self.locks {
            write!(f, "{lock}")?;
        }
        Ok(())
    }
}
