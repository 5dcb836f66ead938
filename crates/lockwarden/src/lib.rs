//! lockwarden is an instrumented lock manager.
//!
//! A [`LockRegistry`] hands out named locks of three kinds (mutex, recursive
//! mutex, read/write). Threads take them through a [`Session`], which keeps
//! the ids it holds in acquisition order. Before anything can block, each
//! acquisition is checked against two policies:
//!
//! - the order validator: a session may not acquire a lock whose id is lower
//!   than one it already holds, nor re-enter a non-recursive lock. Under the
//!   fail-fast policy a violation terminates the process.
//! - the deadlock heuristic: once a lock has `threshold` callers holding or
//!   waiting, further acquisitions are refused instead of parked.
//!
//! Every lock keeps a queue of its callers (session, thread, source
//! location, time) that can be dumped with [`LockRegistry::show_all`].
#![deny(clippy::undocumented_unsafe_blocks)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod configure;
pub mod heuristic;
pub mod order;
pub mod report;

mod lock;
mod policy;
mod primitive;
mod registry;
mod session;
mod stats;

pub use configure::Configure;
pub use heuristic::{DeadlockHeuristic, DEFAULT_DEADLOCK_THRESHOLD};
pub use lock::Lock;
pub use lockwarden_common::{
    LockError, LockId, LockKind, LockMode, LockResult, OrderViolation, RegistryId, SessionId,
    Timestamp,
};
pub use order::HeldLock;
pub use registry::{LockRegistry, RegistryStats};
pub use report::{CallerReport, LockReport, RegistryReport};
pub use session::Session;
pub use stats::CallerRecord;
