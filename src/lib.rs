//! flok: file-based mutual-exclusion lock for coordinating unrelated processes.
//!
//! Processes that have no channel to each other beyond a shared filesystem
//! can serialize access to a named resource: each constructs a
//! [`FileMutex`] with the same identifier, and at most one holds the lock
//! at any instant. No OS-native lock primitive and no external lock service
//! are involved; the lock file itself is the shared state.
//!
//! The crate also ships a small `flok` CLI for inspecting and maintaining
//! lock files (`flok status`, `flok run`, `flok mark`, ...).

pub mod cli;
pub mod commands;
pub mod error;
pub mod exit_codes;
pub mod mutex;
pub mod resolve;
pub mod store;

pub use error::{LockError, Result};
pub use mutex::{DEFAULT_TIMEOUT, FileMutex, LockGuard};
pub use resolve::LockDir;
pub use store::CorruptPolicy;
