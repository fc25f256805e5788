//! Error types for flok.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for flok operations.
///
/// Each variant maps to a specific exit code so that the CLI can report
/// timeouts distinctly from ordinary filesystem failures.
#[derive(Error, Debug)]
pub enum LockError {
    /// Acquisition deadline elapsed before the lock became free.
    ///
    /// The lock is NOT claimed when this is returned.
    #[error("timed out after {waited:?} waiting for lock '{identifier}'")]
    Timeout {
        /// The lock identifier that was being acquired.
        identifier: String,
        /// How long the caller was willing to wait.
        waited: Duration,
    },

    /// An underlying filesystem operation failed.
    #[error("{0}")]
    Storage(String),

    /// Lock file content is not a non-negative decimal integer.
    ///
    /// Only surfaced under [`CorruptPolicy::Error`](crate::store::CorruptPolicy);
    /// the default policy treats unparsable content as a free lock.
    #[error("corrupt lock state in '{}': {:?}", .path.display(), .content)]
    CorruptState {
        /// The lock file containing the bad content.
        path: PathBuf,
        /// The offending content.
        content: String,
    },
}

impl LockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::Timeout { .. } => exit_codes::LOCK_TIMEOUT,
            LockError::Storage(_) => exit_codes::USER_ERROR,
            LockError::CorruptState { .. } => exit_codes::CORRUPT_STATE,
        }
    }

    /// Build a `Storage` error from a failed filesystem operation on a path.
    pub(crate) fn storage(what: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        LockError::Storage(format!("failed to {} '{}': {}", what, path.display(), err))
    }
}

/// Result type alias for flok operations.
pub type Result<T> = std::result::Result<T, LockError>;
