//! Lock file path resolution.
//!
//! Every process that names the same lock identifier must address the same
//! lock file, so the identifier-to-path mapping has to be deterministic and
//! independent of process identity or time. The identifier is hashed (SHA-256,
//! truncated to 32 hex characters) and the digest becomes the filename inside
//! a configured lock directory.
//!
//! The lock directory is an explicit configuration value rather than an
//! ambient process-global. [`LockDir::default()`] points at the platform
//! temporary directory (`/tmp` on Linux), which is expected to be writable
//! and visible to every cooperating process. That visibility is a deployment
//! precondition; nothing here enforces it.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// File extension for lock files.
pub const LOCK_FILE_EXTENSION: &str = "lock";

/// Number of hex characters of the digest kept in the filename.
const DIGEST_PREFIX_LEN: usize = 32;

/// Directory holding lock files, shared by all cooperating processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDir {
    root: PathBuf,
}

impl LockDir {
    /// Use an explicit directory for lock files.
    ///
    /// The directory does not need to exist yet; it is created on first
    /// acquisition.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// The directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier to its lock file path.
    ///
    /// Pure function of the identifier and this directory: the same
    /// identifier always resolves to the same path.
    pub fn lock_path(&self, identifier: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hash_identifier(identifier), LOCK_FILE_EXTENSION))
    }
}

impl Default for LockDir {
    /// Platform temporary directory (`/tmp` on Linux).
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

/// Hash a lock identifier into a filesystem-safe filename stem.
///
/// SHA-256, lowercase hex, truncated to 32 characters. The identifier space
/// is caller-controlled, not adversarial, so truncation is an accepted risk.
pub fn hash_identifier(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    let mut hex = String::with_capacity(DIGEST_PREFIX_LEN);
    for byte in digest.iter().take(DIGEST_PREFIX_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}
