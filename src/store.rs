//! Lock state store: the counter file backing one lock.
//!
//! The on-disk format is a plain-text non-negative decimal integer counting
//! the current holders. 0 or an absent file means free, >= 1 means held.
//! No header, no versioning.
//!
//! The held/free transition uses **create_new** semantics (exclusive create)
//! so that two processes racing on a free lock cannot both claim it. The
//! read/increment/decrement primitives survive as reentrancy and diagnostic
//! aids on an already-claimed file; the acquire path never read-modify-writes
//! an absent file.

use crate::error::{LockError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// How to treat lock file content that does not parse as a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Treat unparsable content as a free lock (counter 0).
    ///
    /// This silently recovers from filesystem corruption at the cost of
    /// possibly losing mutual exclusion on a damaged file.
    #[default]
    TreatAsFree,

    /// Surface unparsable content as [`LockError::CorruptState`] so that
    /// operators can detect filesystem problems.
    Error,
}

/// Read/write access to the counter file at one lock path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    corrupt_policy: CorruptPolicy,
}

impl StateStore {
    /// Create a store over the given lock file path.
    pub fn new(path: PathBuf, corrupt_policy: CorruptPolicy) -> Self {
        Self {
            path,
            corrupt_policy,
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lock file currently exists.
    ///
    /// A cheap "is anyone touching this lock" probe. The file can exist with
    /// a counter of 0 (e.g. after a heartbeat `mark` on a free lock), so
    /// existence alone does not mean held.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the holder counter. 0 if the file does not exist.
    pub fn read(&self) -> Result<u64> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(LockError::storage("read lock file", &self.path, e)),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }

        match trimmed.parse::<u64>() {
            Ok(count) => Ok(count),
            Err(_) => match self.corrupt_policy {
                CorruptPolicy::TreatAsFree => Ok(0),
                CorruptPolicy::Error => Err(LockError::CorruptState {
                    path: self.path.clone(),
                    content: trimmed.to_string(),
                }),
            },
        }
    }

    /// Attempt the atomic held/free transition.
    ///
    /// Returns `Ok(true)` when this call claimed the lock, `Ok(false)` when
    /// another holder already has it. The common path is a single exclusive
    /// create of the lock file with counter 1, so two racing claimants cannot
    /// both succeed.
    ///
    /// If the file already exists but records no holders (a heartbeat-touched
    /// or empty file), the stale file is removed and the exclusive create is
    /// retried, so two claimants racing on that state collapse to a retry in
    /// which exactly one create succeeds.
    pub fn try_claim(&self) -> Result<bool> {
        self.ensure_parent_dir()?;

        loop {
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.read()? > 0 {
                        return Ok(false);
                    }
                    // Heartbeat-touched file with no holders: clear it out of
                    // the way and go back to the exclusive create
                    match fs::remove_file(&self.path) {
                        Ok(()) => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => {
                            return Err(LockError::storage("remove lock file", &self.path, e));
                        }
                    }
                }
                Err(e) => return Err(LockError::storage("create lock file", &self.path, e)),
            };

            file.write_all(b"1").map_err(|e| {
                // Clean up the half-written lock file so no partial state remains
                let _ = fs::remove_file(&self.path);
                LockError::storage("write lock file", &self.path, e)
            })?;

            file.sync_all().map_err(|e| {
                let _ = fs::remove_file(&self.path);
                LockError::storage("sync lock file", &self.path, e)
            })?;

            return Ok(true);
        }
    }

    /// Increment the holder counter, creating the file if absent.
    ///
    /// Reentrancy/diagnostic aid; not an exclusivity mechanism. Use
    /// [`try_claim`](Self::try_claim) for the held/free transition.
    pub fn increment(&self) -> Result<u64> {
        self.ensure_parent_dir()?;
        let next = self.read()? + 1;
        self.write_counter(next)?;
        Ok(next)
    }

    /// Decrement the holder counter, deleting the file when it reaches 0.
    ///
    /// Never writes a negative value: decrementing a free lock is a no-op
    /// returning 0.
    pub fn decrement(&self) -> Result<u64> {
        let current = self.read()?;
        if current > 1 {
            self.write_counter(current - 1)?;
            Ok(current - 1)
        } else {
            self.clear()?;
            Ok(0)
        }
    }

    /// Remove the lock file entirely, regardless of counter value.
    ///
    /// Tolerates an already-absent file.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::storage("remove lock file", &self.path, e)),
        }
    }

    fn write_counter(&self, count: u64) -> Result<()> {
        let mut file = fs::File::create(&self.path)
            .map_err(|e| LockError::storage("create lock file", &self.path, e))?;

        file.write_all(count.to_string().as_bytes())
            .map_err(|e| LockError::storage("write lock file", &self.path, e))?;

        file.sync_all()
            .map_err(|e| LockError::storage("sync lock file", &self.path, e))
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .map_err(|e| LockError::storage("create lock directory", parent, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, policy: CorruptPolicy) -> StateStore {
        StateStore::new(dir.path().join("test.lock"), policy)
    }

    #[test]
    fn read_missing_file_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);
        assert_eq!(store.read().unwrap(), 0);
        assert!(!store.exists());
    }

    #[test]
    fn read_empty_file_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);
        fs::write(store.path(), "").unwrap();
        assert_eq!(store.read().unwrap(), 0);
        assert!(store.exists());
    }

    #[test]
    fn read_parses_counter_with_surrounding_whitespace() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);
        fs::write(store.path(), " 3\n").unwrap();
        assert_eq!(store.read().unwrap(), 3);
    }

    #[test]
    fn corrupt_content_reads_as_free_by_default() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);
        fs::write(store.path(), "not a number").unwrap();
        assert_eq!(store.read().unwrap(), 0);
    }

    #[test]
    fn corrupt_content_errors_in_strict_mode() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::Error);
        fs::write(store.path(), "not a number").unwrap();
        let err = store.read().unwrap_err();
        assert!(matches!(err, LockError::CorruptState { .. }));
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn negative_content_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::Error);
        fs::write(store.path(), "-2").unwrap();
        assert!(matches!(
            store.read().unwrap_err(),
            LockError::CorruptState { .. }
        ));
    }

    #[test]
    fn try_claim_on_free_lock_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);

        assert!(store.try_claim().unwrap());
        assert_eq!(store.read().unwrap(), 1);
    }

    #[test]
    fn try_claim_on_held_lock_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);

        assert!(store.try_claim().unwrap());
        assert!(!store.try_claim().unwrap());
        assert_eq!(store.read().unwrap(), 1);
    }

    #[test]
    fn try_claim_on_marked_but_free_file_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);

        // A heartbeat-touched file holds no counter but does exist
        fs::write(store.path(), "").unwrap();
        assert!(store.try_claim().unwrap());
        assert_eq!(store.read().unwrap(), 1);
    }

    #[test]
    fn racing_claims_on_a_marked_file_yield_one_holder() {
        use std::sync::{Arc, Barrier};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");
        // A heartbeat-touched free lock: the file exists with no counter
        fs::write(&path, "").unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = StateStore::new(path.clone(), CorruptPolicy::TreatAsFree);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.try_claim().unwrap()
                })
            })
            .collect();

        let claims = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&claimed| claimed)
            .count();

        assert_eq!(claims, 1, "exactly one racer may claim a marked free lock");
        let survivor = StateStore::new(path, CorruptPolicy::TreatAsFree);
        assert_eq!(survivor.read().unwrap(), 1);
    }

    #[test]
    fn try_claim_creates_missing_lock_directory() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(
            dir.path().join("nested").join("deeper").join("test.lock"),
            CorruptPolicy::TreatAsFree,
        );

        assert!(store.try_claim().unwrap());
        assert_eq!(store.read().unwrap(), 1);
    }

    #[test]
    fn increment_and_decrement_walk_the_counter() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);

        assert_eq!(store.increment().unwrap(), 1);
        assert_eq!(store.increment().unwrap(), 2);
        assert_eq!(store.decrement().unwrap(), 1);
        assert!(store.exists());
        assert_eq!(store.decrement().unwrap(), 0);
        assert!(!store.exists());
    }

    #[test]
    fn decrement_on_free_lock_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);

        assert_eq!(store.decrement().unwrap(), 0);
        assert!(!store.exists());
    }

    #[test]
    fn clear_tolerates_absent_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, CorruptPolicy::TreatAsFree);

        store.clear().unwrap();

        assert!(store.try_claim().unwrap());
        store.clear().unwrap();
        assert!(!store.exists());
    }
}
