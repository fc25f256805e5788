//! File-based mutual exclusion across unrelated processes.
//!
//! A [`FileMutex`] coordinates exclusive access to a named resource using
//! only the filesystem as shared state: any process that constructs a mutex
//! with the same identifier (and the same [`LockDir`]) addresses the same
//! lock file. Acquisition polls the lock file with randomized backoff until
//! it becomes free or a deadline elapses; the held/free transition itself is
//! a single exclusive create, so two racing claimants cannot both succeed.
//!
//! # RAII Guards
//!
//! Successful acquisition returns a [`LockGuard`] that releases the lock
//! when dropped. If release fails during drop, a warning is printed to
//! stderr but the program does not crash, so an unwinding scope never loses
//! its original error to a secondary release failure.
//!
//! # Example
//!
//! ```no_run
//! use flok::{FileMutex, LockDir};
//! use std::time::Duration;
//!
//! let mutex = FileMutex::new("job-7");
//! let guard = mutex.acquire(Duration::from_secs(5))?;
//! // ... exclusive work ...
//! guard.release()?;
//! # Ok::<(), flok::LockError>(())
//! ```

use crate::error::{LockError, Result};
use crate::resolve::LockDir;
use crate::store::{CorruptPolicy, StateStore};
use chrono::{DateTime, Local, Utc};
use filetime::FileTime;
use rand::Rng;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};

/// Default acquisition timeout when the caller supplies none: effectively
/// "wait forever" (one year).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default pattern for [`FileMutex::last_touched_formatted`].
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Backoff bounds for the acquisition poll, in milliseconds.
///
/// The interval is sampled uniformly per attempt so that multiple waiters
/// do not retry in lockstep.
const BACKOFF_MIN_MS: u64 = 100;
const BACKOFF_MAX_MS: u64 = 1000;

/// A named inter-process lock backed by a file.
#[derive(Debug, Clone)]
pub struct FileMutex {
    identifier: String,
    store: StateStore,
}

impl FileMutex {
    /// Create a mutex for `identifier` in the default lock directory.
    pub fn new(identifier: &str) -> Self {
        Self::with_dir(identifier, &LockDir::default())
    }

    /// Create a mutex for `identifier` in an explicit lock directory.
    ///
    /// All cooperating processes must use the same directory.
    pub fn with_dir(identifier: &str, dir: &LockDir) -> Self {
        Self {
            identifier: identifier.to_string(),
            store: StateStore::new(dir.lock_path(identifier), CorruptPolicy::default()),
        }
    }

    /// Select how unparsable lock file content is treated.
    ///
    /// The default matches the historical behavior (corrupt content reads as
    /// free); [`CorruptPolicy::Error`] surfaces it instead.
    pub fn corrupt_policy(mut self, policy: CorruptPolicy) -> Self {
        self.store = StateStore::new(self.store.path().to_path_buf(), policy);
        self
    }

    /// The identifier this mutex was constructed with.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The resolved lock file path.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Whether the lock is currently held by anyone.
    pub fn is_held(&self) -> Result<bool> {
        Ok(self.store.read()? > 0)
    }

    /// Current holder counter (0 = free).
    pub fn holders(&self) -> Result<u64> {
        self.store.read()
    }

    /// Acquire the lock, waiting until it is free or `timeout` elapses.
    ///
    /// Polls with a uniformly random 100-1000 ms backoff between attempts.
    /// If the deadline passes while the lock is still held, returns
    /// [`LockError::Timeout`] without claiming the lock. An interrupt during
    /// the wait terminates the process under the default signal disposition;
    /// nothing here installs a handler that would swallow it, and the claim
    /// step is a single exclusive create, so no partial state is left behind.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        // Saturate instead of panicking on absurd timeouts (Duration::MAX
        // overflows Instant arithmetic); a year out is already "forever"
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + DEFAULT_TIMEOUT);

        loop {
            if self.store.try_claim()? {
                return Ok(LockGuard::new(self.identifier.clone(), self.store.clone()));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LockError::Timeout {
                    identifier: self.identifier.clone(),
                    waited: timeout,
                });
            }

            let backoff =
                Duration::from_millis(rand::thread_rng().gen_range(BACKOFF_MIN_MS..=BACKOFF_MAX_MS));
            // Never sleep past the deadline; the timeout error should land
            // close to the requested duration
            std::thread::sleep(backoff.min(remaining));
        }
    }

    /// Acquire with the default "effectively forever" timeout.
    pub fn acquire_default(&self) -> Result<LockGuard> {
        self.acquire(DEFAULT_TIMEOUT)
    }

    /// Run `work` while holding the lock, releasing it on every exit path.
    ///
    /// If `work` panics, the guard's drop still releases the lock during
    /// unwinding. A release failure on the normal path is surfaced as the
    /// call's error.
    pub fn with_acquired<T>(&self, timeout: Duration, work: impl FnOnce() -> T) -> Result<T> {
        let guard = self.acquire(timeout)?;
        let out = work();
        guard.release()?;
        Ok(out)
    }

    /// When the lock file was last touched, or `None` if it does not exist.
    pub fn last_touched(&self) -> Result<Option<DateTime<Utc>>> {
        let metadata = match std::fs::metadata(self.store.path()) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LockError::storage("stat lock file", self.store.path(), e)),
        };

        let accessed = metadata
            .accessed()
            .map_err(|e| LockError::storage("read access time of", self.store.path(), e))?;

        Ok(Some(DateTime::<Utc>::from(accessed)))
    }

    /// Human-readable form of [`last_touched`](Self::last_touched).
    ///
    /// Formats in local time with `format`, defaulting to
    /// [`DEFAULT_TIME_FORMAT`]. Returns `"never"` when the lock file does
    /// not exist.
    pub fn last_touched_formatted(&self, format: Option<&str>) -> Result<String> {
        let pattern = format.unwrap_or(DEFAULT_TIME_FORMAT);
        Ok(match self.last_touched()? {
            Some(instant) => instant.with_timezone(&Local).format(pattern).to_string(),
            None => "never".to_string(),
        })
    }

    /// Heartbeat: update the lock file's timestamp without changing its
    /// held/free state, returning the new timestamp.
    ///
    /// Creates the file if absent. A freshly created file is empty, which
    /// reads as counter 0, so touching never makes the lock held.
    pub fn mark(&self) -> Result<DateTime<Utc>> {
        if let Some(parent) = self.store.path().parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| LockError::storage("create lock directory", parent, e))?;
        }

        // append mode so an existing counter is not truncated away
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.store.path())
            .map_err(|e| LockError::storage("touch lock file", self.store.path(), e))?;

        let now = Utc::now();
        let stamp = FileTime::from_system_time(now.into());
        filetime::set_file_times(self.store.path(), stamp, stamp)
            .map_err(|e| LockError::storage("set times on lock file", self.store.path(), e))?;

        Ok(now)
    }

    /// Capture the current timestamp, then clear the lock file entirely
    /// (regardless of counter value), returning the captured timestamp.
    pub fn unmark(&self) -> Result<Option<DateTime<Utc>>> {
        let stamp = self.last_touched()?;
        self.store.clear()?;
        Ok(stamp)
    }
}

/// RAII guard for an acquired lock.
///
/// Dropping the guard releases the lock (decrements the holder counter,
/// deleting the lock file when it reaches 0). If release fails during drop,
/// a warning is printed to stderr but no panic occurs.
#[derive(Debug)]
pub struct LockGuard {
    identifier: String,
    store: StateStore,
    released: bool,
}

impl LockGuard {
    fn new(identifier: String, store: StateStore) -> Self {
        Self {
            identifier,
            store,
            released: false,
        }
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Manually release the lock, with explicit error handling.
    ///
    /// Consuming `self` makes a second release on the same handle impossible
    /// at compile time; the store-level decrement additionally never drives
    /// the counter negative, so even an out-of-band double release cannot
    /// corrupt the state.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        debug_assert!(!self.released, "lock '{}' released twice", self.identifier);
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.store.decrement()?;
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.store.decrement()
        {
            eprintln!("Warning: failed to release lock '{}': {}", self.identifier, e);
        }
    }
}
