//! Command implementations for flok.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Handlers return the process exit code so that `run`
//! can propagate its child's code.

use crate::cli::{Command, LockRefArgs, RunArgs, StatusArgs};
use crate::error::{LockError, Result};
use crate::exit_codes;
use crate::mutex::{DEFAULT_TIME_FORMAT, FileMutex};
use crate::resolve::LockDir;
use crate::store::CorruptPolicy;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Dispatch a command to its implementation.
///
/// Returns the exit code for the process on success; errors carry their own
/// exit codes via [`LockError::exit_code`].
pub fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Status(args) => cmd_status(args),
        Command::Run(args) => cmd_run(args),
        Command::Mark(args) => cmd_mark(args),
        Command::Unmark(args) => cmd_unmark(args),
        Command::Clear(args) => cmd_clear(args),
    }
}

/// Build the mutex a command addresses.
fn resolve_mutex(lock: &LockRefArgs, strict: bool) -> FileMutex {
    let dir = match &lock.lock_dir {
        Some(path) => LockDir::new(path.clone()),
        None => LockDir::default(),
    };
    let mutex = FileMutex::with_dir(&lock.id, &dir);
    if strict {
        mutex.corrupt_policy(CorruptPolicy::Error)
    } else {
        mutex
    }
}

/// Machine-readable lock state for `status --json`.
#[derive(Debug, Serialize)]
struct LockStatus<'a> {
    identifier: &'a str,
    held: bool,
    holders: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_touched: Option<DateTime<Utc>>,
    path: &'a Path,
}

fn cmd_status(args: StatusArgs) -> Result<i32> {
    let mutex = resolve_mutex(&args.lock, false);
    let holders = mutex.holders()?;
    let last_touched = mutex.last_touched()?;

    if args.json {
        let status = LockStatus {
            identifier: mutex.identifier(),
            held: holders > 0,
            holders,
            last_touched,
            path: mutex.path(),
        };
        println!("{}", serde_json::to_string_pretty(&status)
            .map_err(|e| LockError::Storage(format!("failed to serialize status: {}", e)))?);
    } else {
        println!("lock:         {}", mutex.identifier());
        if holders > 0 {
            println!("state:        held ({} holder{})", holders, if holders == 1 { "" } else { "s" });
        } else {
            println!("state:        free");
        }
        println!("last touched: {}", mutex.last_touched_formatted(None)?);
        println!("file:         {}", mutex.path().display());
    }

    Ok(exit_codes::SUCCESS)
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let words = shell_words::split(&args.command)
        .map_err(|e| LockError::Storage(format!("failed to parse command: {}", e)))?;
    let (program, cmd_args) = words
        .split_first()
        .ok_or_else(|| LockError::Storage("empty command".to_string()))?;

    let mutex = resolve_mutex(&args.lock, args.strict);
    let guard = match args.timeout {
        Some(seconds) => {
            // try_from rejects negative, non-finite, and overflowing values
            let timeout = Duration::try_from_secs_f64(seconds).map_err(|e| {
                LockError::Storage(format!("invalid timeout {}: {}", seconds, e))
            })?;
            mutex.acquire(timeout)?
        }
        None => mutex.acquire_default()?,
    };

    let status = std::process::Command::new(program)
        .args(cmd_args)
        .status()
        .map_err(|e| LockError::Storage(format!("failed to run '{}': {}", program, e)));

    match status {
        Ok(status) => {
            guard.release()?;
            Ok(status.code().unwrap_or(exit_codes::USER_ERROR))
        }
        Err(e) => {
            // The guard's drop releases the lock and reports any release
            // failure on stderr, keeping the spawn failure as the primary error
            drop(guard);
            Err(e)
        }
    }
}

fn cmd_mark(args: LockRefArgs) -> Result<i32> {
    let mutex = resolve_mutex(&args, false);
    let stamp = mutex.mark()?;
    println!("{}", stamp.with_timezone(&Local).format(DEFAULT_TIME_FORMAT));
    Ok(exit_codes::SUCCESS)
}

fn cmd_unmark(args: LockRefArgs) -> Result<i32> {
    let mutex = resolve_mutex(&args, false);
    let stamp = mutex.unmark()?;
    match stamp {
        Some(stamp) => println!("{}", stamp.with_timezone(&Local).format(DEFAULT_TIME_FORMAT)),
        None => println!("never"),
    }
    Ok(exit_codes::SUCCESS)
}

fn cmd_clear(args: LockRefArgs) -> Result<i32> {
    let mutex = resolve_mutex(&args, false);
    if !mutex.path().exists() {
        return Err(LockError::Storage(format!(
            "lock '{}' does not exist at: {}",
            mutex.identifier(),
            mutex.path().display()
        )));
    }
    mutex.unmark()?;
    println!("cleared lock '{}'", mutex.identifier());
    Ok(exit_codes::SUCCESS)
}
