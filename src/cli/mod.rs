//! CLI argument parsing for flok.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// flok: file-based mutual-exclusion lock for coordinating unrelated processes.
///
/// Locks are plain files in a shared directory; any process naming the same
/// lock identifier addresses the same file. The CLI inspects and maintains
/// those files and can run a command under a lock.
#[derive(Parser, Debug)]
#[command(name = "flok")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for flok.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the state of a lock.
    ///
    /// Reports held/free, the holder counter, the last-touched timestamp,
    /// and the resolved lock file path.
    Status(StatusArgs),

    /// Run a command while holding a lock.
    ///
    /// Acquires the lock (waiting up to --timeout), runs the command, and
    /// releases the lock on every exit path. The child's exit code is
    /// propagated.
    Run(RunArgs),

    /// Touch a lock file without changing its held/free state.
    ///
    /// A heartbeat for long-running holders; prints the new timestamp.
    Mark(LockRefArgs),

    /// Capture a lock's timestamp, then clear it entirely.
    ///
    /// Prints the captured timestamp (or "never" if the lock file did not
    /// exist).
    Unmark(LockRefArgs),

    /// Remove a lock file outright.
    ///
    /// Operator escape hatch for orphaned locks; no timestamp is reported.
    Clear(LockRefArgs),
}

/// Arguments shared by commands that address one lock.
#[derive(Args, Debug)]
pub struct LockRefArgs {
    /// Lock identifier (any string; hashed into the lock filename).
    pub id: String,

    /// Directory holding lock files (default: the platform temp directory).
    #[arg(long, value_name = "DIR")]
    pub lock_dir: Option<PathBuf>,
}

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub lock: LockRefArgs,

    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub lock: LockRefArgs,

    /// The command to run, as a single shell-words string (e.g. "sleep 5").
    pub command: String,

    /// Seconds to wait for the lock before giving up (default: wait
    /// effectively forever).
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Treat corrupt lock file content as an error instead of a free lock.
    #[arg(long)]
    pub strict: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
