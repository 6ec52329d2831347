//! Error types for gitupdater-sync.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failures of the process capability itself, before any exit code exists.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The program could not be started (usually: not installed).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The deadline passed; the child was killed.
    #[error("`{program}` timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    /// Waiting on or reading from the child failed.
    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// True when the program binary does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RunnerError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Why a single target could not be updated. Never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateError {
    #[error("not a git working copy: {path}")]
    NotARepository { path: PathBuf },

    /// Uncommitted or untracked changes would be at risk; nothing was touched.
    #[error("working copy has local changes: {changes}")]
    DirtyWorkingCopy { changes: String },

    /// Local history diverged from the remote; a fast-forward is impossible.
    #[error("cannot fast-forward: {reason}")]
    MergeConflict { reason: String },

    #[error("fetch failed: {reason}")]
    NetworkFailure { reason: String },

    #[error("timed out after {}s", .after.as_secs())]
    Timeout {
        #[serde(rename = "after_secs", serialize_with = "as_secs")]
        after: Duration,
    },

    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl UpdateError {
    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::NotARepository { .. } => "not_a_repository",
            UpdateError::DirtyWorkingCopy { .. } => "dirty_working_copy",
            UpdateError::MergeConflict { .. } => "merge_conflict",
            UpdateError::NetworkFailure { .. } => "network_failure",
            UpdateError::Timeout { .. } => "timeout",
            UpdateError::CommandFailed { .. } => "command_failed",
            UpdateError::Internal { .. } => "internal",
        }
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}
