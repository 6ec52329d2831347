//! Fetch-and-fast-forward for a single working copy.
//!
//! ## `Updater::update` — protocol
//!
//! 1. Missing path: clone when `--create` and a `url` are given, else
//!    `NotARepository`.
//! 2. `git rev-parse --show-toplevel` must name the target itself.
//! 3. `git fetch`, then count commits on each side of `HEAD...<upstream>`.
//!    Nothing behind is `AlreadyCurrent`, whatever the working tree holds.
//! 4. Behind: a diverged branch fails; otherwise `git status --porcelain`
//!    must be empty. Local changes are never touched.
//! 5. `git merge --ff-only <upstream>`. A refusal to overwrite local files is
//!    `DirtyWorkingCopy`, any other refusal `MergeConflict`.
//! 6. Compare `HEAD` to tell `Updated` from `AlreadyCurrent`.
//!
//! Dry-run replaces 3 with `git fetch --dry-run` and only trusts fetch output
//! that moves the upstream's own tracking ref.
//!
//! Every git call shares one per-target deadline.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use gitupdater_core::RepoTarget;

use crate::error::{RunnerError, UpdateError};
use crate::runner::{CommandOutput, Invocation, Runner};

/// Captured diagnostics are cut to this many bytes.
pub const REASON_LIMIT: usize = 4096;

const UPSTREAM: &str = "@{upstream}";

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of updating one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateResult {
    /// Remote changes were integrated (or, in dry-run, are waiting).
    Updated,
    /// Nothing to do; the working copy was not modified.
    AlreadyCurrent,
    Failed { error: UpdateError },
}

impl UpdateResult {
    pub fn failed(error: UpdateError) -> Self {
        UpdateResult::Failed { error }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UpdateResult::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpdateResult::Updated => "updated",
            UpdateResult::AlreadyCurrent => "already current",
            UpdateResult::Failed { .. } => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Only run read-only commands and report what would change.
    pub dry_run: bool,
    /// Clone missing working copies that have a `url`.
    pub create: bool,
    pub ignore_untracked_files: bool,
    /// Budget for the whole target, not per command.
    pub timeout: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            create: false,
            ignore_untracked_files: false,
            timeout: Duration::from_secs(gitupdater_core::types::DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub struct Updater<R> {
    runner: R,
    options: UpdateOptions,
}

struct Deadline {
    budget: Duration,
    at: Instant,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            budget,
            at: Instant::now() + budget,
        }
    }

    fn remaining(&self) -> Result<Duration, UpdateError> {
        self.at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or(UpdateError::Timeout { after: self.budget })
    }
}

impl<R: Runner> Updater<R> {
    pub fn new(runner: R, options: UpdateOptions) -> Self {
        Self { runner, options }
    }

    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// Update one target. Never panics on git failures; every problem becomes
    /// [`UpdateResult::Failed`].
    pub fn update(&self, target: &RepoTarget) -> UpdateResult {
        let deadline = Deadline::new(self.options.timeout);
        match self.try_update(target, &deadline) {
            Ok(result) => {
                tracing::debug!(repo = %target.name, result = result.label(), "target finished");
                result
            }
            Err(error) => {
                tracing::warn!(repo = %target.name, error = %error, "target failed");
                UpdateResult::failed(error)
            }
        }
    }

    fn try_update(&self, target: &RepoTarget, deadline: &Deadline) -> Result<UpdateResult, UpdateError> {
        let path = target.path.as_path();
        if !path.exists() {
            return match (&target.url, self.options.create) {
                (Some(url), true) => self.clone_into(url, path, deadline),
                _ => Err(UpdateError::NotARepository {
                    path: path.to_path_buf(),
                }),
            };
        }

        self.ensure_toplevel(path, deadline)?;

        let upstream = self.upstream(target, deadline)?;
        if self.options.dry_run {
            return self.preview(target, &upstream, deadline);
        }

        self.fetch(target, false, deadline)?;
        self.resolve(path, &upstream, deadline)?;
        let (ahead, behind) = self.divergence(path, &upstream, deadline)?;
        if behind == 0 {
            return Ok(UpdateResult::AlreadyCurrent);
        }
        if ahead > 0 {
            return Err(diverged(ahead, behind));
        }
        self.ensure_clean(path, deadline)?;

        let before = self.head(path, deadline)?;
        let merge = self.git(path, &["merge", "--ff-only", "--quiet", upstream.as_str()], deadline)?;
        if !merge.success() {
            let reason = truncate(merge.diagnostic(), REASON_LIMIT);
            return Err(if would_overwrite(&merge) {
                UpdateError::DirtyWorkingCopy { changes: reason }
            } else {
                UpdateError::MergeConflict { reason }
            });
        }

        let after = self.head(path, deadline)?;
        if before == after {
            Ok(UpdateResult::AlreadyCurrent)
        } else {
            tracing::info!(repo = %target.name, path = %path.display(), "updated");
            Ok(UpdateResult::Updated)
        }
    }

    fn clone_into(&self, url: &str, path: &Path, deadline: &Deadline) -> Result<UpdateResult, UpdateError> {
        if self.options.dry_run {
            tracing::info!("[dry-run] would clone {url} into {}", path.display());
            return Ok(UpdateResult::Updated);
        }
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir().map_err(|e| UpdateError::Internal {
                reason: e.to_string(),
            })?,
        };
        std::fs::create_dir_all(&parent).map_err(|e| UpdateError::CommandFailed {
            command: format!("mkdir -p {}", parent.display()),
            reason: e.to_string(),
        })?;

        let path_arg = path.to_string_lossy();
        let out = self.git(&parent, &["clone", "--quiet", url, path_arg.as_ref()], deadline)?;
        if !out.success() {
            return Err(UpdateError::CommandFailed {
                command: format!("git clone {url}"),
                reason: truncate(out.diagnostic(), REASON_LIMIT),
            });
        }
        tracing::info!("cloned {url} into {}", path.display());
        Ok(UpdateResult::Updated)
    }

    /// The path must be the root of a working copy, not a directory inside one.
    fn ensure_toplevel(&self, path: &Path, deadline: &Deadline) -> Result<(), UpdateError> {
        let not_a_repo = || UpdateError::NotARepository {
            path: path.to_path_buf(),
        };
        if !path.is_dir() {
            return Err(not_a_repo());
        }
        let out = self.git(path, &["rev-parse", "--show-toplevel"], deadline)?;
        if !out.success() || !same_dir(Path::new(out.stdout.trim()), path) {
            return Err(not_a_repo());
        }
        Ok(())
    }

    fn ensure_clean(&self, path: &Path, deadline: &Deadline) -> Result<(), UpdateError> {
        let mut args = vec!["status", "--porcelain"];
        if self.options.ignore_untracked_files {
            args.push("--untracked-files=no");
        }
        let out = self.git(path, &args, deadline)?;
        if !out.success() {
            return Err(command_failed(&args, &out));
        }
        let changes = out.stdout.trim();
        if !changes.is_empty() {
            return Err(UpdateError::DirtyWorkingCopy {
                changes: truncate(changes, REASON_LIMIT),
            });
        }
        Ok(())
    }

    /// The ref to fast-forward to.
    fn upstream(&self, target: &RepoTarget, deadline: &Deadline) -> Result<String, UpdateError> {
        match (&target.remote, &target.branch) {
            (Some(remote), Some(branch)) => Ok(format!("{remote}/{branch}")),
            (Some(remote), None) => {
                let args = ["rev-parse", "--abbrev-ref", "HEAD"];
                let out = self.git(&target.path, &args, deadline)?;
                let branch = out.stdout.trim();
                if !out.success() || branch.is_empty() || branch == "HEAD" {
                    return Err(UpdateError::CommandFailed {
                        command: "git rev-parse --abbrev-ref HEAD".to_string(),
                        reason: "no branch checked out (detached HEAD)".to_string(),
                    });
                }
                Ok(format!("{remote}/{branch}"))
            }
            (None, _) => Ok(UPSTREAM.to_string()),
        }
    }

    fn fetch(&self, target: &RepoTarget, dry_run: bool, deadline: &Deadline) -> Result<CommandOutput, UpdateError> {
        let mut args = vec!["fetch"];
        if dry_run {
            args.push("--dry-run");
        }
        if let Some(remote) = &target.remote {
            args.push(remote);
            if let Some(branch) = &target.branch {
                args.push(branch);
            }
        }
        let out = self.git(&target.path, &args, deadline)?;
        if !out.success() {
            return Err(UpdateError::NetworkFailure {
                reason: truncate(out.diagnostic(), REASON_LIMIT),
            });
        }
        Ok(out)
    }

    fn resolve(&self, path: &Path, upstream: &str, deadline: &Deadline) -> Result<String, UpdateError> {
        let out = self.git(path, &["rev-parse", "--verify", "--quiet", upstream], deadline)?;
        let sha = out.stdout.trim();
        if !out.success() || sha.is_empty() {
            return Err(UpdateError::CommandFailed {
                command: format!("git rev-parse {upstream}"),
                reason: "no upstream branch to integrate".to_string(),
            });
        }
        Ok(sha.to_string())
    }

    /// The remote-tracking ref `upstream` names, as `git fetch` prints it.
    fn tracking_ref(&self, path: &Path, upstream: &str, deadline: &Deadline) -> Result<String, UpdateError> {
        if upstream != UPSTREAM {
            return Ok(upstream.to_string());
        }
        let out = self.git(path, &["rev-parse", "--abbrev-ref", UPSTREAM], deadline)?;
        let name = out.stdout.trim();
        if !out.success() || name.is_empty() {
            return Err(UpdateError::CommandFailed {
                command: format!("git rev-parse --abbrev-ref {UPSTREAM}"),
                reason: "no upstream branch to integrate".to_string(),
            });
        }
        Ok(name.to_string())
    }

    /// `(ahead, behind)` of `HEAD` relative to `upstream`.
    fn divergence(&self, path: &Path, upstream: &str, deadline: &Deadline) -> Result<(u64, u64), UpdateError> {
        let range = format!("HEAD...{upstream}");
        let args = ["rev-list", "--left-right", "--count", range.as_str()];
        let out = self.git(path, &args, deadline)?;
        if !out.success() {
            return Err(command_failed(&args, &out));
        }
        parse_left_right(&out.stdout).ok_or_else(|| UpdateError::Internal {
            reason: format!("unexpected rev-list output '{}'", out.stdout.trim()),
        })
    }

    /// Dry-run: read-only fetch, then count commits on each side.
    fn preview(&self, target: &RepoTarget, upstream: &str, deadline: &Deadline) -> Result<UpdateResult, UpdateError> {
        let path = target.path.as_path();
        let tracking = self.tracking_ref(path, upstream, deadline)?;
        let fetch = self.fetch(target, true, deadline)?;
        let incoming = fetch_moves(&fetch, &tracking);
        self.resolve(path, upstream, deadline)?;

        let (ahead, behind) = self.divergence(path, upstream, deadline)?;
        if behind == 0 && !incoming {
            return Ok(UpdateResult::AlreadyCurrent);
        }
        if ahead > 0 && behind > 0 {
            return Err(diverged(ahead, behind));
        }
        self.ensure_clean(path, deadline)?;
        tracing::info!(repo = %target.name, behind, incoming, "[dry-run] would update");
        Ok(UpdateResult::Updated)
    }

    fn head(&self, path: &Path, deadline: &Deadline) -> Result<Option<String>, UpdateError> {
        let out = self.git(path, &["rev-parse", "--verify", "--quiet", "HEAD"], deadline)?;
        let sha = out.stdout.trim();
        Ok((out.success() && !sha.is_empty()).then(|| sha.to_string()))
    }

    fn git(&self, cwd: &Path, args: &[&str], deadline: &Deadline) -> Result<CommandOutput, UpdateError> {
        let invocation = Invocation::new("git", cwd)
            .args(args.iter().copied())
            .env("GIT_TERMINAL_PROMPT", "0")
            .timeout(deadline.remaining()?);
        self.runner.execute(&invocation).map_err(|err| match err {
            RunnerError::TimedOut { .. } => UpdateError::Timeout {
                after: deadline.budget,
            },
            other => UpdateError::CommandFailed {
                command: invocation.command_line(),
                reason: other.to_string(),
            },
        })
    }
}

fn command_failed(args: &[&str], out: &CommandOutput) -> UpdateError {
    UpdateError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        reason: truncate(out.diagnostic(), REASON_LIMIT),
    }
}

fn diverged(ahead: u64, behind: u64) -> UpdateError {
    UpdateError::MergeConflict {
        reason: format!("local branch diverged ({ahead} local, {behind} remote commits)"),
    }
}

/// `git merge` refused because local files are in the way.
fn would_overwrite(out: &CommandOutput) -> bool {
    out.stderr.contains("would be overwritten") || out.stdout.contains("would be overwritten")
}

/// Whether `git fetch` reported a ref update landing on `tracking`.
/// Ref lines look like `   1a2b..3c4d  main  -> origin/main`.
fn fetch_moves(out: &CommandOutput, tracking: &str) -> bool {
    out.stderr
        .lines()
        .chain(out.stdout.lines())
        .filter_map(|line| line.split_once("->"))
        .any(|(_, dest)| dest.split_whitespace().next() == Some(tracking))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// `ahead<TAB>behind` from `git rev-list --left-right --count`.
fn parse_left_right(text: &str) -> Option<(u64, u64)> {
    let mut parts = text.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

/// Cut `text` to at most `limit` bytes on a char boundary, marking the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
