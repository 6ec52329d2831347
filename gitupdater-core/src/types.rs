//! Domain types for gitupdater configuration.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Values are built once by the loader and never mutated during a run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured target (section name or path text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetName(pub String);

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TargetName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A working copy to keep up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub name: TargetName,
    /// Location of the working copy, `~` already expanded.
    pub path: PathBuf,
    /// Remote to fetch from. `None` means the tracked upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Branch to fast-forward to. Only meaningful together with `remote`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Clone source used when the working copy is missing and `--create` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Config file this target was first declared in.
    pub origin: PathBuf,
}

impl RepoTarget {
    /// A target with no overrides, as produced by a bare path entry.
    pub fn new(name: impl Into<TargetName>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            remote: None,
            branch: None,
            url: None,
            origin: PathBuf::new(),
        }
    }

    pub fn with_origin(mut self, origin: &Path) -> Self {
        self.origin = origin.to_path_buf();
        self
    }

    /// Folds a later declaration of the same path into this one.
    ///
    /// Fields set by `later` win; position, name and origin stay with the
    /// first declaration.
    pub fn absorb(&mut self, later: RepoTarget) {
        if later.remote.is_some() {
            self.remote = later.remote;
        }
        if later.branch.is_some() {
            self.branch = later.branch;
        }
        if later.url.is_some() {
            self.url = later.url;
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

pub const DEFAULT_JOBS: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Run-wide options after all sources are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalOptions {
    /// Skip the notification when every target was already current.
    pub quiet: bool,
    /// Emit desktop notifications at all.
    pub notify: bool,
    /// Upper bound on concurrently updated targets.
    pub jobs: usize,
    /// Wall-clock budget for a single target.
    pub timeout_secs: u64,
    /// Untracked files do not count as local changes.
    pub ignore_untracked_files: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            notify: true,
            jobs: DEFAULT_JOBS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            ignore_untracked_files: false,
        }
    }
}

impl GlobalOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scalar option values set by one source. `None` leaves the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    pub quiet: Option<bool>,
    pub notify: Option<bool>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub ignore_untracked_files: Option<bool>,
}

impl OptionOverrides {
    /// Parses and records a single `key = value` option.
    ///
    /// Returns a human-readable reason when the key is unknown or the value
    /// does not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "quiet" => self.quiet = Some(parse_bool(key, value)?),
            "notify" => self.notify = Some(parse_bool(key, value)?),
            "ignore_untracked_files" => {
                self.ignore_untracked_files = Some(parse_bool(key, value)?)
            }
            "jobs" => {
                let jobs: usize = value
                    .parse()
                    .map_err(|_| format!("`jobs` expects a positive integer, got '{value}'"))?;
                if jobs == 0 {
                    return Err("`jobs` must be at least 1".to_string());
                }
                self.jobs = Some(jobs);
            }
            "timeout_secs" => {
                let secs: u64 = value.parse().map_err(|_| {
                    format!("`timeout_secs` expects a positive integer, got '{value}'")
                })?;
                if secs == 0 {
                    return Err("`timeout_secs` must be at least 1".to_string());
                }
                self.timeout_secs = Some(secs);
            }
            other => return Err(format!("unknown option `{other}`")),
        }
        Ok(())
    }

    /// Layers `later` on top of `self`.
    pub fn merge(&mut self, later: OptionOverrides) {
        self.quiet = later.quiet.or(self.quiet);
        self.notify = later.notify.or(self.notify);
        self.jobs = later.jobs.or(self.jobs);
        self.timeout_secs = later.timeout_secs.or(self.timeout_secs);
        self.ignore_untracked_files = later
            .ignore_untracked_files
            .or(self.ignore_untracked_files);
    }

    pub fn apply(&self, options: &mut GlobalOptions) {
        if let Some(v) = self.quiet {
            options.quiet = v;
        }
        if let Some(v) = self.notify {
            options.notify = v;
        }
        if let Some(v) = self.jobs {
            options.jobs = v;
        }
        if let Some(v) = self.timeout_secs {
            options.timeout_secs = v;
        }
        if let Some(v) = self.ignore_untracked_files {
            options.ignore_untracked_files = v;
        }
    }
}

/// Boolean spellings accepted in config files.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(format!("`{key}` expects a boolean, got '{value}'")),
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// The merged configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Targets in declaration order, one per distinct path.
    pub targets: Vec<RepoTarget>,
    pub options: GlobalOptions,
}

impl Config {
    pub fn new(targets: Vec<RepoTarget>, options: GlobalOptions) -> Self {
        Self { targets, options }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
