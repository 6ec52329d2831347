//! Config loading: primary file + drop-in fragments.
//!
//! # Storage layout
//!
//! ```text
//! ~/.config/
//!   gitupdater          (primary file, optional)
//!   gitupdater.d/       (fragments, optional, read in file-name order)
//!     10-work
//!     20-personal
//! ```
//!
//! # API pattern
//!
//! Everything takes the home directory explicitly (`load_at(home, …)`), so
//! tests can point it at a `TempDir`. Callers get the real one from
//! [`paths::home_dir`].

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::parser::{parse_source, ParsedSource};
use crate::paths;
use crate::types::{Config, GlobalOptions, OptionOverrides, RepoTarget};

// ---------------------------------------------------------------------------
// 1. Sources
// ---------------------------------------------------------------------------

/// Where to look for configuration. `None` disables a source entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSources {
    pub primary: Option<PathBuf>,
    pub fragments: Option<PathBuf>,
}

impl ConfigSources {
    /// `~/.config/gitupdater` and `~/.config/gitupdater.d/`.
    pub fn default_at(home: &Path) -> Self {
        Self {
            primary: Some(paths::primary_config_path(home)),
            fragments: Some(paths::fragments_dir(home)),
        }
    }

    /// Applies command-line overrides. An explicit primary file moves the
    /// default fragments directory next to it.
    pub fn resolve_at(
        home: &Path,
        config: Option<PathBuf>,
        fragments: Option<PathBuf>,
    ) -> Self {
        let primary = config.unwrap_or_else(|| paths::primary_config_path(home));
        let fragments = fragments.unwrap_or_else(|| paths::fragments_dir_for(&primary));
        Self {
            primary: Some(primary),
            fragments: Some(fragments),
        }
    }
}

/// A successfully merged config plus what was recovered along the way.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// Malformed entries and unreadable sources that were skipped.
    pub warnings: Vec<ConfigError>,
    /// Sources that were read, in merge order.
    pub sources: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and merge every source.
///
/// Returns `ConfigError::DirectoryEnumerationFailed` if the fragments directory
/// exists but cannot be listed, and `ConfigError::Unreadable` only when every
/// existing source failed to read. Missing sources are not errors.
pub fn load_at(home: &Path, sources: &ConfigSources) -> Result<LoadedConfig, ConfigError> {
    let mut files = Vec::new();
    if let Some(primary) = &sources.primary {
        files.push(primary.clone());
    }
    if let Some(dir) = &sources.fragments {
        files.extend(list_fragments(dir)?);
    }

    let mut builder = ConfigBuilder::default();
    let mut warnings = Vec::new();
    let mut unreadable = Vec::new();
    let mut read = Vec::new();

    for file in files {
        match read_source(&file) {
            Ok(Some(text)) => {
                let parsed = parse_source(&text, &file, home);
                warnings.extend(builder.absorb(parsed));
                read.push(file);
            }
            Ok(None) => {}
            Err(err) => unreadable.push(err),
        }
    }

    if read.is_empty() && !unreadable.is_empty() {
        return Err(unreadable.remove(0));
    }
    warnings.extend(unreadable);

    Ok(LoadedConfig {
        config: builder.build(),
        warnings,
        sources: read,
    })
}

/// Fragment files in `dir`, sorted by file name. Hidden files and
/// subdirectories are ignored; a missing directory yields no fragments.
pub fn list_fragments(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let enumeration_failed = |source| ConfigError::DirectoryEnumerationFailed {
        path: dir.to_path_buf(),
        source,
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(enumeration_failed(e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(enumeration_failed)?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        files.push(path);
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// `Ok(None)` when the source does not exist.
fn read_source(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ---------------------------------------------------------------------------
// 3. Merge
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConfigBuilder {
    options: OptionOverrides,
    targets: Vec<RepoTarget>,
    by_path: HashMap<PathBuf, usize>,
}

impl ConfigBuilder {
    /// Folds one parsed source in and hands back its problems.
    fn absorb(&mut self, parsed: ParsedSource) -> Vec<ConfigError> {
        self.options.merge(parsed.options);
        for target in parsed.targets {
            match self.by_path.get(&target.path) {
                Some(&idx) => self.targets[idx].absorb(target),
                None => {
                    self.by_path.insert(target.path.clone(), self.targets.len());
                    self.targets.push(target);
                }
            }
        }
        parsed.problems
    }

    fn build(self) -> Config {
        let mut options = GlobalOptions::default();
        self.options.apply(&mut options);
        Config::new(self.targets, options)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
