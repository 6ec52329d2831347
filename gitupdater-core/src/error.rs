//! Error types for gitupdater-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config source exists but could not be read (permissions, I/O, encoding).
    #[error("cannot read config source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single entry could not be understood. The rest of the source still loads.
    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The drop-in directory exists but its entries cannot be listed.
    #[error("cannot enumerate fragments directory {path}: {source}")]
    DirectoryEnumerationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.config/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

impl ConfigError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        ConfigError::Malformed {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
