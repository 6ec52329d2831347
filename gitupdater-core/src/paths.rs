use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "gitupdater";
pub const FRAGMENTS_SUFFIX: &str = ".d";

/// The current user's home directory.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

pub fn config_root(home: &Path) -> PathBuf {
    home.join(".config")
}

/// `<home>/.config/gitupdater`
pub fn primary_config_path(home: &Path) -> PathBuf {
    config_root(home).join(CONFIG_FILE_NAME)
}

/// `<home>/.config/gitupdater.d/`
pub fn fragments_dir(home: &Path) -> PathBuf {
    fragments_dir_for(&primary_config_path(home))
}

/// The drop-in directory that sits next to `primary`: `<primary>.d`.
pub fn fragments_dir_for(primary: &Path) -> PathBuf {
    let mut name: OsString = primary.as_os_str().to_owned();
    name.push(FRAGMENTS_SUFFIX);
    PathBuf::from(name)
}

/// Expands a leading `~` against `home`. Everything else is returned as written.
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(raw),
    }
}
