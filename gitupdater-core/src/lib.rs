//! gitupdater core library: config types, parsing, loading, errors.
//!
//! - [`types`]: targets, options, merged [`Config`]
//! - [`error`]: [`ConfigError`]
//! - [`parser`]: one source's text into targets + options
//! - [`loader`]: primary file + drop-in fragments into a [`LoadedConfig`]

pub mod error;
pub mod loader;
pub mod parser;
pub mod paths;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_at, ConfigSources, LoadedConfig};
pub use types::{Config, GlobalOptions, OptionOverrides, RepoTarget, TargetName};
