//! # gitupdater-sync
//!
//! Brings one working copy up to date with its remote.
//!
//! Call [`Updater::update`] with a [`gitupdater_core::RepoTarget`]; all git
//! invocations go through the [`Runner`] capability ([`ProcessRunner`] in
//! production, `fake::ScriptedRunner` in tests, behind the `test-util` feature).

pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod runner;
pub mod updater;

pub use error::{RunnerError, UpdateError};
pub use runner::{CommandOutput, Invocation, ProcessRunner, Runner};
pub use updater::{truncate, UpdateOptions, UpdateResult, Updater, REASON_LIMIT};
