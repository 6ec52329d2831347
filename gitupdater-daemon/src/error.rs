use thiserror::Error;

/// Errors that end a run. Everything per-target is reported, not raised.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] gitupdater_core::ConfigError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Why a desktop notification could not be shown. Logged, never fatal.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification program is not installed or could not run.
    #[error("notification mechanism `{program}` unavailable: {reason}")]
    MechanismUnavailable { program: String, reason: String },

    /// The program ran but exited non-zero (no session bus, no display, …).
    #[error("`{program}` rejected the notification: {reason}")]
    Rejected { program: String, reason: String },
}
