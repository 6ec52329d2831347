//! gitupdater run coordinator: bounded worker pool, summary, notification.

mod error;
pub mod logging;
pub mod notifier;
pub mod run;

pub use error::{DaemonError, NotifyError};
pub use logging::init_tracing;
pub use notifier::{compose, DesktopNotifier, Notification, Notifier};
pub use run::{
    deliver, run, start_blocking, update_all, NotifyOutcome, OutcomeCounts, RunPhase, RunReport,
    RunRequest, RunSummary, TargetReport,
};
