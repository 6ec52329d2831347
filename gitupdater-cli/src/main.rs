//! gitupdater: keep a set of git working copies up to date.
//!
//! # Usage
//!
//! ```text
//! gitupdater [--config FILE] [--fragments DIR] [-q] [-d] [--create]
//!            [-j N] [--timeout SECS] [--no-notify] [--json] [-v]
//! ```
//!
//! Reads `~/.config/gitupdater` plus every file in `~/.config/gitupdater.d/`,
//! fetches and fast-forwards each listed working copy, prints a report and
//! sends one desktop notification.
//!
//! # Exit status
//!
//! | code | meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | run completed, whatever happened to each target      |
//! | 1    | the configuration could not be loaded                |
//! | 2    | invalid command line                                 |
//! | 3    | the run could not start (no home directory, runtime) |

mod report;

use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use gitupdater_core::{paths, ConfigError, ConfigSources, OptionOverrides};
use gitupdater_daemon::{init_tracing, start_blocking, DesktopNotifier, RunRequest};
use gitupdater_sync::ProcessRunner;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gitupdater",
    version,
    about = "Fetch and fast-forward every configured git working copy",
    long_about = None,
)]
struct Cli {
    /// Primary config file [default: ~/.config/gitupdater].
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Drop-in fragments directory [default: <config>.d].
    #[arg(long, value_name = "DIR")]
    fragments: Option<PathBuf>,

    /// Skip the notification when nothing changed.
    #[arg(short, long)]
    quiet: bool,

    /// Fetch and report, but never merge or clone.
    #[arg(short, long)]
    dry_run: bool,

    /// Clone targets whose path is missing and that have a `url`.
    #[arg(long)]
    create: bool,

    /// Number of targets updated in parallel.
    #[arg(short, long, value_name = "N")]
    jobs: Option<NonZeroUsize>,

    /// Per-target time limit in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<NonZeroU64>,

    /// Do not send a desktop notification.
    #[arg(long)]
    no_notify: bool,

    /// Emit machine-readable JSON (report on stdout, logs on stderr).
    #[arg(long)]
    json: bool,

    /// Debug logging (`RUST_LOG` takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run(self) -> Result<()> {
        let home = paths::home_dir().context("could not locate configuration")?;
        let request = self.request(home);

        let notifier = DesktopNotifier::new(ProcessRunner);
        let report = start_blocking(&request, Arc::new(ProcessRunner), &notifier)
            .context("update run aborted")?;

        if self.json {
            report::print_json(&report)?;
        } else {
            report::print_table(&report);
        }
        Ok(())
    }

    fn request(&self, home: PathBuf) -> RunRequest {
        let sources = ConfigSources::resolve_at(&home, self.config.clone(), self.fragments.clone());
        RunRequest {
            home,
            sources,
            overrides: self.overrides(),
            dry_run: self.dry_run,
            create: self.create,
        }
    }

    /// Flags only override when given; absent flags leave config values alone.
    fn overrides(&self) -> OptionOverrides {
        OptionOverrides {
            quiet: self.quiet.then_some(true),
            notify: self.no_notify.then_some(false),
            jobs: self.jobs.map(NonZeroUsize::get),
            timeout_secs: self.timeout.map(NonZeroU64::get),
            ignore_untracked_files: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

const EXIT_CONFIG: u8 = 1;
const EXIT_ABORTED: u8 = 3;

/// Config that exists but cannot be read is exit 1; anything else that stops
/// the run before it starts is exit 3.
fn exit_status(err: &anyhow::Error) -> u8 {
    let config_error = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ConfigError>(),
            Some(e) if !matches!(e, ConfigError::HomeNotFound)
        )
    });
    if config_error {
        EXIT_CONFIG
    } else {
        EXIT_ABORTED
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);
    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use gitupdater_daemon::DaemonError;

    use super::*;

    #[test]
    fn flags_map_to_overrides() {
        let cli = Cli::parse_from(["gitupdater", "-q", "--no-notify", "-j", "2", "--timeout", "30"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.quiet, Some(true));
        assert_eq!(overrides.notify, Some(false));
        assert_eq!(overrides.jobs, Some(2));
        assert_eq!(overrides.timeout_secs, Some(30));
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let overrides = Cli::parse_from(["gitupdater"]).overrides();
        assert_eq!(overrides, OptionOverrides::default());
    }

    #[test]
    fn zero_jobs_is_rejected() {
        assert!(Cli::try_parse_from(["gitupdater", "--jobs", "0"]).is_err());
    }

    #[test]
    fn short_d_is_dry_run() {
        assert!(Cli::parse_from(["gitupdater", "-d"]).dry_run);
        assert!(Cli::parse_from(["gitupdater", "--dry-run"]).dry_run);
        assert!(Cli::try_parse_from(["gitupdater", "-n"]).is_err());
    }

    #[test]
    fn config_errors_exit_one() {
        let err = anyhow::Error::new(DaemonError::Config(ConfigError::Unreadable {
            path: PathBuf::from("/etc/gu.conf"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }))
        .context("update run aborted");
        assert_eq!(exit_status(&err), EXIT_CONFIG);
    }

    #[test]
    fn runtime_failure_has_its_own_exit_code() {
        let err = anyhow::Error::new(DaemonError::Runtime(io::Error::new(
            io::ErrorKind::Other,
            "no threads",
        )))
        .context("update run aborted");
        assert_eq!(exit_status(&err), EXIT_ABORTED);
        assert_ne!(EXIT_ABORTED, EXIT_CONFIG);
    }

    #[test]
    fn missing_home_is_not_a_config_error() {
        let err = anyhow::Error::new(ConfigError::HomeNotFound).context("could not locate configuration");
        assert_eq!(exit_status(&err), EXIT_ABORTED);
    }

    #[test]
    fn explicit_config_moves_fragments_dir() {
        let cli = Cli::parse_from(["gitupdater", "--config", "/etc/gu.conf"]);
        let request = cli.request(PathBuf::from("/home/u"));
        assert_eq!(request.sources.primary, Some(PathBuf::from("/etc/gu.conf")));
        assert_eq!(request.sources.fragments, Some(PathBuf::from("/etc/gu.conf.d")));
    }
}
