//! Desktop notification for a finished run.
//!
//! [`compose`] turns a [`RunSummary`] into at most one [`Notification`];
//! [`DesktopNotifier`] hands it to `notify-send` (or `osascript` on macOS)
//! through the same [`Runner`] capability the updater uses.

use std::time::Duration;

use gitupdater_sync::{truncate, Invocation, Runner};

use crate::error::NotifyError;
use crate::run::RunSummary;

const APP_NAME: &str = "gitupdater";
/// Per-failure reason length in the notification body.
const BODY_REASON_LIMIT: usize = 200;
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Something that can show a notification to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// `None` when `quiet` is set and every target was already current.
pub fn compose(summary: &RunSummary, quiet: bool) -> Option<Notification> {
    if quiet && summary.all_current() {
        return None;
    }

    let counts = summary.counts();
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    let title = format!(
        "{prefix}{APP_NAME}: {} updated, {} current, {} failed",
        counts.updated, counts.already_current, counts.failed
    );

    let mut lines = Vec::new();
    if summary.reports.is_empty() {
        lines.push("No repositories configured.".to_string());
    }

    let updated: Vec<String> = summary
        .reports
        .iter()
        .filter(|r| r.result == gitupdater_sync::UpdateResult::Updated)
        .map(|r| r.target.name.to_string())
        .collect();
    if !updated.is_empty() {
        let verb = if summary.dry_run { "Would update" } else { "Updated" };
        lines.push(format!("{verb}: {}", updated.join(", ")));
    }

    let current: Vec<String> = summary
        .reports
        .iter()
        .filter(|r| r.result == gitupdater_sync::UpdateResult::AlreadyCurrent)
        .map(|r| r.target.name.to_string())
        .collect();
    if !current.is_empty() {
        lines.push(format!("Already current: {}", current.join(", ")));
    }

    for (target, error) in summary.failures() {
        let reason = error.to_string();
        let first_line = reason.lines().next().unwrap_or_default();
        lines.push(format!(
            "Failed {}: {}",
            target.path.display(),
            truncate(first_line, BODY_REASON_LIMIT)
        ));
    }

    Some(Notification {
        title,
        body: lines.join("\n"),
    })
}

// ---------------------------------------------------------------------------
// Desktop notifier
// ---------------------------------------------------------------------------

pub struct DesktopNotifier<R> {
    runner: R,
}

impl<R: Runner> DesktopNotifier<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: Runner> Notifier for DesktopNotifier<R> {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let invocation = notification_command(notification).timeout(NOTIFY_TIMEOUT);
        let program = invocation.program.clone();
        let output = self
            .runner
            .execute(&invocation)
            .map_err(|err| NotifyError::MechanismUnavailable {
                program: program.clone(),
                reason: err.to_string(),
            })?;
        if !output.success() {
            return Err(NotifyError::Rejected {
                program,
                reason: truncate(output.diagnostic(), BODY_REASON_LIMIT),
            });
        }
        tracing::debug!(title = %notification.title, "notification sent");
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn notification_command(notification: &Notification) -> Invocation {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        applescript_escape(&notification.body),
        applescript_escape(&notification.title),
    );
    Invocation::new("osascript", std::env::temp_dir()).args(["-e", script.as_str()])
}

#[cfg(not(target_os = "macos"))]
fn notification_command(notification: &Notification) -> Invocation {
    Invocation::new("notify-send", std::env::temp_dir()).args([
        format!("--app-name={APP_NAME}"),
        notification.title.clone(),
        notification.body.clone(),
    ])
}

#[cfg(target_os = "macos")]
fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;
    use gitupdater_core::RepoTarget;
    use gitupdater_sync::{fake::ScriptedRunner, CommandOutput, UpdateError, UpdateResult};

    use super::*;
    use crate::run::TargetReport;

    fn report(name: &str, result: UpdateResult) -> TargetReport {
        TargetReport {
            target: RepoTarget::new(name, format!("/{name}")),
            result,
            duration_ms: 1,
        }
    }

    fn summary(reports: Vec<TargetReport>) -> RunSummary {
        RunSummary {
            started_at: Utc::now(),
            dry_run: false,
            reports,
            duration_ms: 5,
        }
    }

    fn sample() -> Notification {
        Notification {
            title: "t".to_string(),
            body: "b".to_string(),
        }
    }

    #[test]
    fn quiet_suppresses_only_all_current_runs() {
        let current = summary(vec![
            report("a", UpdateResult::AlreadyCurrent),
            report("b", UpdateResult::AlreadyCurrent),
        ]);
        assert!(compose(&current, true).is_none());
        assert!(compose(&current, false).is_some());

        let changed = summary(vec![
            report("a", UpdateResult::AlreadyCurrent),
            report("b", UpdateResult::Updated),
        ]);
        assert!(compose(&changed, true).is_some());
    }

    #[test]
    fn quiet_still_reports_failures() {
        let failed = summary(vec![report(
            "a",
            UpdateResult::failed(UpdateError::NotARepository { path: "/a".into() }),
        )]);
        assert!(compose(&failed, true).is_some());
    }

    #[test]
    fn body_lists_counts_and_failure_reasons() {
        let n = compose(
            &summary(vec![
                report("a", UpdateResult::AlreadyCurrent),
                report("b", UpdateResult::Updated),
                report(
                    "c",
                    UpdateResult::failed(UpdateError::NotARepository {
                        path: PathBuf::from("/c"),
                    }),
                ),
            ]),
            false,
        )
        .expect("notification");
        assert_eq!(n.title, "gitupdater: 1 updated, 1 current, 1 failed");
        assert!(n.body.contains("Updated: b"), "{}", n.body);
        assert!(n.body.contains("Already current: a"), "{}", n.body);
        assert!(
            n.body.contains("Failed /c: not a git working copy: /c"),
            "{}",
            n.body
        );
    }

    #[test]
    fn long_reasons_are_shortened_to_their_first_line() {
        let reason = format!("{}\nsecond line", "x".repeat(500));
        let n = compose(
            &summary(vec![report(
                "a",
                UpdateResult::failed(UpdateError::NetworkFailure { reason }),
            )]),
            false,
        )
        .expect("notification");
        assert!(!n.body.contains("second line"));
        assert!(n.body.len() < 300, "body too long: {}", n.body.len());
    }

    #[test]
    fn missing_binary_is_mechanism_unavailable() {
        let runner = ScriptedRunner::new().missing("notify-send").missing("osascript");
        let err = DesktopNotifier::new(&runner).notify(&sample()).unwrap_err();
        assert!(matches!(err, NotifyError::MechanismUnavailable { .. }), "got: {err}");
    }

    #[test]
    fn non_zero_exit_is_rejected() {
        let runner = ScriptedRunner::new()
            .on("notify-send", None, &[], vec![CommandOutput::failed(1, "no bus")])
            .on("osascript", None, &[], vec![CommandOutput::failed(1, "no session")]);
        let err = DesktopNotifier::new(&runner).notify(&sample()).unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { .. }), "got: {err}");
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn notify_send_gets_title_and_body() {
        let runner = ScriptedRunner::new();
        DesktopNotifier::new(&runner).notify(&sample()).expect("notify");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "notify-send");
        assert_eq!(calls[0].args, vec!["--app-name=gitupdater", "t", "b"]);
    }
}
