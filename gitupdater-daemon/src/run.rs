//! One run: load config, update every target on a bounded worker pool, notify.
//!
//! ```text
//! Idle → Loading → Updating → Reporting → Done
//! ```
//!
//! A fatal config error ends the run in `Loading` with [`DaemonError::Config`].
//! Per-target failures are collected into the [`RunSummary`] and never end
//! the run early.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use gitupdater_core::{
    loader, Config, ConfigSources, GlobalOptions, OptionOverrides, RepoTarget,
};
use gitupdater_sync::{Runner, UpdateError, UpdateOptions, UpdateResult, Updater};

use crate::error::DaemonError;
use crate::notifier::{compose, Notifier};

// ---------------------------------------------------------------------------
// Request / summary types
// ---------------------------------------------------------------------------

/// Everything needed to start a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub home: PathBuf,
    pub sources: ConfigSources,
    /// Command-line values; they win over every config source.
    pub overrides: OptionOverrides,
    pub dry_run: bool,
    pub create: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Loading,
    Updating,
    Reporting,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Loading => "loading",
            RunPhase::Updating => "updating",
            RunPhase::Reporting => "reporting",
            RunPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub target: RepoTarget,
    pub result: UpdateResult,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub updated: usize,
    pub already_current: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    /// One report per configured target, in config order.
    pub reports: Vec<TargetReport>,
    pub duration_ms: u128,
}

impl RunSummary {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for report in &self.reports {
            match report.result {
                UpdateResult::Updated => counts.updated += 1,
                UpdateResult::AlreadyCurrent => counts.already_current += 1,
                UpdateResult::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RepoTarget, &UpdateError)> {
        self.reports.iter().filter_map(|r| match &r.result {
            UpdateResult::Failed { error } => Some((&r.target, error)),
            _ => None,
        })
    }

    /// True when nothing changed and nothing failed (vacuously true for no targets).
    pub fn all_current(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.result == UpdateResult::AlreadyCurrent)
    }
}

/// What happened to the run's notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent,
    /// Quiet mode and nothing changed.
    Suppressed,
    /// Notifications turned off in config or on the command line.
    Disabled,
    Failed { reason: String },
}

/// A completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub options: GlobalOptions,
    /// Recovered config problems, already logged.
    pub warnings: Vec<String>,
    pub sources: Vec<PathBuf>,
    pub notification: NotifyOutcome,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Start a tokio runtime and block the current thread until the run ends.
pub fn start_blocking<R, N>(
    request: &RunRequest,
    runner: Arc<R>,
    notifier: &N,
) -> Result<RunReport, DaemonError>
where
    R: Runner + 'static,
    N: Notifier + ?Sized,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    runtime.block_on(run(request, runner, notifier))
}

/// Drive one full run.
pub async fn run<R, N>(
    request: &RunRequest,
    runner: Arc<R>,
    notifier: &N,
) -> Result<RunReport, DaemonError>
where
    R: Runner + 'static,
    N: Notifier + ?Sized,
{
    let mut phase = RunPhase::Idle;

    advance(&mut phase, RunPhase::Loading);
    let loaded = loader::load_at(&request.home, &request.sources)?;
    let warnings: Vec<String> = loaded.warnings.iter().map(ToString::to_string).collect();
    for warning in &warnings {
        tracing::warn!("skipped config entry: {warning}");
    }
    let mut options = loaded.config.options;
    request.overrides.apply(&mut options);
    let config = Arc::new(Config::new(loaded.config.targets, options.clone()));
    if config.is_empty() {
        tracing::info!("no targets configured; nothing to do");
    }

    advance(&mut phase, RunPhase::Updating);
    let started_at = Utc::now();
    let clock = Instant::now();
    let update_options = UpdateOptions {
        dry_run: request.dry_run,
        create: request.create,
        ignore_untracked_files: options.ignore_untracked_files,
        timeout: options.timeout(),
    };
    let reports = update_all(Arc::clone(&config), runner, update_options).await;
    let summary = RunSummary {
        started_at,
        dry_run: request.dry_run,
        reports,
        duration_ms: clock.elapsed().as_millis(),
    };

    advance(&mut phase, RunPhase::Reporting);
    let counts = summary.counts();
    tracing::info!(
        updated = counts.updated,
        already_current = counts.already_current,
        failed = counts.failed,
        duration_ms = summary.duration_ms,
        "run completed",
    );
    let notification = deliver(&summary, &options, notifier);

    advance(&mut phase, RunPhase::Done);
    Ok(RunReport {
        summary,
        options,
        warnings,
        sources: loaded.sources,
        notification,
    })
}

/// Update every target at most `jobs` at a time. Returns exactly one report
/// per target, in config order.
pub async fn update_all<R>(
    config: Arc<Config>,
    runner: Arc<R>,
    options: UpdateOptions,
) -> Vec<TargetReport>
where
    R: Runner + 'static,
{
    let updater = Arc::new(Updater::new(runner, options));
    let permits = Arc::new(Semaphore::new(config.options.jobs.max(1)));
    let mut workers = JoinSet::new();

    for idx in 0..config.targets.len() {
        let config = Arc::clone(&config);
        let updater = Arc::clone(&updater);
        let permits = Arc::clone(&permits);
        workers.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let target = config.targets[idx].clone();
            let started = Instant::now();
            let blocking_target = target.clone();
            let result =
                match tokio::task::spawn_blocking(move || updater.update(&blocking_target)).await {
                    Ok(result) => result,
                    Err(err) => UpdateResult::failed(UpdateError::Internal {
                        reason: format!("update task failed: {err}"),
                    }),
                };
            let report = TargetReport {
                target,
                result,
                duration_ms: started.elapsed().as_millis(),
            };
            (idx, report)
        });
    }

    // Single collector: the only writer of the results.
    let mut slots: Vec<Option<TargetReport>> = (0..config.targets.len()).map(|_| None).collect();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((idx, report)) => slots[idx] = Some(report),
            Err(err) => tracing::error!(error = %err, "update worker aborted"),
        }
    }

    slots
        .into_iter()
        .zip(config.targets.iter())
        .map(|(slot, target)| {
            slot.unwrap_or_else(|| TargetReport {
                target: target.clone(),
                result: UpdateResult::failed(UpdateError::Internal {
                    reason: "update worker aborted".to_string(),
                }),
                duration_ms: 0,
            })
        })
        .collect()
}

/// Compose and send the notification, honouring `notify` and `quiet`.
pub fn deliver<N: Notifier + ?Sized>(
    summary: &RunSummary,
    options: &GlobalOptions,
    notifier: &N,
) -> NotifyOutcome {
    if !options.notify {
        return NotifyOutcome::Disabled;
    }
    let Some(notification) = compose(summary, options.quiet) else {
        tracing::debug!("quiet mode: nothing changed, no notification");
        return NotifyOutcome::Suppressed;
    };
    match notifier.notify(&notification) {
        Ok(()) => NotifyOutcome::Sent,
        Err(err) => {
            tracing::warn!(error = %err, "desktop notification failed");
            NotifyOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }
}

fn advance(phase: &mut RunPhase, next: RunPhase) {
    tracing::debug!(from = %phase, to = %next, "run phase");
    *phase = next;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
