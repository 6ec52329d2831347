//! Run report: a table for people, a JSON document for scripts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use gitupdater_core::GlobalOptions;
use gitupdater_daemon::{NotifyOutcome, RunReport, TargetReport};
use gitupdater_sync::{truncate, UpdateResult};

/// Longest failure detail shown in a table cell.
const DETAIL_LIMIT: usize = 80;

#[derive(Serialize)]
struct RunReportJson<'a> {
    started_at: DateTime<Utc>,
    dry_run: bool,
    duration_ms: u128,
    summary: SummaryJson,
    options: &'a GlobalOptions,
    sources: &'a [PathBuf],
    warnings: &'a [String],
    notification: &'a NotifyOutcome,
    targets: Vec<TargetJson>,
}

#[derive(Serialize)]
struct SummaryJson {
    targets: usize,
    updated: usize,
    already_current: usize,
    failed: usize,
}

#[derive(Serialize)]
struct TargetJson {
    name: String,
    path: String,
    outcome: &'static str,
    error_kind: Option<&'static str>,
    reason: Option<String>,
    duration_ms: u128,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "detail")]
    detail: String,
}

pub fn print_json(report: &RunReport) -> Result<()> {
    let counts = report.summary.counts();
    let payload = RunReportJson {
        started_at: report.summary.started_at,
        dry_run: report.summary.dry_run,
        duration_ms: report.summary.duration_ms,
        summary: SummaryJson {
            targets: report.summary.reports.len(),
            updated: counts.updated,
            already_current: counts.already_current,
            failed: counts.failed,
        },
        options: &report.options,
        sources: &report.sources,
        warnings: &report.warnings,
        notification: &report.notification,
        targets: report.summary.reports.iter().map(target_json).collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize run report")?
    );
    Ok(())
}

fn target_json(report: &TargetReport) -> TargetJson {
    let (error_kind, reason) = match &report.result {
        UpdateResult::Failed { error } => (Some(error.kind()), Some(error.to_string())),
        _ => (None, None),
    };
    TargetJson {
        name: report.target.name.to_string(),
        path: report.target.path.display().to_string(),
        outcome: outcome_key(&report.result),
        error_kind,
        reason,
        duration_ms: report.duration_ms,
    }
}

pub fn print_table(report: &RunReport) {
    let summary = &report.summary;
    let counts = summary.counts();
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}gitupdater v{} | {} targets | {} updated | {} current | {} failed | {:.1}s",
        env!("CARGO_PKG_VERSION"),
        summary.reports.len(),
        counts.updated,
        counts.already_current,
        counts.failed,
        summary.duration_ms as f64 / 1000.0,
    );

    if summary.reports.is_empty() {
        println!("No repositories configured.");
        return;
    }

    let rows: Vec<TargetRow> = summary
        .reports
        .iter()
        .map(|r| TargetRow {
            target: target_cell(r),
            outcome: format!(
                "{} {}",
                outcome_indicator(&r.result),
                outcome_label(&r.result, summary.dry_run)
            ),
            detail: outcome_detail(&r.result, summary.dry_run),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !report.warnings.is_empty() {
        println!(
            "{} config entr{} skipped; run with -v for details.",
            report.warnings.len(),
            if report.warnings.len() == 1 { "y" } else { "ies" }
        );
    }
}

fn target_cell(report: &TargetReport) -> String {
    let name = report.target.name.to_string();
    let path = report.target.path.display().to_string();
    if name == path {
        path
    } else {
        format!("{name}\n{}", path.bright_black())
    }
}

fn outcome_key(result: &UpdateResult) -> &'static str {
    match result {
        UpdateResult::Updated => "updated",
        UpdateResult::AlreadyCurrent => "already_current",
        UpdateResult::Failed { .. } => "failed",
    }
}

fn outcome_label(result: &UpdateResult, dry_run: bool) -> &'static str {
    match result {
        UpdateResult::Updated if dry_run => "WOULD UPDATE",
        UpdateResult::Updated => "UPDATED",
        UpdateResult::AlreadyCurrent => "CURRENT",
        UpdateResult::Failed { .. } => "FAILED",
    }
}

fn outcome_indicator(result: &UpdateResult) -> String {
    match result {
        UpdateResult::Updated => "■".green().bold().to_string(),
        UpdateResult::AlreadyCurrent => "■".bright_black().bold().to_string(),
        UpdateResult::Failed { .. } => "■".red().bold().to_string(),
    }
}

fn outcome_detail(result: &UpdateResult, dry_run: bool) -> String {
    match result {
        UpdateResult::Updated if dry_run => "upstream has new commits".to_string(),
        UpdateResult::Updated => "fast-forwarded".to_string(),
        UpdateResult::AlreadyCurrent => "up to date".to_string(),
        UpdateResult::Failed { error } => {
            let reason = error.to_string();
            truncate(reason.lines().next().unwrap_or_default(), DETAIL_LIMIT)
        }
    }
}
