//! Execution engine - runs update requests with confirmation and reporting

use anyhow::{Result, bail};
use colored::Colorize;
use guestconf::retry::{LogCallback, NoCallback, RetryCallback};
use guestconf::{ConfigSource, Coordinator, Outcome, RetryConfig, UpdateError, UpdateReport, UpdateRequest};

use indicatif::ProgressBar;

use crate::ui;

use super::differ::display_plan;

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Conflict retry policy
    pub retry: RetryConfig,
    /// Number of guests updated in parallel
    pub jobs: usize,
    pub quiet: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            yes: false,
            retry: RetryConfig::no_retry(),
            jobs: 4,
            quiet: false,
        }
    }
}

/// Summary of a batch
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub warnings: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    pub fn record(&mut self, result: &Result<UpdateReport, UpdateError>) {
        match result {
            Ok(report) => {
                match report.outcome {
                    Outcome::Verified => self.changed += 1,
                    Outcome::NoOp => self.unchanged += 1,
                }
                self.warnings += report.warnings.len();
            }
            Err(e) if e.is_conflict() => self.conflicts += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.conflicts == 0 && self.failed == 0
    }
}

/// Plan, show, confirm and apply one request.
pub fn execute<S: ConfigSource>(
    coordinator: &Coordinator<S>,
    request: &UpdateRequest,
    opts: &ExecuteOptions,
) -> Result<Option<UpdateReport>> {
    let plan = coordinator.plan(request)?;

    if !opts.quiet || opts.dry_run {
        display_plan(&request.guest, &plan.diff);
    }

    if plan.diff.is_empty() {
        let report = UpdateReport {
            guest: request.guest.clone(),
            outcome: Outcome::NoOp,
            changed: Vec::new(),
            deleted: Vec::new(),
            warnings: Vec::new(),
            guarded: plan.digest.is_some() && coordinator.source().supports_digest(),
            digest: plan.digest,
        };
        ui::report(&report);
        return Ok(Some(report));
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(None);
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(None);
    }

    // Pin the digest the user saw, so a change since the plan is a conflict
    // rather than silently folded in.
    let mut pinned = request.clone();
    if pinned.expect_digest.is_none() {
        pinned.expect_digest = plan.digest.clone();
    }

    let report = coordinator
        .apply_with_retry(&pinned, &opts.retry, retry_callback(opts))
        .map_err(describe)?;
    println!();
    ui::report(&report);
    Ok(Some(report))
}

/// Plan, show, confirm and apply many requests, guests in parallel.
pub fn execute_batch<S: ConfigSource>(
    coordinator: &Coordinator<S>,
    requests: &[UpdateRequest],
    bar: &ProgressBar,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    let mut summary = ExecuteSummary::default();
    let mut pending: Vec<UpdateRequest> = Vec::new();
    let mut planned_digests = Vec::new();

    for request in requests {
        match coordinator.plan(request) {
            Ok(plan) => {
                if !opts.quiet || opts.dry_run {
                    display_plan(&request.guest, &plan.diff);
                }
                if plan.diff.is_empty() {
                    summary.unchanged += 1;
                } else {
                    pending.push(request.clone());
                    planned_digests.push(plan.digest);
                }
            }
            Err(e) => {
                ui::error(&describe(e).to_string());
                summary.failed += 1;
            }
        }
    }

    if pending.is_empty() {
        print_summary(&summary);
        return Ok(summary);
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        summary.skipped = pending.len();
        return Ok(summary);
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        summary.skipped = pending.len();
        return Ok(summary);
    }

    // A guest with a single update is pinned to the digest that was shown.
    // Later updates of a guest with several see the earlier ones' writes.
    for (index, digest) in planned_digests.into_iter().enumerate() {
        let guest = &pending[index].guest;
        let unique = pending.iter().filter(|r| &r.guest == guest).count() == 1;
        if unique && pending[index].expect_digest.is_none() {
            pending[index].expect_digest = digest;
        }
    }

    println!();
    println!("  {} Applying {} update(s)...", "→".cyan(), pending.len());

    bar.set_length(pending.len() as u64);
    bar.set_position(0);
    let mut results = coordinator.apply_many(&pending, opts.jobs);
    bar.finish_and_clear();

    if opts.retry.max_attempts > 1 {
        retry_conflicts(coordinator, &pending, &mut results, opts);
    }

    for result in &results {
        summary.record(result);
        match result {
            Ok(report) => ui::report(report),
            Err(e) => ui::error(&explain(e)),
        }
    }

    print_summary(&summary);
    Ok(summary)
}

/// Re-apply conflicting updates one by one on top of the current state.
fn retry_conflicts<S: ConfigSource>(
    coordinator: &Coordinator<S>,
    requests: &[UpdateRequest],
    results: &mut [Result<UpdateReport, UpdateError>],
    opts: &ExecuteOptions,
) {
    let retry = RetryConfig {
        max_attempts: opts.retry.max_attempts - 1,
        ..opts.retry
    };
    for (request, result) in requests.iter().zip(results.iter_mut()) {
        if result.as_ref().is_err_and(UpdateError::is_conflict) {
            let fresh = UpdateRequest {
                expect_digest: None,
                ..request.clone()
            };
            *result = coordinator.apply_with_retry(&fresh, &retry, retry_callback(opts));
        }
    }
}

fn retry_callback(opts: &ExecuteOptions) -> &'static dyn RetryCallback {
    if opts.quiet { &NoCallback } else { &LogCallback }
}

/// Attach the conflicting keys or raw platform output to a coordinator error.
fn describe(error: UpdateError) -> anyhow::Error {
    let message = explain(&error);
    anyhow::Error::new(error).context(message)
}

fn explain(error: &UpdateError) -> String {
    match error {
        UpdateError::Conflict { guest, keys } => format!(
            "{guest}: changed concurrently ({}); re-run to apply on top of the new state",
            keys.join(", ")
        ),
        UpdateError::Write {
            guest, raw_output, ..
        } => format!("{guest}: write rejected: {}", raw_output.trim()),
        other => other.to_string(),
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Write these changes?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}

fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Batch applied", "✓".green().bold());
    } else {
        println!("  {} Batch applied with errors", "⚠".yellow().bold());
    }

    if summary.changed > 0 {
        println!("    • {} guests changed", summary.changed);
    }
    if summary.unchanged > 0 {
        println!("    • {} guests unchanged", summary.unchanged);
    }
    if summary.warnings > 0 {
        println!("    • {} {}", summary.warnings, "warnings".yellow());
    }
    if summary.conflicts > 0 {
        println!("    • {} {}", summary.conflicts, "conflicts".red());
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "guests".red());
    }
}

/// Fail the command when a batch did not fully succeed.
pub fn check(summary: &ExecuteSummary) -> Result<()> {
    if !summary.is_success() {
        bail!(
            "{} conflict(s), {} failure(s)",
            summary.conflicts,
            summary.failed
        );
    }
    Ok(())
}
