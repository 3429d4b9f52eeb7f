//! Batch runs: schedule every item, tally outcomes, and bring the retry set up to date.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;

use crate::engine::ledger::{
    Reconciled, ResultLedger, RetrySetHandle, persist_failures, reconcile_retry_set,
};
use crate::engine::progress::ProgressAggregator;
use crate::engine::report::write_failure_log;
use crate::fetch::ArtifactFetcher;
use crate::input::InputBatch;
use crate::pipeline::Scheduler;
use crate::{BatchOpts, BatchReport, Outcome, RetryUpdate, Tally, WorkItem};

/// Outcome line as printed per item.
pub fn outcome_line(item: &WorkItem, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Skipped { existing } => format!(
            "⊘ {}: Skipped (already exists: {})",
            item.key,
            existing
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default()
        ),
        Outcome::Completed { path } => format!(
            "✓ {}: Downloaded as {}",
            item.key,
            path.file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default()
        ),
        Outcome::Failed { reason } => format!("✗ {}: {}", item.key, reason),
    }
}

/// Run `batch` into `opts.output_dir` with `fetcher`.
///
/// Per-item failures never abort the run; they are collected into the report, written to a
/// failure log, and carried in the retry set. Only output-directory setup fails the call: once
/// items are dispatched, retry set and failure log errors land in the report.
pub fn run_batch<F: ArtifactFetcher + ?Sized>(
    batch: &InputBatch,
    opts: &BatchOpts,
    fetcher: &F,
    cancel: Option<&AtomicBool>,
) -> Result<BatchReport> {
    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("create output directory {}", opts.output_dir.display()))?;
    info!(
        "Found {} items to process ({} rows dropped)",
        batch.items.len(),
        batch.dropped
    );
    debug!(
        "Output directory: {} | threads: {}",
        opts.output_dir.display(),
        opts.concurrency
    );

    let progress = ProgressAggregator::new(batch.items.len(), opts.concurrency, opts.show_progress);
    let mut ledger = ResultLedger::new(batch.items.len());
    let mut scheduler = Scheduler::new(opts, fetcher, &progress);
    if let Some(flag) = cancel {
        scheduler = scheduler.with_cancel(flag);
    }
    scheduler.execute_with(&batch.items, |item, outcome| {
        ledger.record(item, outcome);
        progress.note(&outcome_line(item, outcome));
    });
    progress.finish();

    let (tally, successful_keys) = ledger.finalize()?;

    // Every item has been dispatched by now: artifact and log errors are reported, not returned.
    let retry = update_retry_set(batch, &tally, &successful_keys);
    if matches!(retry, RetryUpdate::Untouched) && !tally.failed.is_empty() {
        warn!("{} items failed; retry set left as is", tally.failed.len());
    }
    let failure_log = write_failure_log(&tally, &opts.output_dir).unwrap_or_else(|e| {
        warn!("Failure log not written: {:#}", e);
        None
    });

    Ok(BatchReport {
        tally,
        retry,
        failure_log,
        dropped_rows: batch.dropped,
    })
}

/// Retry runs and clean normal runs shrink the existing set. A normal run with failures writes a
/// fresh one.
fn update_retry_set(
    batch: &InputBatch,
    tally: &Tally,
    successful_keys: &HashSet<String>,
) -> RetryUpdate {
    let handle = RetrySetHandle::for_batch(batch);
    let updated = if batch.is_retry_set() || tally.failed.is_empty() {
        reconcile_retry_set(&handle, successful_keys).map(|r| match r {
            Reconciled::Deleted => RetryUpdate::Deleted(handle.path.clone()),
            Reconciled::Rewritten { .. } => RetryUpdate::Rewritten(handle.path.clone()),
            Reconciled::Unchanged => RetryUpdate::Untouched,
        })
    } else {
        persist_failures(tally, batch).map(|h| match h {
            Some(h) => RetryUpdate::Written(h.path),
            None => RetryUpdate::Untouched,
        })
    };
    updated.unwrap_or_else(|e| {
        warn!("Retry set {} not updated: {:#}", handle.path.display(), e);
        RetryUpdate::Failed(format!("{:#}", e))
    })
}
