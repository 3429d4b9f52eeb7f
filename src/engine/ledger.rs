//! Result ledger: tallies outcomes and maintains the persisted retry set.
//!
//! Retry set lifecycle: absent → written (first batch with failures) → rewritten with fewer rows
//! (partial success on retry) → deleted (every key succeeded) → absent. A rewrite only ever removes
//! rows; it never adds keys that were not already there.

use anyhow::{Context, Result, ensure};
use log::{debug, info};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::input::{InputBatch, column_index, read_rows, write_rows};
use crate::{FailedItem, Outcome, Tally, WorkItem};

/// Handle to a persisted retry set on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrySetHandle {
    pub path: PathBuf,
    pub delimiter: u8,
    /// Header name of the key column in the persisted file.
    pub key_column: String,
}

impl RetrySetHandle {
    /// Handle for `batch`'s retry location.
    pub fn for_batch(batch: &InputBatch) -> Self {
        Self {
            path: batch.retry_path(),
            delimiter: batch.delimiter,
            key_column: batch.headers.get(batch.key_idx).cloned().unwrap_or_default(),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Result of reconciling a retry set against this run's successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// Nothing on disk, or no row removed.
    Unchanged,
    /// Rewritten with exactly these remaining rows.
    Rewritten { remaining: usize },
    /// Every row succeeded; the file is gone.
    Deleted,
}

/// Accumulates outcomes for one run. Owned by the thread that drains worker results, so
/// `record` calls are serialized by construction.
#[derive(Debug)]
pub struct ResultLedger {
    tally: Tally,
    successful_keys: HashSet<String>,
}

impl ResultLedger {
    pub fn new(total: usize) -> Self {
        Self {
            tally: Tally {
                total,
                ..Tally::default()
            },
            successful_keys: HashSet::new(),
        }
    }

    pub fn record(&mut self, item: &WorkItem, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped { .. } => self.tally.skipped += 1,
            Outcome::Completed { .. } => self.tally.completed += 1,
            Outcome::Failed { reason } => self.tally.failed.push(FailedItem {
                key: item.key.clone(),
                locator: item.locator.clone(),
                reason: reason.to_string(),
                row: item.row.clone(),
            }),
        }
        if outcome.is_success() {
            self.successful_keys.insert(item.key.clone());
        }
    }

    /// Close the ledger. Every item must be accounted for exactly once. Returns the tally and the
    /// keys that completed or were skipped.
    pub fn finalize(self) -> Result<(Tally, HashSet<String>)> {
        let t = &self.tally;
        ensure!(
            t.accounted() == t.total,
            "ledger mismatch: completed {} + skipped {} + failed {} != total {}",
            t.completed,
            t.skipped,
            t.failed.len(),
            t.total
        );
        Ok((self.tally, self.successful_keys))
    }
}

/// Write this run's failed rows as a retry set next to the original input. No failures: no I/O.
pub fn persist_failures(tally: &Tally, batch: &InputBatch) -> Result<Option<RetrySetHandle>> {
    if tally.failed.is_empty() {
        return Ok(None);
    }
    let handle = RetrySetHandle::for_batch(batch);
    write_rows(
        &handle.path,
        handle.delimiter,
        &batch.headers,
        tally.failed.iter().map(|f| &f.row),
    )
    .with_context(|| format!("write retry set {}", handle.path.display()))?;
    info!(
        "Wrote {} failed rows to {}",
        tally.failed.len(),
        handle.path.display()
    );
    Ok(Some(handle))
}

/// Remove every row whose key succeeded. Deletes the file when no rows remain.
pub fn reconcile_retry_set(
    handle: &RetrySetHandle,
    successful_keys: &HashSet<String>,
) -> Result<Reconciled> {
    if !handle.exists() {
        return Ok(Reconciled::Unchanged);
    }
    let (headers, rows) = read_rows(&handle.path, handle.delimiter)?;
    let key_idx = column_index(&headers, &handle.key_column).with_context(|| {
        format!(
            "retry set {} has no {} column",
            handle.path.display(),
            handle.key_column
        )
    })?;
    let before = rows.len();
    let remaining: Vec<_> = rows
        .into_iter()
        .filter(|row| !successful_keys.contains(row.get(key_idx).trim()))
        .collect();

    if remaining.is_empty() {
        remove_retry_set(&handle.path)?;
        return Ok(Reconciled::Deleted);
    }
    if remaining.len() == before {
        debug!("Retry set {} unchanged", handle.path.display());
        return Ok(Reconciled::Unchanged);
    }
    write_rows(&handle.path, handle.delimiter, &headers, &remaining)
        .with_context(|| format!("rewrite retry set {}", handle.path.display()))?;
    info!(
        "Retry set {}: {} rows resolved, {} remaining",
        handle.path.display(),
        before - remaining.len(),
        remaining.len()
    );
    Ok(Reconciled::Rewritten {
        remaining: remaining.len(),
    })
}

fn remove_retry_set(path: &Path) -> Result<()> {
    std::fs::remove_file(path).with_context(|| format!("delete retry set {}", path.display()))?;
    info!("All retry items succeeded; removed {}", path.display());
    Ok(())
}
