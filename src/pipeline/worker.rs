//! One item's fetch → rename → cleanup sequence as an all-or-nothing unit.

use log::debug;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::engine::dedup::{find_existing, output_path_for};
use crate::engine::progress::ProgressAggregator;
use crate::engine::tools::move_no_clobber;
use crate::fetch::{ArtifactFetcher, FetchPhase};
use crate::pipeline::context::{ExecutionSlot, launch_with_retry};
use crate::utils::ScratchDir;
use crate::{FailureReason, LaunchPolicy, Outcome, WorkItem};

fn failed(reason: impl Into<FailureReason>) -> Outcome {
    Outcome::Failed {
        reason: reason.into(),
    }
}

/// Run one item on `slot`. Never panics and never leaves scratch behind.
///
/// `Completed` guarantees the final file exists at `{output_dir}/{key}{ext}`. `Failed` guarantees
/// nothing partial was left at that path and the scratch directory is gone.
pub fn run_item<F: ArtifactFetcher + ?Sized>(
    item: &WorkItem,
    output_dir: &Path,
    slot: &ExecutionSlot,
    fetcher: &F,
    launch: &LaunchPolicy,
    progress: &ProgressAggregator,
) -> Outcome {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        fetch_and_place(item, output_dir, slot, fetcher, launch, progress)
    }))
    .unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        failed(FailureReason::Panicked(msg))
    });
    let phase = match &outcome {
        Outcome::Skipped { .. } => "skipped",
        Outcome::Completed { .. } => "done",
        Outcome::Failed { .. } => "failed",
    };
    progress.report(slot.slot_id, &item.key, phase);
    outcome
}

fn fetch_and_place<F: ArtifactFetcher + ?Sized>(
    item: &WorkItem,
    output_dir: &Path,
    slot: &ExecutionSlot,
    fetcher: &F,
    launch: &LaunchPolicy,
    progress: &ProgressAggregator,
) -> Outcome {
    let key = item.key.as_str();
    progress.report(slot.slot_id, key, "checking");
    if let Some(existing) = find_existing(output_dir, key) {
        debug!("{}: already present at {}", key, existing.display());
        return Outcome::Skipped { existing };
    }

    let scratch_path = slot.scratch_dir_for(key);
    let scratch = match ScratchDir::create(scratch_path.clone()) {
        Ok(s) => s,
        Err(e) => {
            return failed(FailureReason::Scratch {
                path: scratch_path,
                message: e.to_string(),
            });
        }
    };

    progress.report(slot.slot_id, key, "launching");
    if let Err(e) = launch_with_retry(fetcher, &slot.context, launch) {
        return failed(e);
    }

    let on_phase = |phase: FetchPhase| progress.report(slot.slot_id, key, &phase.to_string());
    let produced = match fetcher.fetch(&item.locator, scratch.path(), &slot.context, &on_phase) {
        Ok(p) if p.is_file() => p,
        Ok(p) => {
            debug!("{}: fetcher returned {} but no file is there", key, p.display());
            return failed(FailureReason::MissingOutput);
        }
        Err(e) => return failed(e),
    };

    progress.report(slot.slot_id, key, "moving");
    let final_path = output_path_for(output_dir, key, produced.extension());
    // A duplicate key on another slot may have landed under a different extension.
    if let Some(other) = find_existing(output_dir, key) {
        return failed(FailureReason::Move {
            path: final_path,
            message: format!("{} already exists", other.display()),
        });
    }
    if let Err(e) = move_no_clobber(&produced, &final_path) {
        let message = if e.kind() == io::ErrorKind::AlreadyExists {
            "destination already exists".to_string()
        } else {
            e.to_string()
        };
        return failed(FailureReason::Move {
            path: final_path,
            message,
        });
    }
    drop(scratch);
    Outcome::Completed { path: final_path }
}
