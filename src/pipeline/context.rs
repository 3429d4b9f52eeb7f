//! Execution slots: the per-worker isolated context (profile + scratch root) and the fixed-count
//! launch retry applied when a slot's context is started.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::thread;

use crate::fetch::{ArtifactFetcher, ExecutionContext, FetchError};
use crate::utils::config::{PackagePaths, ScratchConsts};
use crate::{BatchOpts, LaunchPolicy};

/// Exclusive owner of one unit of the external automation resource. Created when the pool starts
/// and reused for every item assigned to it. Dropping it removes any scratch it left behind.
#[derive(Debug)]
pub struct ExecutionSlot {
    pub slot_id: usize,
    pub context: ExecutionContext,
    scratch_root: PathBuf,
}

impl ExecutionSlot {
    /// Open slot `slot_id` with scratch space under `output_dir` and a profile derived from opts.
    pub fn open(slot_id: usize, opts: &BatchOpts) -> Self {
        Self {
            slot_id,
            context: ExecutionContext {
                slot_id,
                profile_dir: opts.profile_dir_for(slot_id),
            },
            scratch_root: opts.output_dir.clone(),
        }
    }

    /// `{output_dir}/.tmp_{slot}_{key}`: unique per slot and item.
    pub fn scratch_dir_for(&self, key: &str) -> PathBuf {
        self.scratch_root
            .join(PackagePaths::get().scratch_dir_name(self.slot_id, key))
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        let prefix = PackagePaths::get().scratch_slot_prefix(self.slot_id);
        remove_scratch_dirs(&self.scratch_root, &prefix);
    }
}

/// Remove every scratch directory in `output_dir`, whichever slot count the run that left it used.
/// Called once before any slot opens.
pub fn clear_stale_scratch(output_dir: &Path) {
    remove_scratch_dirs(output_dir, ScratchConsts::PREFIX);
}

fn remove_scratch_dirs(dir: &Path, prefix: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(prefix));
        if matches && entry.path().is_dir() {
            debug!("removing stale scratch {}", entry.path().display());
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
}

/// Start `ctx` via the fetcher, retrying a fixed number of times with a fixed delay.
/// Returns the last error once attempts are exhausted.
pub fn launch_with_retry<F: ArtifactFetcher + ?Sized>(
    fetcher: &F,
    ctx: &ExecutionContext,
    policy: &LaunchPolicy,
) -> Result<(), FetchError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match fetcher.launch(ctx) {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(
                    "slot {}: launch attempt {}/{} failed: {}",
                    ctx.slot_id, attempt, attempts, e
                );
                thread::sleep(policy.backoff);
                attempt += 1;
            }
        }
    }
}
