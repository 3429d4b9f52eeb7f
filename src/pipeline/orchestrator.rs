//! Scheduler: fans work items out over K isolated execution slots and streams outcomes back.
//!
//! K == 1 runs every item in input order on one reused slot. K > 1 opens exactly K slots and
//! starts one worker thread per slot; item `i` belongs to slot `i % K`, fixed at submission.
//! A slot's items run one after another on its own thread, so two in-flight fetches never share
//! a slot. Outcomes arrive on a channel in completion order and are handed to `on_outcome` on the
//! calling thread, which is the only place the ledger is touched.

use crossbeam_channel::unbounded;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::engine::progress::ProgressAggregator;
use crate::fetch::ArtifactFetcher;
use crate::pipeline::context::{ExecutionSlot, clear_stale_scratch};
use crate::pipeline::worker::run_item;
use crate::{BatchOpts, FailureReason, Outcome, WorkItem};

pub struct Scheduler<'a, F: ArtifactFetcher + ?Sized> {
    opts: &'a BatchOpts,
    fetcher: &'a F,
    progress: &'a ProgressAggregator,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, F: ArtifactFetcher + ?Sized> Scheduler<'a, F> {
    pub fn new(opts: &'a BatchOpts, fetcher: &'a F, progress: &'a ProgressAggregator) -> Self {
        Self {
            opts,
            fetcher,
            progress,
            cancel: None,
        }
    }

    /// Stop starting new items once `flag` is set. Items not started end as `Failed(Cancelled)`.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn run_one(&self, item: &WorkItem, slot: &ExecutionSlot) -> Outcome {
        if self.cancelled() {
            return Outcome::Failed {
                reason: FailureReason::Cancelled,
            };
        }
        run_item(
            item,
            &self.opts.output_dir,
            slot,
            self.fetcher,
            &self.opts.launch,
            self.progress,
        )
    }

    /// Run every item and return `(item, outcome)` pairs in the order they finished.
    pub fn execute(&self, items: &[WorkItem]) -> Vec<(WorkItem, Outcome)> {
        self.execute_with(items, |_, _| {})
    }

    /// Like [`execute`](Self::execute), calling `on_outcome` as each outcome arrives.
    pub fn execute_with(
        &self,
        items: &[WorkItem],
        mut on_outcome: impl FnMut(&WorkItem, &Outcome),
    ) -> Vec<(WorkItem, Outcome)> {
        let k = self.opts.concurrency.max(1);
        clear_stale_scratch(&self.opts.output_dir);
        let mut results = Vec::with_capacity(items.len());
        let mut deliver = |item: &WorkItem, outcome: Outcome| {
            on_outcome(item, &outcome);
            self.progress.advance(1);
            results.push((item.clone(), outcome));
        };

        if k == 1 {
            debug!("Running {} items sequentially", items.len());
            let slot = ExecutionSlot::open(0, self.opts);
            for item in items {
                let outcome = self.run_one(item, &slot);
                deliver(item, outcome);
            }
            return results;
        }

        debug!("Running {} items over {} slots", items.len(), k);
        let (tx, rx) = unbounded::<(usize, Outcome)>();
        thread::scope(|scope| {
            for slot_id in 0..k {
                let tx = tx.clone();
                let slot = ExecutionSlot::open(slot_id, self.opts);
                scope.spawn(move || {
                    for (pos, item) in items.iter().enumerate().skip(slot_id).step_by(k) {
                        let outcome = self.run_one(item, &slot);
                        if tx.send((pos, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            // Dropping the last sender closes the channel once every slot thread is done.
            drop(tx);
            while let Ok((pos, outcome)) = rx.recv() {
                deliver(&items[pos], outcome);
            }
        });
        results
    }
}
