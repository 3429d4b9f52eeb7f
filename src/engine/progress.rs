//! Progress aggregation and kdam bars.
//!
//! Workers call [`ProgressAggregator::report`] from their own threads. Bars sit behind
//! `Arc<Mutex<Bar>>` and are only touched with `try_lock`, so a busy renderer drops an
//! intermediate phase instead of stalling a worker. `advance` is counted atomically and the bar
//! is moved with `update_to`, so a skipped refresh never loses a completed item.

use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: String,
    pub animation: Animation,
    pub position: u16,
    pub leave: bool,
}

impl ProgressBarConfig {
    /// Create a new progress bar configuration
    pub fn new(total: usize, desc: impl Into<String>, animation: Animation) -> Self {
        Self {
            total,
            desc: desc.into(),
            animation,
            position: 0,
            leave: true,
        }
    }

    /// Stack below the overall bar; cleared on close.
    pub fn at_position(mut self, position: u16) -> Self {
        self.position = position;
        self.leave = false;
        self
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        position = config.position,
        leave = config.leave,
        unit = " file"
    )))
}

/// Force a refresh of the bar.
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.refresh();
    }
}

/// Last phase seen on one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotPhase {
    pub key: String,
    pub phase: String,
}

pub struct ProgressAggregator {
    total: usize,
    advanced: AtomicUsize,
    overall: Option<ProgressBar>,
    slot_bars: Vec<Option<ProgressBar>>,
    phases: Vec<Mutex<Option<SlotPhase>>>,
}

impl ProgressAggregator {
    /// Aggregator for `total` items over `slots` slots. With `show_bars`, draws an overall bar and,
    /// when there is more than one slot, one bar per slot.
    pub fn new(total: usize, slots: usize, show_bars: bool) -> Self {
        let slots = slots.max(1);
        let overall = show_bars.then(|| {
            create_progress_bar(ProgressBarConfig::new(
                total,
                if slots > 1 { "Overall" } else { "Processing" },
                Animation::Classic,
            ))
        });
        let slot_bars = (0..slots)
            .map(|slot| {
                (show_bars && slots > 1).then(|| {
                    let bar = create_progress_bar(
                        ProgressBarConfig::new(0, format!("Slot {}: idle", slot + 1), Animation::Classic)
                            .at_position((slot + 1) as u16),
                    );
                    refresh_bar(&bar);
                    bar
                })
            })
            .collect();
        Self {
            total,
            advanced: AtomicUsize::new(0),
            overall,
            slot_bars,
            phases: (0..slots).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Aggregator with no bars (library use, tests).
    pub fn hidden(total: usize, slots: usize) -> Self {
        Self::new(total, slots, false)
    }

    /// Fire-and-forget phase update. Dropped when the slot's state or bar is contended.
    pub fn report(&self, slot_id: usize, item_key: &str, phase: &str) {
        if let Some(cell) = self.phases.get(slot_id)
            && let Ok(mut last) = cell.try_lock()
        {
            *last = Some(SlotPhase {
                key: item_key.to_string(),
                phase: phase.to_string(),
            });
        }
        let bar = self
            .slot_bars
            .get(slot_id)
            .and_then(Option::as_ref)
            .or(self.overall.as_ref());
        if let Some(bar) = bar
            && let Ok(mut bar) = bar.try_lock()
        {
            bar.set_description(format!("{item_key}: {phase}"));
            let _ = bar.refresh();
        }
    }

    /// Count `n` finished items. Never lost: the counter is atomic and the bar catches up.
    pub fn advance(&self, n: usize) {
        let done = self.advanced.fetch_add(n, Ordering::AcqRel) + n;
        if let Some(bar) = &self.overall
            && let Ok(mut bar) = bar.try_lock()
        {
            let _ = bar.update_to(done);
        }
    }

    /// Print a line above the bars (or log it when bars are hidden).
    pub fn note(&self, line: &str) {
        match &self.overall {
            Some(bar) => match bar.lock() {
                Ok(mut bar) => {
                    let _ = bar.write(line);
                }
                Err(_) => log::info!("{}", line),
            },
            None => log::info!("{}", line),
        }
    }

    pub fn advanced(&self) -> usize {
        self.advanced.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn last_phase(&self, slot_id: usize) -> Option<SlotPhase> {
        self.phases
            .get(slot_id)
            .and_then(|cell| cell.lock().ok().and_then(|p| p.clone()))
    }

    /// Bring the overall bar to the final count and clear slot bars.
    pub fn finish(&self) {
        for bar in self.slot_bars.iter().flatten() {
            if let Ok(mut bar) = bar.lock() {
                let _ = bar.clear();
            }
        }
        if let Some(bar) = &self.overall
            && let Ok(mut bar) = bar.lock()
        {
            let _ = bar.update_to(self.advanced());
            let _ = bar.refresh();
        }
    }
}
