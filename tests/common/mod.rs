//! Shared fixtures: a scriptable stub fetcher and small input/option builders.
#![allow(dead_code)]

use dropgrab::fetch::{ArtifactFetcher, ExecutionContext, FetchError, FetchPhase};
use dropgrab::{BatchOpts, LaunchPolicy};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const HEADER: &str = "UPC,IMAGES_LINK,Vendor";

/// What the stub does for one locator.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Write a file with this name into the working dir and return it.
    Produce(&'static str),
    Fail(FetchError),
    /// Return a path that does not exist.
    NoFile,
    Panic,
    /// Drop `{key}.png` straight into the output dir (a racing duplicate), then produce this name.
    RaceThenProduce { output_dir: PathBuf, key: &'static str, name: &'static str },
}

#[derive(Default)]
pub struct StubFetcher {
    behaviors: HashMap<String, Behavior>,
    /// Locators fetched, in call order.
    pub calls: Mutex<Vec<String>>,
    /// (locator, slot) per fetch.
    pub slots_used: Mutex<Vec<(String, usize)>>,
    /// Launch attempts that should fail before launches start succeeding.
    launch_failures_left: AtomicUsize,
    /// Slots whose launch always fails.
    broken_slots: HashSet<usize>,
    pub launch_calls: AtomicUsize,
    in_flight: Mutex<HashSet<usize>>,
    /// Set if two fetches ever ran on the same slot at once.
    pub overlap: AtomicBool,
    delay: Duration,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, locator: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(locator.to_string(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first_launches(self, n: usize) -> Self {
        self.launch_failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_broken_slot(mut self, slot: usize) -> Self {
        self.broken_slots.insert(slot);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called(&self, locator: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == locator)
    }
}

impl ArtifactFetcher for StubFetcher {
    fn launch(&self, ctx: &ExecutionContext) -> Result<(), FetchError> {
        self.launch_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_slots.contains(&ctx.slot_id) {
            return Err(FetchError::LaunchFailure(format!("slot {} broken", ctx.slot_id)));
        }
        let left = self.launch_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.launch_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(FetchError::LaunchFailure("not yet".to_string()));
        }
        Ok(())
    }

    fn fetch(
        &self,
        locator: &str,
        working_dir: &Path,
        ctx: &ExecutionContext,
        on_phase: &dyn Fn(FetchPhase),
    ) -> Result<PathBuf, FetchError> {
        self.calls.lock().unwrap().push(locator.to_string());
        self.slots_used
            .lock()
            .unwrap()
            .push((locator.to_string(), ctx.slot_id));
        if !self.in_flight.lock().unwrap().insert(ctx.slot_id) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        on_phase(FetchPhase::Loading);
        std::thread::sleep(self.delay);
        let result = match self.behaviors.get(locator).cloned() {
            Some(Behavior::Produce(name)) => {
                let p = working_dir.join(name);
                std::fs::write(&p, locator.as_bytes()).unwrap();
                on_phase(FetchPhase::Complete);
                Ok(p)
            }
            Some(Behavior::Fail(e)) => Err(e),
            Some(Behavior::NoFile) => Ok(working_dir.join("ghost.jpg")),
            Some(Behavior::Panic) => {
                self.in_flight.lock().unwrap().remove(&ctx.slot_id);
                panic!("stub exploded on {locator}");
            }
            Some(Behavior::RaceThenProduce {
                output_dir,
                key,
                name,
            }) => {
                std::fs::write(output_dir.join(format!("{key}.png")), b"other slot").unwrap();
                let p = working_dir.join(name);
                std::fs::write(&p, locator.as_bytes()).unwrap();
                Ok(p)
            }
            None => Err(FetchError::ElementNotFound(format!("no stub for {locator}"))),
        };
        self.in_flight.lock().unwrap().remove(&ctx.slot_id);
        result
    }
}

/// Write a CSV with [`HEADER`] and `(key, url, vendor)` rows.
pub fn write_input(dir: &Path, name: &str, rows: &[(&str, &str, &str)]) -> PathBuf {
    let mut body = format!("{HEADER}\n");
    for (k, u, v) in rows {
        body.push_str(&format!("{k},{u},{v}\n"));
    }
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

pub fn opts(output_dir: &Path, profile_root: &Path, concurrency: usize) -> BatchOpts {
    BatchOpts {
        output_dir: output_dir.to_path_buf(),
        concurrency,
        profile_root: profile_root.to_path_buf(),
        launch: LaunchPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        },
        ..Default::default()
    }
}

/// Names of scratch directories left in `dir`.
pub fn leftover_scratch(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with(".tmp_"))
                .collect()
        })
        .unwrap_or_default()
}
