//! Download completion detection as an explicit state machine.
//!
//! Each [`CompletionWatcher::poll`] takes one snapshot of the working directory and moves
//! between `Waiting`, `InProgress` and `Complete`; once the clock passes the timeout without a
//! complete file the watcher is `TimedOut`. `Complete` and `TimedOut` are terminal.
//! Directory listing and time are injected so the machine can be driven without real I/O.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::utils::config::FetchConsts;

/// One regular file seen in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Lists the regular files directly inside a directory.
pub trait DirLister {
    fn list(&self, dir: &Path) -> io::Result<Vec<ListedFile>>;
}

/// Elapsed time since the watcher started, plus a way to wait.
pub trait Clock {
    fn elapsed(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

/// Real filesystem lister (depth 1, files only).
#[derive(Clone, Copy, Debug, Default)]
pub struct FsLister;

impl DirLister for FsLister {
    fn list(&self, dir: &Path) -> io::Result<Vec<ListedFile>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(ListedFile {
                path: entry.into_path(),
                size,
            });
        }
        Ok(files)
    }
}

/// Wall clock started at construction.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadState {
    /// Nothing in the directory yet.
    Waiting,
    /// Partial files present; summed size so far.
    InProgress { partial_bytes: u64 },
    Complete(PathBuf),
    TimedOut,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Complete(_) | DownloadState::TimedOut)
    }
}

/// True when `path` carries one of the in-progress download extensions.
pub fn is_partial_download(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            FetchConsts::PARTIAL_EXTENSIONS
                .iter()
                .any(|p| p.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Classify one snapshot, ignoring time.
pub fn classify_snapshot(files: &[ListedFile]) -> DownloadState {
    let partial_bytes: u64 = files
        .iter()
        .filter(|f| is_partial_download(&f.path))
        .map(|f| f.size)
        .sum();
    if files.iter().any(|f| is_partial_download(&f.path)) {
        return DownloadState::InProgress { partial_bytes };
    }
    files
        .iter()
        .map(|f| &f.path)
        .min()
        .map(|p| DownloadState::Complete(p.clone()))
        .unwrap_or(DownloadState::Waiting)
}

pub struct CompletionWatcher<L: DirLister, C: Clock> {
    dir: PathBuf,
    lister: L,
    clock: C,
    timeout: Duration,
    poll_interval: Duration,
    state: DownloadState,
}

impl CompletionWatcher<FsLister, SystemClock> {
    /// Watcher over the real filesystem, clock starting now.
    pub fn on_disk(dir: &Path, timeout: Duration, poll_interval: Duration) -> Self {
        Self::new(dir, FsLister, SystemClock::start(), timeout, poll_interval)
    }
}

impl<L: DirLister, C: Clock> CompletionWatcher<L, C> {
    pub fn new(dir: &Path, lister: L, clock: C, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            lister,
            clock,
            timeout,
            poll_interval,
            state: DownloadState::Waiting,
        }
    }

    pub fn state(&self) -> &DownloadState {
        &self.state
    }

    /// Take one snapshot and advance. Terminal states are sticky. A listing error counts as an
    /// empty snapshot (the directory may not exist yet).
    pub fn poll(&mut self) -> &DownloadState {
        if self.state.is_terminal() {
            return &self.state;
        }
        let files = self.lister.list(&self.dir).unwrap_or_default();
        let observed = classify_snapshot(&files);
        self.state = match observed {
            DownloadState::Complete(p) => DownloadState::Complete(p),
            _ if self.clock.elapsed() >= self.timeout => DownloadState::TimedOut,
            other => other,
        };
        &self.state
    }

    /// True once the clock has passed the timeout, whatever the last snapshot said.
    pub fn expired(&self) -> bool {
        self.clock.elapsed() >= self.timeout
    }

    /// Sleep one poll interval on the injected clock.
    pub fn pause(&self) {
        self.clock.sleep(self.poll_interval);
    }

    /// Poll until terminal, reporting partial sizes as they change.
    pub fn wait(&mut self, mut on_progress: impl FnMut(u64)) -> DownloadState {
        let mut last_bytes = None;
        loop {
            match self.poll().clone() {
                DownloadState::InProgress { partial_bytes } => {
                    if last_bytes != Some(partial_bytes) {
                        on_progress(partial_bytes);
                        last_bytes = Some(partial_bytes);
                    }
                }
                state if state.is_terminal() => return state,
                _ => {}
            }
            self.pause();
        }
    }
}
