//! Artifact fetching: the collaborator capability that turns a locator into one local file.
//!
//! A fetcher is not assumed to tolerate shared state. Every concurrent call receives its own
//! working directory and its own [`ExecutionContext`] (profile directory), and the scheduler
//! never runs two calls against the same context at once.

pub mod command;
pub mod http;
pub mod watcher;

pub use command::CommandFetcher;
pub use http::HttpFetcher;
pub use watcher::{
    Clock, CompletionWatcher, DirLister, DownloadState, FsLister, ListedFile, SystemClock,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Private execution context of one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub slot_id: usize,
    /// Isolated profile directory (browser profile, cached session state).
    pub profile_dir: PathBuf,
}

/// Fine-grained progress reported by a fetcher while it works.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchPhase {
    Loading,
    Locating,
    Downloading { bytes: u64 },
    Complete,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPhase::Loading => f.write_str("loading"),
            FetchPhase::Locating => f.write_str("locating"),
            FetchPhase::Downloading { bytes: 0 } => f.write_str("downloading"),
            FetchPhase::Downloading { bytes } => write!(f, "downloading ({} KB)", bytes / 1024),
            FetchPhase::Complete => f.write_str("complete"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("page load timed out: {0}")]
    PageLoadTimeout(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("download did not complete within {0:?}")]
    DownloadTimeout(Duration),
    #[error("launch failed: {0}")]
    LaunchFailure(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Given a locator and a private working directory, produce exactly one downloaded file.
pub trait ArtifactFetcher: Send + Sync {
    /// Initialize the slot's execution context. Called before every fetch; retried by the worker
    /// with a fixed count and delay.
    fn launch(&self, _ctx: &ExecutionContext) -> Result<(), FetchError> {
        Ok(())
    }

    /// Download the artifact behind `locator` into `working_dir` and return its path.
    fn fetch(
        &self,
        locator: &str,
        working_dir: &Path,
        ctx: &ExecutionContext,
        on_phase: &dyn Fn(FetchPhase),
    ) -> Result<PathBuf, FetchError>;
}

impl<T: ArtifactFetcher + ?Sized> ArtifactFetcher for Box<T> {
    fn launch(&self, ctx: &ExecutionContext) -> Result<(), FetchError> {
        (**self).launch(ctx)
    }

    fn fetch(
        &self,
        locator: &str,
        working_dir: &Path,
        ctx: &ExecutionContext,
        on_phase: &dyn Fn(FetchPhase),
    ) -> Result<PathBuf, FetchError> {
        (**self).fetch(locator, working_dir, ctx, on_phase)
    }
}
