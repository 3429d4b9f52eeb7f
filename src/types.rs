//! Public and internal types for the dropgrab API and pipeline.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::FetchError;
use crate::utils::config::{FetchConsts, InputConsts, PackagePaths, SlotConsts};

/// One raw input record: every column value in header order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Row {
    pub values: Vec<String>,
}

impl Row {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Column value at `idx`, or `""` for short rows.
    pub fn get(&self, idx: usize) -> &str {
        self.values.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// A single unit of work: download one artifact for `key` from `locator`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// Position in the input batch (after dropping invalid rows).
    pub index: usize,
    /// Trimmed item key; becomes the output file stem.
    pub key: String,
    /// Trimmed source locator (URL).
    pub locator: String,
    /// The full original record, kept so failures can be written back with the same shape.
    pub row: Row,
}

/// Why an item ended as [`Outcome::Failed`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("download failed - no file returned")]
    MissingOutput,
    #[error("move to {path} failed: {message}")]
    Move { path: PathBuf, message: String },
    #[error("scratch directory {path} unavailable: {message}")]
    Scratch { path: PathBuf, message: String },
    #[error("cancelled before start")]
    Cancelled,
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Terminal result for one [`WorkItem`]. Produced exactly once per item.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Skipped { existing: PathBuf },
    Completed { path: PathBuf },
    Failed { reason: FailureReason },
}

impl Outcome {
    /// Completed or skipped: the artifact for this key is on disk.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }
}

/// A failed item as kept by the ledger: key, locator, reason and the original record.
#[derive(Clone, Debug, Serialize)]
pub struct FailedItem {
    pub key: String,
    pub locator: String,
    pub reason: String,
    #[serde(skip)]
    pub row: Row,
}

/// Per-run counters. Counts only increase; `failed` keeps arrival order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Tally {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: Vec<FailedItem>,
}

impl Tally {
    pub fn accounted(&self) -> usize {
        self.completed + self.skipped + self.failed.len()
    }
}

/// What happened to the retry artifact at the end of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RetryUpdate {
    /// No failures and no artifact to reconcile.
    Untouched,
    /// Artifact written with this run's failures.
    Written(PathBuf),
    /// Artifact rewritten with fewer rows.
    Rewritten(PathBuf),
    /// Artifact deleted: every key in it has succeeded.
    Deleted(PathBuf),
    /// Artifact could not be read or written; the message says why.
    Failed(String),
}

/// Everything a finished batch reports back to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub tally: Tally,
    pub retry: RetryUpdate,
    pub failure_log: Option<PathBuf>,
    pub dropped_rows: usize,
}

/// Column names for the two required input fields.
#[derive(Clone, Debug)]
pub struct InputSchema {
    pub key_column: String,
    pub locator_column: String,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            key_column: InputConsts::KEY_COLUMN.to_string(),
            locator_column: InputConsts::LOCATOR_COLUMN.to_string(),
        }
    }
}

/// Fixed-count, fixed-delay retry policy for execution-context start-up.
#[derive(Clone, Copy, Debug)]
pub struct LaunchPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            attempts: SlotConsts::LAUNCH_ATTEMPTS,
            backoff: SlotConsts::LAUNCH_BACKOFF,
        }
    }
}

/// Full batch options. Built by the CLI from defaults, `.dropgrab.toml`, env and flags; lib callers
/// fill it directly.
#[derive(Clone, Debug)]
pub struct BatchOpts {
    /// Directory that receives `{key}{ext}` files and scratch subdirectories.
    pub output_dir: PathBuf,
    /// Number of concurrent execution slots (K). 1 means strictly sequential.
    pub concurrency: usize,
    pub schema: InputSchema,
    /// Parent of per-slot profile directories.
    pub profile_root: PathBuf,
    /// Hard ceiling for one fetch's completion wait.
    pub fetch_timeout: Duration,
    /// Ceiling for the initial page/response load.
    pub page_timeout: Duration,
    /// Completion watcher polling interval.
    pub poll_interval: Duration,
    pub launch: LaunchPolicy,
    /// External automation command template. When None, the HTTP fetcher is used.
    pub fetch_cmd: Option<String>,
    pub user_agent: String,
    /// Show kdam progress bars.
    pub show_progress: bool,
    pub verbose: bool,
    /// Print the final summary as JSON.
    pub json_summary: bool,
}

impl Default for BatchOpts {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            concurrency: 1,
            schema: InputSchema::default(),
            profile_root: std::env::temp_dir(),
            fetch_timeout: FetchConsts::DOWNLOAD_TIMEOUT,
            page_timeout: FetchConsts::PAGE_TIMEOUT,
            poll_interval: FetchConsts::POLL_INTERVAL,
            launch: LaunchPolicy::default(),
            fetch_cmd: None,
            user_agent: FetchConsts::USER_AGENT.to_string(),
            show_progress: false,
            verbose: false,
            json_summary: false,
        }
    }
}

impl BatchOpts {
    /// Profile directory for `slot_id`, derived deterministically from `profile_root`.
    pub fn profile_dir_for(&self, slot_id: usize) -> PathBuf {
        self.profile_root
            .join(PackagePaths::get().profile_dir_name(slot_id))
    }
}
