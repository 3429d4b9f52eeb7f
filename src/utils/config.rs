//! Application configuration constants.
//! Tuning, timeouts and derived names in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    failure_log_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                failure_log_prefix: "failed_downloads".to_string(),
            }
        })
    }

    /// `.dropgrab.toml`, looked up next to the input file.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Scratch subdirectory name for one item on one slot: `.tmp_{slot}_{key}`.
    pub fn scratch_dir_name(&self, slot_id: usize, key: &str) -> String {
        format!("{}{slot_id}_{key}", ScratchConsts::PREFIX)
    }

    /// Prefix shared by every scratch directory a slot may create.
    pub fn scratch_slot_prefix(&self, slot_id: usize) -> String {
        format!("{}{slot_id}_", ScratchConsts::PREFIX)
    }

    /// Per-slot browser/automation profile directory name.
    pub fn profile_dir_name(&self, slot_id: usize) -> String {
        format!("{}-profile-{slot_id}", self.pkg_name)
    }

    /// Failure log name for a run started at `stamp` (already formatted).
    pub fn failure_log_filename(&self, stamp: &str) -> String {
        format!("{}_{stamp}.txt", self.failure_log_prefix)
    }
}

// ---- Input ----

pub struct InputConsts;

impl InputConsts {
    /// Default item key column.
    pub const KEY_COLUMN: &'static str = "UPC";
    /// Default source locator column.
    pub const LOCATOR_COLUMN: &'static str = "IMAGES_LINK";
    /// Stem suffix that marks a persisted retry set.
    pub const RETRY_SUFFIX: &'static str = "_retry";
}

// ---- Scratch ----

pub struct ScratchConsts;

impl ScratchConsts {
    pub const PREFIX: &'static str = ".tmp_";
}

// ---- Fetching ----

/// Timeouts and polling for one fetch.
pub struct FetchConsts;

impl FetchConsts {
    /// Ceiling for one download's completion wait.
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
    /// Ceiling for the initial page/response load.
    pub const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Interval between working-directory snapshots.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
    /// Extensions of in-progress download files (browser and HTTP fetchers).
    pub const PARTIAL_EXTENSIONS: &'static [&'static str] =
        &["crdownload", "part", "partial", "download", "tmp"];
    /// Fallback artifact name when neither headers nor URL provide one.
    pub const FALLBACK_FILENAME: &'static str = "download";
    pub const USER_AGENT: &'static str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
}

// ---- Slots ----

/// Execution-context start-up retry policy: fixed count, fixed delay.
pub struct SlotConsts;

impl SlotConsts {
    pub const LAUNCH_ATTEMPTS: u32 = 3;
    pub const LAUNCH_BACKOFF: Duration = Duration::from_secs(2);
}

// ---- Summary output ----

/// Width of the `=` rule around the printed summary.
pub const SUMMARY_RULE_WIDTH: usize = 60;
