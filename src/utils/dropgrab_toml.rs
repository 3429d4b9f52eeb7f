//! Load `.dropgrab.toml` from the input file's directory (CLI only). Lib callers build
//! [`BatchOpts`] directly.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::BatchOpts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DropgrabToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    threads: Option<usize>,
    key_column: Option<String>,
    locator_column: Option<String>,
    /// Seconds.
    timeout: Option<u64>,
    /// Seconds.
    page_timeout: Option<u64>,
    poll_interval_ms: Option<u64>,
    launch_attempts: Option<u32>,
    launch_backoff_ms: Option<u64>,
    fetch_cmd: Option<String>,
    profile_root: Option<String>,
    user_agent: Option<String>,
    verbose: Option<bool>,
}

/// Load `.dropgrab.toml` from `dir` if present. Returns None if the file is missing or unreadable.
pub(crate) fn load_dropgrab_toml(dir: &Path) -> Option<DropgrabToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_dropgrab_toml(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub(crate) fn parse_dropgrab_toml(s: &str) -> Result<DropgrabToml, toml::de::Error> {
    toml::from_str(s)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($set:expr, $opts:expr, $set_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $set.$set_field.clone() {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
pub(crate) fn apply_file_to_opts(file: &DropgrabToml, opts: &mut BatchOpts) {
    let set = &file.settings;
    apply_file_opt!(set, opts, threads => concurrency);
    apply_file_opt!(set, opts, key_column => schema.key_column);
    apply_file_opt!(set, opts, locator_column => schema.locator_column);
    apply_file_opt!(set, opts, launch_attempts => launch.attempts);
    apply_file_opt!(set, opts, user_agent => user_agent);
    apply_file_opt!(set, opts, verbose => verbose);
    if let Some(secs) = set.timeout {
        opts.fetch_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = set.page_timeout {
        opts.page_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = set.poll_interval_ms {
        opts.poll_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = set.launch_backoff_ms {
        opts.launch.backoff = Duration::from_millis(ms);
    }
    if let Some(ref cmd) = set.fetch_cmd {
        opts.fetch_cmd = Some(cmd.clone());
    }
    if let Some(ref p) = set.profile_root {
        opts.profile_root = PathBuf::from(p);
    }
}
