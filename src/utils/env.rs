//! Environment overrides: process env → `.env` beside the input file.

use log::debug;
use std::path::Path;

use crate::BatchOpts;

pub const ENV_FETCH_CMD: &str = "DROPGRAB_FETCH_CMD";
pub const ENV_USER_AGENT: &str = "DROPGRAB_USER_AGENT";

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Load `.env` from `dir` (if present) without overriding variables already set.
pub fn load_dotenv(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.is_file() {
        match dotenvy::from_path(&env_path) {
            Ok(()) => debug!("Loaded {}", env_path.display()),
            Err(e) => log::warn!("{}: {}", env_path.display(), e),
        }
    }
}

/// Apply `DROPGRAB_*` variables to opts. Call after the TOML file and before CLI flags.
pub fn apply_env_to_opts(opts: &mut BatchOpts) {
    if let Some(cmd) = non_empty_var(ENV_FETCH_CMD) {
        debug!("Fetch command found in environment");
        opts.fetch_cmd = Some(cmd);
    }
    if let Some(ua) = non_empty_var(ENV_USER_AGENT) {
        opts.user_agent = ua;
    }
}
