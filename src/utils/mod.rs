pub mod config;
pub mod dropgrab_toml;
pub mod env;
pub mod logger;
pub mod tempfiles;

pub use config::*;
pub use env::{apply_env_to_opts, load_dotenv};
pub use logger::{Colors, setup_logging};
pub use tempfiles::{ScratchDir, rename_temp_to_final, temp_path_for};
