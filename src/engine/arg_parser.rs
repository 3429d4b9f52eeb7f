use clap::Parser;
use std::path::PathBuf;

/// Batch-download one artifact per item key from shared-folder links.
#[derive(Clone, Parser)]
#[command(name = "dropgrab", version)]
#[command(about = "Download one file per row of INPUT into OUTPUT_DIR, named after the row's key.")]
#[command(after_help = "Input format:
  CSV or TSV with a header row. Required columns (defaults): UPC (item key), IMAGES_LINK (URL).

Failed rows are written to <input>_retry.<ext>; run again with that file to retry them.")]
pub struct Cli {
    /// Input file (.csv or .tsv).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output directory for downloaded files.
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Number of parallel download slots.
    #[arg(long, short = 't', value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: Option<u16>,

    /// Item key column name.
    #[arg(long)]
    pub key_column: Option<String>,

    /// Source URL column name.
    #[arg(long)]
    pub locator_column: Option<String>,

    /// Per-download completion timeout in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// External fetch command template, e.g. "fetch.py {url} {dir} --profile {profile}".
    /// Without it, links are downloaded directly over HTTP.
    #[arg(long)]
    pub fetch_cmd: Option<String>,

    /// Directory holding per-slot profiles. Default: system temp dir.
    #[arg(long)]
    pub profile_root: Option<PathBuf>,

    /// User agent for direct HTTP downloads.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Hide progress bars.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Print the final summary as JSON.
    #[arg(long)]
    pub json: bool,
}
