//! Dropgrab: batch downloader with isolated worker slots and a self-shrinking retry ledger

pub mod batch;
pub mod engine;
pub mod fetch;
pub mod input;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use batch::run_batch;
pub use fetch::{ArtifactFetcher, ExecutionContext, FetchError, FetchPhase};
pub use input::{InputBatch, load_batch};

/// Result alias used by public dropgrab API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Load `input` with `opts.schema` and run it with `fetcher`. Returns the run's report.
///
/// Fails only when the input cannot be read or validated, or ledger files cannot be written;
/// per-item failures are in [`BatchReport::tally`].
///
/// ```ignore
/// let opts = BatchOpts { output_dir: "out".into(), concurrency: 4, ..Default::default() };
/// let fetcher = dropgrab::fetch::HttpFetcher::new("dropgrab", opts.page_timeout, opts.fetch_timeout, opts.poll_interval)?;
/// let report = dropgrab::download_batch(Path::new("items.csv"), &opts, &fetcher)?;
/// ```
pub fn download_batch<F: ArtifactFetcher + ?Sized>(
    input: &std::path::Path,
    opts: &BatchOpts,
    fetcher: &F,
) -> Result<BatchReport> {
    log::debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    let batch = load_batch(input, &opts.schema)?;
    run_batch(&batch, opts, fetcher, None)
}
