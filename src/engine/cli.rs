//! CLI command handler: build options, load the batch, run it, print the summary.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::BatchOpts;
use crate::batch::run_batch;
use crate::engine::arg_parser::Cli;
use crate::engine::report::{print_json_summary, print_summary};
use crate::fetch::{ArtifactFetcher, CommandFetcher, HttpFetcher};
use crate::input::load_batch;
use crate::utils::dropgrab_toml::{apply_file_to_opts, load_dropgrab_toml};
use crate::utils::{apply_env_to_opts, load_dotenv, setup_logging};

fn input_dir(cli: &Cli) -> &Path {
    cli.input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// Defaults → `.dropgrab.toml` → env / `.env` → CLI flags.
fn setup_opts(cli: &Cli) -> BatchOpts {
    let mut opts = BatchOpts::default();
    let dir = input_dir(cli);
    if let Some(file) = load_dropgrab_toml(dir) {
        apply_file_to_opts(&file, &mut opts);
    }
    load_dotenv(dir);
    apply_env_to_opts(&mut opts);

    opts.output_dir = cli.output_dir.clone();
    if let Some(t) = cli.threads {
        opts.concurrency = usize::from(t);
    }
    if let Some(ref c) = cli.key_column {
        opts.schema.key_column = c.clone();
    }
    if let Some(ref c) = cli.locator_column {
        opts.schema.locator_column = c.clone();
    }
    if let Some(secs) = cli.timeout {
        opts.fetch_timeout = Duration::from_secs(secs);
    }
    if let Some(ref cmd) = cli.fetch_cmd {
        opts.fetch_cmd = Some(cmd.clone());
    }
    if let Some(ref p) = cli.profile_root {
        opts.profile_root = p.clone();
    }
    if let Some(ref ua) = cli.user_agent {
        opts.user_agent = ua.clone();
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    opts.concurrency = opts.concurrency.max(1);
    opts.json_summary = cli.json;
    opts.show_progress = !cli.quiet && !cli.json;
    opts
}

/// Pick the fetcher: an external automation command when configured, else direct HTTP.
pub fn build_fetcher(opts: &BatchOpts) -> Result<Box<dyn ArtifactFetcher>> {
    match &opts.fetch_cmd {
        Some(template) => {
            debug!("Using fetch command: {}", template);
            let f = CommandFetcher::from_template(template, opts.fetch_timeout, opts.poll_interval)?;
            Ok(Box::new(f))
        }
        None => {
            debug!("Using direct HTTP fetcher");
            let f = HttpFetcher::new(
                &opts.user_agent,
                opts.page_timeout,
                opts.fetch_timeout,
                opts.poll_interval,
            )
            .context("build HTTP client")?;
            Ok(Box::new(f))
        }
    }
}

/// Run one batch. Input and configuration problems are fatal; item failures are reported.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli);
    setup_logging(opts.verbose);

    let batch = load_batch(&cli.input, &opts.schema)?;
    if batch.is_retry_set() {
        info!("Retry run: {}", batch.path.display());
    }
    let fetcher = build_fetcher(&opts)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        cancel_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let report = run_batch(&batch, &opts, &fetcher, Some(cancel.as_ref()))?;
    if cancel.load(Ordering::Relaxed) {
        warn!("Interrupted: items not started were recorded as failed for retry");
    }
    if opts.json_summary {
        print_json_summary(&report)?;
    } else {
        print_summary(&report);
    }
    Ok(())
}
