//! Dropgrab CLI: download one file per input row; failed rows land in a retry file.

use anyhow::Result;
use clap::Parser;
use dropgrab::engine::arg_parser::Cli;
use dropgrab::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
