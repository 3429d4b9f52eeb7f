//! End-of-run summary and the human-readable failure log.

use anyhow::{Context, Result};
use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::utils::Colors;
use crate::utils::config::{PackagePaths, SUMMARY_RULE_WIDTH};
use crate::{BatchReport, RetryUpdate, Tally};

/// Render the tally the way it is printed at the end of every run.
pub fn render_summary(tally: &Tally) -> String {
    let rule = "=".repeat(SUMMARY_RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "\n{rule}\nDOWNLOAD SUMMARY\n{rule}");
    let _ = writeln!(out, "Total items:     {}", tally.total);
    let _ = writeln!(
        out,
        "{}",
        Colors::colorize(Colors::COMPLETED, &format!("Downloaded:      {}", tally.completed))
    );
    let _ = writeln!(
        out,
        "{}",
        Colors::colorize(Colors::SKIPPED, &format!("Skipped:         {}", tally.skipped))
    );
    let _ = writeln!(
        out,
        "{}",
        Colors::colorize(Colors::FAILED, &format!("Failed:          {}", tally.failed.len()))
    );
    let _ = writeln!(out, "{rule}");
    if !tally.failed.is_empty() {
        let _ = writeln!(out, "\nFAILED DOWNLOADS:");
        for item in &tally.failed {
            let _ = writeln!(
                out,
                "  Key: {}\n  URL: {}\n  Error: {}\n",
                item.key, item.locator, item.reason
            );
        }
    }
    out
}

pub fn print_summary(report: &BatchReport) {
    println!("{}", render_summary(&report.tally));
    if let Some(log) = &report.failure_log {
        println!("Failed downloads logged to: {}", log.display());
    }
    match &report.retry {
        RetryUpdate::Written(p) => println!("Retry input written to: {}", p.display()),
        RetryUpdate::Rewritten(p) => println!("Retry input updated: {}", p.display()),
        RetryUpdate::Deleted(p) => println!("Retry input cleared: {}", p.display()),
        RetryUpdate::Failed(e) => println!("Retry input not updated: {}", e),
        RetryUpdate::Untouched => {}
    }
}

pub fn print_json_summary(report: &BatchReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("serialize summary")?
    );
    Ok(())
}

/// Write `failed_downloads_YYYYmmdd_HHMMSS.txt` into `output_dir`. No failures: no file.
pub fn write_failure_log(tally: &Tally, output_dir: &Path) -> Result<Option<PathBuf>> {
    if tally.failed.is_empty() {
        return Ok(None);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = output_dir.join(PackagePaths::get().failure_log_filename(&stamp));
    let mut body = format!("FAILED DOWNLOADS\n{}\n\n", "=".repeat(SUMMARY_RULE_WIDTH));
    for item in &tally.failed {
        let _ = write!(
            body,
            "Key: {}\nURL: {}\nError: {}\n\n",
            item.key, item.locator, item.reason
        );
    }
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(Some(path))
}
