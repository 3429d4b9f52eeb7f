//! Delimited input batches: load work items, and read/write records with the same shape.

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::engine::tools::is_safe_key;
use crate::utils::config::InputConsts;
use crate::utils::{rename_temp_to_final, temp_path_for};
use crate::{InputSchema, Row, WorkItem};

/// A loaded input file: its items plus what is needed to write rows back in the same shape.
#[derive(Clone, Debug)]
pub struct InputBatch {
    pub path: PathBuf,
    pub delimiter: u8,
    pub headers: Vec<String>,
    pub key_idx: usize,
    pub locator_idx: usize,
    pub items: Vec<WorkItem>,
    /// Rows dropped for a missing or unusable key/locator.
    pub dropped: usize,
}

impl InputBatch {
    /// True when this input is itself a persisted retry set.
    pub fn is_retry_set(&self) -> bool {
        is_retry_path(&self.path)
    }

    /// Where this batch's retry set lives: next to the input, `{stem}_retry.{ext}`. A retry set is
    /// its own retry location.
    pub fn retry_path(&self) -> PathBuf {
        retry_path_for(&self.path)
    }
}

pub fn is_retry_path(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with(InputConsts::RETRY_SUFFIX))
        .unwrap_or(false)
}

pub fn retry_path_for(input: &Path) -> PathBuf {
    if is_retry_path(input) {
        return input.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{}.{ext}", InputConsts::RETRY_SUFFIX),
        None => format!("{stem}{}", InputConsts::RETRY_SUFFIX),
    };
    input.parent().unwrap_or(Path::new(".")).join(name)
}

/// Delimiter from the file extension. Spreadsheets and unknown extensions are rejected.
pub fn delimiter_for(path: &Path) -> Result<u8> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => Ok(b','),
        "tsv" | "tab" => Ok(b'\t'),
        "xlsx" | "xls" => bail!(
            "{}: spreadsheet input is not read directly; export the sheet to CSV",
            path.display()
        ),
        _ => bail!("{}: input must be a .csv or .tsv file", path.display()),
    }
}

/// Find `name` in `headers`: exact first, then trimmed and case-insensitive.
pub fn column_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name).or_else(|| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
    })
}

/// Read every record of a delimited file as-is: (headers, rows).
pub fn read_rows(path: &Path, delimiter: u8) -> Result<(Vec<String>, Vec<Row>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open input {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("read record {} of {}", line + 1, path.display()))?;
        rows.push(Row::new(record.iter()));
    }
    Ok((headers, rows))
}

/// Write `headers` and `rows` to `path` via a temp sibling and rename.
pub fn write_rows<'a>(
    path: &Path,
    delimiter: u8,
    headers: &[String],
    rows: impl IntoIterator<Item = &'a Row>,
) -> Result<()> {
    let temp = temp_path_for(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(&temp)
            .with_context(|| format!("create {}", temp.display()))?;
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(&row.values)?;
        }
        writer
            .flush()
            .with_context(|| format!("flush {}", temp.display()))?;
    }
    rename_temp_to_final(&temp, path)
}

/// Load `path` as a batch of work items. Fails before any scheduling when the file cannot be
/// read or a required column is missing.
pub fn load_batch(path: &Path, schema: &InputSchema) -> Result<InputBatch> {
    if !path.is_file() {
        bail!("input file not found: {}", path.display());
    }
    let delimiter = delimiter_for(path)?;
    let (headers, rows) = read_rows(path, delimiter)?;

    let missing: Vec<&str> = [&schema.key_column, &schema.locator_column]
        .into_iter()
        .filter(|c| column_index(&headers, c).is_none())
        .map(String::as_str)
        .collect();
    let (Some(key_idx), Some(locator_idx)) = (
        column_index(&headers, &schema.key_column),
        column_index(&headers, &schema.locator_column),
    ) else {
        bail!(
            "{}: missing required column(s) {}; found columns: {}",
            path.display(),
            missing.join(", "),
            headers.join(", ")
        );
    };

    let mut items = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        let key = row.get(key_idx).trim().to_string();
        let locator = row.get(locator_idx).trim().to_string();
        if key.is_empty() || locator.is_empty() {
            dropped += 1;
            continue;
        }
        if !is_safe_key(&key) {
            warn!("Dropping row with unusable key {:?}", key);
            dropped += 1;
            continue;
        }
        items.push(WorkItem {
            index: items.len(),
            key,
            locator,
            row,
        });
    }
    if dropped > 0 {
        debug!("Dropped {} rows with missing key or locator", dropped);
    }

    Ok(InputBatch {
        path: path.to_path_buf(),
        delimiter,
        headers,
        key_idx,
        locator_idx,
        items,
        dropped,
    })
}
