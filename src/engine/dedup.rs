//! Output naming and the already-downloaded check.
//!
//! [`find_existing`] and [`output_path_for`] both key on the file stem, so a key that is skipped
//! in one run can never also be completed in the same run.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Final output path for `key` given the produced file's extension (without the dot).
pub fn output_path_for(output_dir: &Path, key: &str, extension: Option<&OsStr>) -> PathBuf {
    let mut name = key.to_string();
    if let Some(ext) = extension.and_then(OsStr::to_str).filter(|e| !e.is_empty()) {
        name.push('.');
        name.push_str(ext);
    }
    output_dir.join(name)
}

/// True when `path`'s stem (extension stripped) equals `key`, case-sensitive. An extensionless
/// output for a dotted key (`A.B`) is matched by its full name.
pub fn stem_matches(path: &Path, key: &str) -> bool {
    path.file_stem().and_then(OsStr::to_str) == Some(key)
        || path.file_name().and_then(OsStr::to_str) == Some(key)
}

/// First regular file directly in `output_dir` whose stem equals `key`. A missing directory
/// means nothing exists yet.
pub fn find_existing(output_dir: &Path, key: &str) -> Option<PathBuf> {
    if !output_dir.is_dir() {
        return None;
    }
    WalkDir::new(output_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| stem_matches(p, key))
}
