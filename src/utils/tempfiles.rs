use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the temporary sibling path used while rewriting `path`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(env!("CARGO_PKG_NAME"));
    path.parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

pub fn rename_temp_to_final(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "atomic rename temp file to final path ({} -> {})",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Item-scoped scratch directory. Removed on drop, on every exit path including unwinding.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `path` (parents included). Fails with `AlreadyExists` if the directory itself is
    /// already present, since another execution may own it.
    pub fn create(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists()
            && let Err(e) = fs::remove_dir_all(&self.path)
        {
            debug!("could not remove scratch {}: {}", self.path.display(), e);
        }
    }
}
