//! Path and file-move utilities

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

/// Move `src` to `dst` without ever replacing an existing `dst`.
///
/// Tries a hard link first (atomic no-clobber on the same filesystem), then falls back to an
/// exclusive create + copy. On error nothing is left at `dst` that this call created.
pub fn move_no_clobber(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => {
            let _ = fs::remove_file(src);
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
        Err(e) => log::debug!("hard link {} failed ({}); copying", dst.display(), e),
    }

    let mut out = OpenOptions::new().write(true).create_new(true).open(dst)?;
    let copied = fs::File::open(src).and_then(|mut input| {
        io::copy(&mut input, &mut out)?;
        out.sync_all()
    });
    drop(out);
    if let Err(e) = copied {
        let _ = fs::remove_file(dst);
        return Err(e);
    }
    let _ = fs::remove_file(src);
    Ok(())
}

/// Keys become file names: reject separators and relative components.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
}
