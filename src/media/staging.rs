//! Write-then-rename helpers so a failed stage never leaves a half-written
//! file where the next stage will read it.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// `dir/name.partial.ext` for `dir/name.ext`.
///
/// The real extension is kept last so ffmpeg still picks the right muxer.
pub fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    target.with_file_name(name)
}

/// Move a finished staging file into place
pub fn commit(staging: &Path, target: &Path) -> Result<()> {
    std::fs::rename(staging, target)?;
    debug!("Committed {:?}", target);
    Ok(())
}

/// Drop a staging file left by a failed run, if any
pub fn discard(staging: &Path) {
    if staging.exists() {
        if let Err(e) = std::fs::remove_file(staging) {
            warn!("Could not remove partial file {:?}: {}", staging, e);
        }
    }
}

/// Make sure `dir` exists and, when `clean` is set, that it is empty
pub fn prepare_dir(dir: &Path, clean: bool) -> Result<()> {
    if clean && dir.exists() {
        debug!("Clearing stale outputs in {:?}", dir);
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Remove whichever of `files` exist. Returns how many.
pub fn remove_stale_files(files: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for file in files {
        if file.is_file() {
            std::fs::remove_file(file)?;
            debug!("Removed stale {:?}", file);
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove `batch_*.mp4` segments left by a previous run. Returns how many.
pub fn remove_stale_segments(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("batch_") && n.ends_with(".mp4"))
            .unwrap_or(false);
        if is_segment && path.is_file() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
