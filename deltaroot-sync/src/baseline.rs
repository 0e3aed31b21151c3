//! Bundled baseline content.
//!
//! The bundle is read-only. On first run it is copied into external storage
//! as the baseline version, and after every successful sync its files fill
//! any gaps in the new staging directory.

use std::path::Path;

use deltaroot_core::{ContentLayout, Version};

use crate::error::{io_err, SyncError};

/// Copy the bundle to `<storage_root>/<version>/www` unless that directory
/// already exists. Returns `true` when a copy happened.
pub fn install_if_missing(layout: &ContentLayout, version: &Version) -> Result<bool, SyncError> {
    if !version.is_path_safe() {
        tracing::warn!(version = %version, "baseline release is not a usable directory name, serving bundle directly");
        return Ok(false);
    }
    let target = layout.content_dir(version);
    if target.exists() || !layout.bundle_dir.is_dir() {
        return Ok(false);
    }

    // `target` is either absent or complete.
    let staging = target.with_file_name("www.installing");
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| io_err(&staging, e))?;
    }
    let copied = copy_tree(&layout.bundle_dir, &staging, true)?;
    std::fs::rename(&staging, &target).map_err(|e| io_err(&target, e))?;

    tracing::info!(version = %version, files = copied, "installed bundled baseline");
    Ok(true)
}

/// Copy bundle files into `dest` without overwriting anything already there.
/// Returns the number of files copied.
pub fn merge_base_files(bundle_dir: &Path, dest: &Path) -> Result<usize, SyncError> {
    let copied = copy_tree(bundle_dir, dest, false)?;
    tracing::debug!(dest = %dest.display(), files = copied, "merged bundled files");
    Ok(copied)
}

/// Recursive copy of `src` into `dest`.
fn copy_tree(src: &Path, dest: &Path, overwrite: bool) -> Result<usize, SyncError> {
    if !src.is_dir() {
        return Ok(0);
    }
    std::fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;

    let mut copied = 0;
    let entries = std::fs::read_dir(src).map_err(|e| io_err(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| io_err(&from, e))?;

        if file_type.is_dir() {
            copied += copy_tree(&from, &to, overwrite)?;
        } else if overwrite || !to.exists() {
            std::fs::copy(&from, &to).map_err(|e| io_err(&to, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}
