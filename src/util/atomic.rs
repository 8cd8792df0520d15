// ============================================================================
// src/util/atomic.rs – Durable atomic replacement of system files
// ============================================================================

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{symlink, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Return the parent directory path or error with context.
fn parent_dir(path: &Path) -> Result<PathBuf> {
    path.parent()
        .map(|p| p.to_path_buf())
        .context("Target path has no parent directory")
}

/// Fsync a directory to persist metadata (like rename).
fn fsync_dir(dir: &Path) -> Result<()> {
    let f = File::open(dir).with_context(|| format!("Open dir for fsync: {dir:?}"))?;
    f.sync_all()
        .with_context(|| format!("Fsync dir failed: {dir:?}"))?;
    Ok(())
}

/// Reject writes if target is a symlink (avoid TOCTOU surprises at the destination).
fn reject_symlink_target(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.file_type().is_symlink() {
            bail!("Refusing to write to symlink: {}", path.display());
        }
    }
    Ok(())
}

/// Unused sibling name for a temporary file next to `path`.
fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .context("Target path missing file name")?;
    let dir = parent_dir(path)?;
    for _ in 0..8 {
        let mut candidate = OsString::from(".");
        candidate.push(&name);
        candidate.push(format!(".tmp-{}", nanoid::nanoid!(8)));
        let tmp = dir.join(candidate);
        if fs::symlink_metadata(&tmp).is_err() {
            return Ok(tmp);
        }
    }
    bail!("Could not pick a temporary name next to {}", path.display())
}

/// Core atomic write: writes bytes to a temp file in the same directory,
/// fsyncs the file, renames into place, then fsyncs the parent directory.
/// Applies exact POSIX mode (ignores umask).
pub fn atomic_write_bytes(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    reject_symlink_target(path)?;

    let dir = parent_dir(path)?;
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Create parent directory failed: {dir:?}"))?;
    }

    let tmp = temp_sibling(path)?;
    let mut f = OpenOptions::new()
        .create_new(true)
        .write(true)
        .mode(mode)
        .open(&tmp)
        .with_context(|| format!("Open temp file failed: {tmp:?}"))?;

    let written = f
        .write_all(bytes)
        .context("Write to temp file failed")
        .and_then(|_| f.sync_all().context("Fsync temp file failed"));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "Atomic rename failed ({} -> {})",
            tmp.display(),
            path.display()
        )
    })?;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Set permissions failed for {}", path.display()))?;

    fsync_dir(&dir)?;

    Ok(())
}

/// Point `link` at `target`, replacing whatever is there in one rename.
pub fn atomic_symlink(target: &Path, link: &Path) -> Result<()> {
    let tmp = temp_sibling(link)?;
    symlink(target, &tmp).with_context(|| format!("Create symlink failed: {tmp:?}"))?;
    if let Err(err) = fs::rename(&tmp, link) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| {
            format!("Replace {} with symlink to {}", link.display(), target.display())
        });
    }
    fsync_dir(&parent_dir(link)?)?;
    Ok(())
}
