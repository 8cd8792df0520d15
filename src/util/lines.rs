// ============================================================================
// src/util/lines.rs – Append-if-absent edits of line-oriented config files
// ============================================================================

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info};

use crate::util::atomic::atomic_write_bytes;

const DEFAULT_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Appended,
    AlreadyPresent,
}

/// Make sure `line` appears verbatim in `path`, appending it if not.
///
/// Existing lines are never removed or edited, so an older conflicting
/// directive stays in place next to the new one. A missing file is created.
pub fn ensure_line(path: &Path, line: &str, dry_run: bool) -> Result<LineOutcome> {
    let wanted = line.trim_end_matches(['\n', '\r']);

    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };

    if existing.lines().any(|l| l == wanted) {
        debug!(path = %path.display(), line = wanted, "line already present");
        return Ok(LineOutcome::AlreadyPresent);
    }

    if dry_run {
        println!("[dry-run] append to {}: {}", path.display(), wanted);
        return Ok(LineOutcome::Appended);
    }

    let mut next = existing;
    if !next.is_empty() && !next.ends_with('\n') {
        next.push('\n');
    }
    next.push_str(wanted);
    next.push('\n');

    let mode = fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(DEFAULT_MODE);
    atomic_write_bytes(path, next.as_bytes(), mode)
        .with_context(|| format!("append line to {}", path.display()))?;
    info!(path = %path.display(), line = wanted, "appended line");
    Ok(LineOutcome::Appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_append_is_a_no_op() {
        let dir = tempdir().unwrap();
        let grub = dir.path().join("grub");
        fs::write(&grub, "GRUB_TIMEOUT=5\n").unwrap();
        let line = "GRUB_PRELOAD_MODULES=\"part_gpt part_msdos\"\n";

        assert_eq!(ensure_line(&grub, line, false).unwrap(), LineOutcome::Appended);
        assert_eq!(
            ensure_line(&grub, line, false).unwrap(),
            LineOutcome::AlreadyPresent
        );

        let content = fs::read_to_string(&grub).unwrap();
        assert_eq!(content.matches("GRUB_PRELOAD_MODULES").count(), 1);
        assert!(content.starts_with("GRUB_TIMEOUT=5\n"));
    }

    #[test]
    fn conflicting_directives_are_left_alone() {
        let dir = tempdir().unwrap();
        let grub = dir.path().join("grub");
        fs::write(&grub, "GRUB_CMDLINE_LINUX=\"quiet\"").unwrap();

        ensure_line(&grub, "GRUB_CMDLINE_LINUX=\"net.ifnames=0\"", false).unwrap();

        assert_eq!(
            fs::read_to_string(&grub).unwrap(),
            "GRUB_CMDLINE_LINUX=\"quiet\"\nGRUB_CMDLINE_LINUX=\"net.ifnames=0\"\n"
        );
    }

    #[test]
    fn missing_file_is_created_and_mode_preserved_otherwise() {
        let dir = tempdir().unwrap();
        let fstab = dir.path().join("fstab");
        ensure_line(&fstab, "PARTUUID=abc\t/\text4\tnoatime\t0\t1", false).unwrap();
        assert_eq!(
            fs::read_to_string(&fstab).unwrap(),
            "PARTUUID=abc\t/\text4\tnoatime\t0\t1\n"
        );

        fs::set_permissions(&fstab, fs::Permissions::from_mode(0o600)).unwrap();
        ensure_line(&fstab, "tmpfs\t/tmp\ttmpfs\tdefaults\t0\t0", false).unwrap();
        let mode = fs::metadata(&fstab).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn dry_run_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let fstab = dir.path().join("fstab");
        fs::write(&fstab, "# static\n").unwrap();
        ensure_line(&fstab, "PARTUUID=abc / ext4 noatime 0 1", true).unwrap();
        assert_eq!(fs::read_to_string(&fstab).unwrap(), "# static\n");
    }
}
