// ============================================================================
// src/cmd/mount_boot.rs – Mount bootfs at /boot, then the ESP at /boot/efi
// ============================================================================

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::cmd::preflight::ensure_root;
use crate::cmd::{Invocation, Session, Tool};
use crate::device::{DeviceRef, BOOT_FS, EFI_SYSTEM};
use crate::error::BootError;

/// `mount-boot`
pub fn run(session: &Session, device: &DeviceRef) -> Result<()> {
    ensure_root(session.probe, "mount boot partitions")?;
    session
        .ui
        .phase(&format!("mounting boot partitions of {device}"));
    mount_boot_partitions(session, device)
}

/// `/boot` first; the ESP mountpoint lives inside it.
pub fn mount_boot_partitions(session: &Session, device: &DeviceRef) -> Result<()> {
    let paths = &session.config.paths;
    mount_partition(session, &BOOT_FS.node(device), &paths.boot, None)?;

    let parent = paths.efi.starts_with(&paths.boot).then_some(paths.boot.as_path());
    mount_partition(session, &EFI_SYSTEM.node(device), &paths.efi, parent)?;

    session.ui.data_panel(
        "Mounted",
        &[
            ("boot", format!("{} → {}", BOOT_FS.node(device).display(), paths.boot.display())),
            ("efi", format!("{} → {}", EFI_SYSTEM.node(device).display(), paths.efi.display())),
        ],
    );
    Ok(())
}

/// Mount one partition with the before/after checks. `parent` must already
/// be mounted when given.
pub fn mount_partition(
    session: &Session,
    partition: &Path,
    target: &Path,
    parent: Option<&Path>,
) -> Result<()> {
    let dry_run = session.ctx.dry_run;

    if let Some(parent) = parent {
        if !dry_run && !session.probe.is_mounted(parent)? {
            return Err(BootError::MountOrder {
                target: target.to_path_buf(),
                parent: parent.to_path_buf(),
            }
            .into());
        }
    }

    if dry_run {
        println!("[dry-run] mkdir -p {}", target.display());
    } else {
        fs::create_dir_all(target)
            .with_context(|| format!("create mountpoint {}", target.display()))?;
    }

    if session.probe.is_mounted(target)? {
        return Err(BootError::AlreadyMounted(target.to_path_buf()).into());
    }

    info!(partition = %partition.display(), target = %target.display(), "mounting");
    session
        .run(Invocation::tool(Tool::Mount).path(partition).path(target))
        .with_context(|| format!("mount {} on {}", partition.display(), target.display()))?;

    if dry_run {
        return Ok(());
    }
    if !session.probe.is_mounted(target)? {
        return Err(BootError::MountVerificationFailed {
            source_device: partition.to_path_buf(),
            target: target.to_path_buf(),
        }
        .into());
    }
    debug!(target = %target.display(), "mount verified");
    Ok(())
}
