// ============================================================================
// src/cmd/prepare.rs – Fresh partition label plus BIOS-boot and EFI partitions
// ============================================================================

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::cmd::preflight::{check_target, confirm_destructive};
use crate::cmd::{Invocation, Session, Tool};
use crate::device::{BootFilesystem, DeviceRef, PartitionSpec, PartitionTable, BIOS_BOOT, EFI_SYSTEM};
use crate::error::BootError;

/// Sectors zeroed at each end of the device (1 MiB of 512-byte sectors).
/// Covers the primary GPT at the head and the backup GPT at the tail.
pub const WIPE_SECTORS: u64 = 2048;

#[derive(Debug, Clone, Copy)]
pub struct PrepareOptions {
    pub table: PartitionTable,
    pub filesystem: BootFilesystem,
    /// Save head and tail regions before zeroing them.
    pub backup: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            table: PartitionTable::Gpt,
            filesystem: BootFilesystem::Ext4,
            backup: true,
        }
    }
}

/// `create-boot-device`: preflight, confirm, then lay down the label and the
/// BIOS-boot/EFI partitions.
pub fn run(session: &Session, device: &DeviceRef, opts: &PrepareOptions) -> Result<()> {
    session.ui.phase(&format!(
        "installing {}/grub_bios/efi on boot device: {} ({})",
        opts.table, device, opts.filesystem
    ));
    check_target(session.probe, device)?;
    confirm_destructive(session, device, "repartition")?;
    create_boot_device(session, device, opts)
}

/// The ordered steps. Callers must have passed preflight and confirmation.
pub fn create_boot_device(session: &Session, device: &DeviceRef, opts: &PrepareOptions) -> Result<()> {
    match opts.table {
        PartitionTable::Gpt => {
            destroy_head_and_tail(session, device, opts.backup)?;
            write_label(session, device, opts.table)?;
        }
    }

    make_partition(session, device, &BIOS_BOOT, "minimal")?;
    make_partition(session, device, &EFI_SYSTEM, "minimal")?;
    session.settle_udev();

    let esp = EFI_SYSTEM.node(device);
    session
        .run(
            Invocation::tool(Tool::MkfsVfat)
                .args(["-F", "16", "-n", EFI_SYSTEM.name])
                .path(&esp),
        )
        .with_context(|| format!("format EFI system partition {}", esp.display()))?;

    session.ui.success(&format!(
        "{device}: {} label with bios_grub and EFI partitions written.",
        opts.table
    ));
    Ok(())
}

/// Zero the first and last [`WIPE_SECTORS`] of the device so no stale
/// primary or backup partition header survives.
pub fn destroy_head_and_tail(session: &Session, device: &DeviceRef, backup: bool) -> Result<()> {
    let out = session.run(
        Invocation::tool(Tool::Blockdev)
            .arg("--getsz")
            .path(device.path())
            .probe(),
    )?;
    let sectors: u64 = out
        .stdout
        .trim()
        .parse()
        .map_err(|_| BootError::UnexpectedProbeOutput {
            program: "blockdev",
            output: out.stdout.clone(),
        })?;
    if sectors < 2 * WIPE_SECTORS {
        return Err(anyhow!(
            "{device} has only {sectors} sectors; too small for a boot device"
        ));
    }
    let tail = sectors - WIPE_SECTORS;

    if backup {
        backup_regions(session, device, tail)?;
    }

    for (region, seek) in [("head", 0), ("tail", tail)] {
        info!(%device, region, seek, "zeroing {WIPE_SECTORS} sectors");
        session
            .run(
                Invocation::tool(Tool::Dd)
                    .arg("if=/dev/zero")
                    .arg(format!("of={}", device.path().display()))
                    .arg("bs=512")
                    .arg(format!("count={WIPE_SECTORS}"))
                    .arg(format!("seek={seek}"))
                    .args(["conv=fsync", "status=none"]),
            )
            .with_context(|| format!("zero {region} of {device}"))?;
    }
    Ok(())
}

fn backup_regions(session: &Session, device: &DeviceRef, tail: u64) -> Result<()> {
    let dir = &session.config.paths.backup_dir;
    if !session.ctx.dry_run {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    for (region, skip) in [("head", 0), ("tail", tail)] {
        let target = dir.join(format!("{}-{stamp}.{region}.img", device.name()));
        copy_region(session, device.path(), &target, skip)?;
        session
            .ui
            .note(&format!("{region} of {device} saved to {}", target.display()));
    }
    Ok(())
}

fn copy_region(session: &Session, device: &Path, target: &Path, skip: u64) -> Result<()> {
    session
        .run(
            Invocation::tool(Tool::Dd)
                .arg(format!("if={}", device.display()))
                .arg(format!("of={}", target.display()))
                .arg("bs=512")
                .arg(format!("count={WIPE_SECTORS}"))
                .arg(format!("skip={skip}"))
                .arg("status=none"),
        )
        .with_context(|| format!("back up {} to {}", device.display(), target.display()))?;
    Ok(())
}

pub fn write_label(session: &Session, device: &DeviceRef, table: PartitionTable) -> Result<()> {
    session
        .run(
            Invocation::tool(Tool::Parted)
                .arg("--script")
                .path(device.path())
                .args(["--", "mklabel", table.parted_label()]),
        )
        .with_context(|| format!("write {table} label on {device}"))?;
    Ok(())
}

/// Create, name and flag one partition. `align` is parted's alignment mode;
/// the small fixed-sector partitions need `minimal`.
pub fn make_partition(
    session: &Session,
    device: &DeviceRef,
    spec: &PartitionSpec,
    align: &str,
) -> Result<()> {
    let number = spec.number.to_string();
    session
        .run(
            Invocation::tool(Tool::Parted)
                .args(["-a", align, "--script"])
                .path(device.path())
                .args(["--", "mkpart", "primary", spec.start, spec.end]),
        )
        .with_context(|| format!("create partition {number} on {device}"))?;
    session.run(
        Invocation::tool(Tool::Parted)
            .arg("--script")
            .path(device.path())
            .args(["--", "name", number.as_str(), spec.name]),
    )?;
    if let Some(flag) = spec.flag {
        session.run(
            Invocation::tool(Tool::Parted)
                .arg("--script")
                .path(device.path())
                .args(["--", "set", number.as_str(), flag, "on"]),
        )?;
    }
    info!(%device, number = spec.number, start = spec.start, end = spec.end, "partition created");
    Ok(())
}
