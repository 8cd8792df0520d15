// ============================================================================
// src/cmd/pipeline.rs – Fresh boot device for the already-running root
// ============================================================================

use anyhow::Result;
use tracing::info;

use crate::cmd::grub::{install_grub, regenerate_config, GrubOptions};
use crate::cmd::mount_boot::mount_boot_partitions;
use crate::cmd::preflight::{check_target, confirm_destructive, ensure_root};
use crate::cmd::prepare::PrepareOptions;
use crate::cmd::{bootfs, hybrid_mbr, kernel, prepare, Session};
use crate::device::{BootFilesystem, DeviceRef, PartitionTable, BOOT_LAYOUT};
use crate::error::BootError;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub table: PartitionTable,
    pub filesystem: BootFilesystem,
    pub skip_uefi: bool,
    pub debug_grub: bool,
    pub compile_kernel: bool,
    /// Implies `compile_kernel`.
    pub configure_kernel: bool,
    pub backup: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            table: PartitionTable::Gpt,
            filesystem: BootFilesystem::Ext4,
            skip_uefi: false,
            debug_grub: false,
            compile_kernel: false,
            configure_kernel: false,
            backup: true,
        }
    }
}

/// `create-boot-device-for-existing-root`
///
/// Every precondition is checked and the operator asked once, up front. The
/// stages then run in a fixed order; the first failure stops the run and
/// leaves earlier stages in place.
pub fn run(session: &Session, device: &DeviceRef, opts: &PipelineOptions) -> Result<()> {
    ensure_root(session.probe, "create a boot device")?;

    let paths = &session.config.paths;
    for mountpoint in [&paths.boot, &paths.efi] {
        if session.probe.is_mounted(mountpoint)? {
            return Err(BootError::AlreadyMounted(mountpoint.clone()).into());
        }
    }
    check_target(session.probe, device)?;

    session.ui.banner(&format!(
        "installing grub on boot device: {device} {} {}",
        opts.table, opts.filesystem
    ));
    confirm_destructive(session, device, "build a boot device")?;

    let session = session.forced();
    info!(%device, "boot device pipeline started");

    prepare::run(
        &session,
        device,
        &PrepareOptions {
            table: opts.table,
            filesystem: opts.filesystem,
            backup: opts.backup,
        },
    )?;
    bootfs::run(&session, device)?;
    hybrid_mbr::run(&session, device)?;
    session.ui.data_panel(
        "Boot device layout",
        &BOOT_LAYOUT
            .iter()
            .map(|p| (p.name, format!("{}  {}..{}", p.node(device).display(), p.start, p.end)))
            .collect::<Vec<_>>(),
    );
    mount_boot_partitions(&session, device)?;
    install_grub(
        &session,
        device,
        &GrubOptions {
            skip_uefi: opts.skip_uefi,
            debug_grub: opts.debug_grub,
        },
    )?;

    if opts.compile_kernel || opts.configure_kernel {
        session
            .ui
            .info("Building the kernel before the final grub.cfg regeneration.");
        kernel::build_and_install(&session, opts.configure_kernel)?;
    }
    regenerate_config(&session, &paths.grub_cfg, true)?;

    session
        .ui
        .success(&format!("{device} is ready to boot the running root filesystem."));
    Ok(())
}
