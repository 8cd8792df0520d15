// ============================================================================
// src/cmd/hybrid_mbr.rs – Hybrid MBR overlay on top of the GPT label
// ============================================================================

use anyhow::{Context, Result};
use tracing::info;

use crate::cmd::preflight::ensure_root;
use crate::cmd::{Invocation, Session, Tool};
use crate::device::{DeviceRef, BOOT_FS, EFI_SYSTEM};
use crate::error::BootError;

/// Answers fed to `gdisk` on stdin. Recovery menu, hybrid MBR from GPT
/// partitions 2 and 3 with the protective 0xEE entry first, EFI type for the
/// ESP, bootable Linux type for bootfs, no extra protective entry, write.
pub fn gdisk_answers() -> String {
    let partitions = format!("{} {}", EFI_SYSTEM.number, BOOT_FS.number);
    let mut script = ["r", "h", partitions.as_str(), "Y", "EF", "N", "83", "Y", "N", "w", "Y"].join("\n");
    script.push('\n');
    script
}

/// `make-hybrid-mbr`: root only, block device only. Output is streamed, not parsed.
pub fn run(session: &Session, device: &DeviceRef) -> Result<()> {
    ensure_root(session.probe, "write a hybrid MBR")?;
    if !session.probe.is_block_device(device.path()) {
        return Err(BootError::NotABlockDevice(device.path().to_path_buf()).into());
    }

    session
        .ui
        .phase(&format!("writing hybrid MBR on {device}"));

    let invocation = match &session.config.hybrid_mbr.script {
        Some(script) => Invocation::script(script.clone()).path(device.path()),
        None => Invocation::tool(Tool::Gdisk)
            .path(device.path())
            .stdin(gdisk_answers()),
    };
    info!(%device, program = %invocation.program.name(), "hybridising MBR");
    session
        .run(invocation)
        .with_context(|| format!("write hybrid MBR on {device}"))?;

    session.ui.success(&format!("{device}: hybrid MBR written."));
    Ok(())
}
