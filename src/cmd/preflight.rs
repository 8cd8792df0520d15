// ============================================================================
// src/cmd/preflight.rs – Target validation and the confirmation gate
// ============================================================================

use anyhow::Result;
use tracing::{debug, info};

use crate::cmd::Session;
use crate::device::DeviceRef;
use crate::error::BootError;
use crate::system::SystemProbe;

/// Refuse anything but a whole, unmounted block device. No side effects.
pub fn check_target(probe: &dyn SystemProbe, device: &DeviceRef) -> Result<()> {
    if probe.is_partition(device) {
        return Err(BootError::InvalidTarget(device.path().to_path_buf()).into());
    }
    if !probe.is_block_device(device.path()) {
        return Err(BootError::NotABlockDevice(device.path().to_path_buf()).into());
    }
    let busy = probe.busy_mounts(device)?;
    if !busy.is_empty() {
        return Err(BootError::DeviceBusy {
            device: device.path().to_path_buf(),
            mountpoints: busy,
        }
        .into());
    }
    debug!(%device, "target passed preflight");
    Ok(())
}

pub fn ensure_root(probe: &dyn SystemProbe, action: &'static str) -> Result<()> {
    if !probe.is_root() {
        return Err(BootError::PermissionDenied(action).into());
    }
    Ok(())
}

/// Ask before destroying data on `device`, unless `--force` was given.
pub fn confirm_destructive(session: &Session, device: &DeviceRef, action: &str) -> Result<()> {
    if session.ctx.force {
        debug!(%device, "--force given; skipping confirmation");
        return Ok(());
    }
    session.ui.warn(&format!(
        "About to {action} on {device}. All data on it will be erased!"
    ));
    if session
        .prompter
        .confirm(&format!("Proceed with {device}?"))?
    {
        info!(%device, action, "operator confirmed");
        Ok(())
    } else {
        Err(BootError::UserAborted(device.path().to_path_buf()).into())
    }
}

/// `check-device`: run the preflight on its own.
pub fn run(session: &Session, device: &DeviceRef) -> Result<()> {
    check_target(session.probe, device)?;
    session
        .ui
        .success(&format!("{device} is a whole, unmounted block device."));
    Ok(())
}
