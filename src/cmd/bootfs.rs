// ============================================================================
// src/cmd/bootfs.rs – Partition 3 ("bootfs") and its ext4 filesystem
// ============================================================================

use anyhow::{Context, Result};
use tracing::info;

use crate::cmd::prepare::make_partition;
use crate::cmd::preflight::{check_target, confirm_destructive};
use crate::cmd::{Invocation, Session, Tool};
use crate::device::{DeviceRef, BOOT_FS};

/// `write-boot-partition`: re-validate the device, then add and format `/boot`.
pub fn run(session: &Session, device: &DeviceRef) -> Result<()> {
    session
        .ui
        .phase(&format!("writing boot partition on {device}"));
    check_target(session.probe, device)?;
    confirm_destructive(session, device, "write a boot partition")?;
    write_boot_partition(session, device)
}

pub fn write_boot_partition(session: &Session, device: &DeviceRef) -> Result<()> {
    make_partition(session, device, &BOOT_FS, "optimal")?;
    session.settle_udev();

    let node = BOOT_FS.node(device);
    info!(partition = %node.display(), "formatting ext4");
    session
        .run(Invocation::tool(Tool::MkfsExt4).path(&node))
        .with_context(|| format!("format {} as ext4", node.display()))?;

    session
        .ui
        .success(&format!("{} formatted ext4 ({}).", node.display(), BOOT_FS.name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootError;
    use crate::testing::{Harness, DISK};
    use std::path::Path;

    #[test]
    fn partition_three_is_created_named_and_formatted() {
        let harness = Harness::new();
        run(&harness.session(true), &harness.disk()).unwrap();

        let host = &harness.host;
        let parted: Vec<String> = host
            .calls_to(Tool::Parted)
            .iter()
            .map(|i| i.args.join(" "))
            .collect();
        assert_eq!(
            parted,
            vec![
                format!("-a optimal --script {DISK} -- mkpart primary 100MiB 400MiB"),
                format!("--script {DISK} -- name 3 bootfs"),
            ]
        );
        let mkfs = host.calls_to(Tool::MkfsExt4);
        assert_eq!(mkfs.len(), 1);
        assert_eq!(mkfs[0].args, vec!["/dev/sdx3".to_string()]);

        let settle = host.position(|i| i.is_tool(Tool::Udevadm)).unwrap();
        let format = host.position(|i| i.is_tool(Tool::MkfsExt4)).unwrap();
        assert!(settle < format);
    }

    #[test]
    fn mounted_device_is_refused() {
        let harness = Harness::new();
        harness.host.mount("/dev/sdx2", Path::new("/boot/efi"));
        let err = run(&harness.session(true), &harness.disk()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootError>(),
            Some(BootError::DeviceBusy { .. })
        ));
        assert!(harness.host.calls().is_empty());
    }

    #[test]
    fn partition_path_is_refused() {
        let harness = Harness::new();
        harness.host.add_block_device("/dev/sdx3");
        let err = run(&harness.session(true), &DeviceRef::new("/dev/sdx3")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootError>(),
            Some(BootError::InvalidTarget(_))
        ));
        assert!(harness.host.calls().is_empty());
    }

    #[test]
    fn formatter_failure_propagates_its_status() {
        let harness = Harness::new();
        harness.host.fail(Tool::MkfsExt4, 4);
        let err = run(&harness.session(true), &harness.disk()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootError>(),
            Some(BootError::DelegatedCommandFailure { status: 4, .. })
        ));
    }
}
