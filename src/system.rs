// ============================================================================
// src/system.rs – Read-only probes of the live host (block devices, mounts)
// ============================================================================

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cmd::base::{CommandRunner, Invocation, Tool};
use crate::device::DeviceRef;
use crate::mount::MountTable;

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Questions the workflows ask about the host before touching it.
pub trait SystemProbe {
    fn is_block_device(&self, path: &Path) -> bool;

    fn is_partition(&self, device: &DeviceRef) -> bool;

    fn mount_table(&self) -> Result<MountTable>;

    fn is_root(&self) -> bool;

    fn is_mounted(&self, path: &Path) -> Result<bool> {
        Ok(self.mount_table()?.is_mounted(path))
    }

    /// Mountpoints that keep `device` busy: the device, its partitions, or
    /// anything stacked on top of them.
    fn busy_mounts(&self, device: &DeviceRef) -> Result<Vec<String>> {
        Ok(self.mount_table()?.mounts_of(device))
    }
}

/// Probes backed by the kernel, `/proc` and `lsblk`.
pub struct LiveSystem<'a> {
    runner: &'a dyn CommandRunner,
    mounts_path: PathBuf,
}

impl<'a> LiveSystem<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            mounts_path: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Read mounts from `path` instead of `/proc/self/mounts`.
    #[cfg(test)]
    pub fn with_mounts_path<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            mounts_path: path.into(),
            ..self
        }
    }

    fn lsblk(&self, device: &DeviceRef, columns: &str, nodeps: bool) -> Result<Vec<LsblkDevice>> {
        let mut inv = Invocation::tool(Tool::Lsblk).args(["-J", "-o", columns]);
        if nodeps {
            inv = inv.arg("-d");
        }
        let out = self.runner.execute(&inv.path(device.path()).probe())?;
        if out.status != 0 {
            return Err(anyhow!(
                "lsblk {} failed: {}",
                device,
                out.stderr.trim()
            ));
        }
        parse_lsblk(&out.stdout)
    }
}

impl SystemProbe for LiveSystem<'_> {
    fn is_block_device(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|meta| meta.file_type().is_block_device())
            .unwrap_or(false)
    }

    fn is_partition(&self, device: &DeviceRef) -> bool {
        match self.lsblk(device, "NAME,TYPE", true) {
            Ok(devices) => devices
                .first()
                .and_then(|d| d.kind.as_deref())
                .map(|kind| kind == "part")
                .unwrap_or_else(|| device.looks_like_partition()),
            Err(err) => {
                debug!("lsblk type lookup failed ({err:#}); using name heuristic");
                device.looks_like_partition()
            }
        }
    }

    fn mount_table(&self) -> Result<MountTable> {
        MountTable::from_path(&self.mounts_path)
    }

    fn is_root(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn busy_mounts(&self, device: &DeviceRef) -> Result<Vec<String>> {
        let mut busy = self.mount_table()?.mounts_of(device);
        match self.lsblk(device, "NAME,TYPE,MOUNTPOINT", false) {
            Ok(tree) => {
                for mp in collect_mountpoints(&tree) {
                    if !busy.contains(&mp) {
                        busy.push(mp);
                    }
                }
            }
            Err(err) => warn!("lsblk holder scan failed for {device}: {err:#}"),
        }
        Ok(busy)
    }
}

/// JSON struct for parsing `lsblk -J`
#[derive(Debug, Deserialize, Clone)]
pub struct LsblkDevice {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub mountpoint: Option<String>,

    #[serde(default)]
    pub mountpoints: Option<Vec<Option<String>>>,

    #[serde(default)]
    pub children: Option<Vec<LsblkDevice>>,
}

#[derive(Debug, Deserialize)]
struct LsblkReport {
    blockdevices: Vec<LsblkDevice>,
}

pub fn parse_lsblk(json: &str) -> Result<Vec<LsblkDevice>> {
    let report: LsblkReport = serde_json::from_str(json).context("failed to parse lsblk JSON")?;
    Ok(report.blockdevices)
}

/// Flatten devices recursively
fn flatten_devices(devs: &[LsblkDevice], list: &mut Vec<LsblkDevice>) {
    for d in devs {
        list.push(d.clone());
        if let Some(ch) = &d.children {
            flatten_devices(ch, list);
        }
    }
}

/// Every mountpoint (including `[SWAP]`) anywhere in the device tree.
pub fn collect_mountpoints(devs: &[LsblkDevice]) -> Vec<String> {
    let mut flat = Vec::new();
    flatten_devices(devs, &mut flat);

    let mut out: Vec<String> = Vec::new();
    for d in flat {
        let single = d.mountpoint.into_iter();
        let multi = d.mountpoints.unwrap_or_default().into_iter().flatten();
        for mp in single.chain(multi) {
            if !mp.is_empty() && !out.contains(&mp) {
                out.push(mp);
            }
        }
    }
    out
}
