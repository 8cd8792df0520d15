// ============================================================================
// src/device.rs – Block device references and the fixed boot partition layout
// ============================================================================

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::BootError;

/// Disk families whose whole-device names already end in a digit, so their
/// partitions carry a `p` separator (`nvme0n1p2`, `mmcblk0p1`, `loop0p1`).
const NUMBERED_DISKS: &[&str] = &["nvme", "mmcblk", "loop", "nbd", "md", "zram", "rbd", "nullb"];

/// Path to a block device as supplied by the caller. Never mutated; partition
/// nodes are derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    path: PathBuf,
}

impl DeviceRef {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Follow `/dev/disk/by-*` style symlinks so partition naming works on
    /// the kernel name. Paths that do not exist are kept verbatim and fail
    /// the block-special check later.
    pub fn resolve<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::new(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Node of partition `number` on this device.
    pub fn partition(&self, number: u32) -> PathBuf {
        let base = self.path.to_string_lossy();
        if base.ends_with(|c: char| c.is_ascii_digit()) {
            PathBuf::from(format!("{base}p{number}"))
        } else {
            PathBuf::from(format!("{base}{number}"))
        }
    }

    /// Naming heuristic used when the kernel cannot be asked directly.
    pub fn looks_like_partition(&self) -> bool {
        looks_like_partition_name(&self.name())
    }

    /// True when `node` is this device or one of its partition nodes.
    pub fn owns(&self, node: &str) -> bool {
        let base = self.path.to_string_lossy();
        let Some(rest) = node.strip_prefix(base.as_ref()) else {
            return false;
        };
        if rest.is_empty() {
            return true;
        }
        let digits = if base.ends_with(|c: char| c.is_ascii_digit()) {
            match rest.strip_prefix('p') {
                Some(d) => d,
                None => return false,
            }
        } else {
            rest
        };
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn looks_like_partition_name(name: &str) -> bool {
    if !name.ends_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    if name.starts_with("dm-") {
        return false;
    }
    if NUMBERED_DISKS.iter().any(|prefix| name.starts_with(prefix)) {
        let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
        return match stem.strip_suffix('p') {
            Some(disk) => disk.ends_with(|c: char| c.is_ascii_digit()),
            None => false,
        };
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    /// Raw embedding area for GRUB's core image on BIOS systems.
    BiosBoot,
    EfiSystem,
    /// ext4 filesystem mounted at `/boot`.
    BootFs,
}

/// One entry of the boot partition layout. Offsets use parted's unit syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpec {
    pub number: u32,
    pub role: PartitionRole,
    pub start: &'static str,
    pub end: &'static str,
    pub name: &'static str,
    pub flag: Option<&'static str>,
}

pub const BIOS_BOOT: PartitionSpec = PartitionSpec {
    number: 1,
    role: PartitionRole::BiosBoot,
    start: "48s",
    end: "1023s",
    name: "bios_grub",
    flag: Some("bios_grub"),
};

pub const EFI_SYSTEM: PartitionSpec = PartitionSpec {
    number: 2,
    role: PartitionRole::EfiSystem,
    start: "1024s",
    end: "18047s",
    name: "EFI",
    flag: Some("esp"),
};

pub const BOOT_FS: PartitionSpec = PartitionSpec {
    number: 3,
    role: PartitionRole::BootFs,
    start: "100MiB",
    end: "400MiB",
    name: "bootfs",
    flag: None,
};

pub const BOOT_LAYOUT: [PartitionSpec; 3] = [BIOS_BOOT, EFI_SYSTEM, BOOT_FS];

impl PartitionSpec {
    pub fn node(&self, device: &DeviceRef) -> PathBuf {
        device.partition(self.number)
    }

    #[cfg(test)]
    pub fn start_bytes(&self) -> Option<u64> {
        offset_bytes(self.start)
    }

    #[cfg(test)]
    pub fn end_bytes(&self) -> Option<u64> {
        offset_bytes(self.end)
    }
}

/// Convert a parted offset (`48s`, `100MiB`) to bytes, assuming 512-byte
/// logical sectors.
#[cfg(test)]
fn offset_bytes(value: &str) -> Option<u64> {
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (number, unit) = value.split_at(split);
    let number: u64 = number.parse().ok()?;
    let scale = match unit {
        "s" => 512,
        "B" => 1,
        "KiB" => 1 << 10,
        "MiB" => 1 << 20,
        "GiB" => 1 << 30,
        _ => return None,
    };
    number.checked_mul(scale)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionTable {
    #[default]
    Gpt,
}

impl PartitionTable {
    pub fn parted_label(self) -> &'static str {
        match self {
            PartitionTable::Gpt => "gpt",
        }
    }
}

impl FromStr for PartitionTable {
    type Err = BootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt" => Ok(PartitionTable::Gpt),
            other => Err(BootError::UnsupportedPartitionTable(other.to_string())),
        }
    }
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.parted_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootFilesystem {
    #[default]
    Ext4,
}

impl BootFilesystem {
    pub fn name(self) -> &'static str {
        match self {
            BootFilesystem::Ext4 => "ext4",
        }
    }
}

impl FromStr for BootFilesystem {
    type Err = BootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext4" => Ok(BootFilesystem::Ext4),
            other => Err(BootError::UnsupportedFilesystem(other.to_string())),
        }
    }
}

impl fmt::Display for BootFilesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_suffixes_are_detected() {
        for part in [
            "/dev/sda1",
            "/dev/vdb12",
            "/dev/nvme0n1p3",
            "/dev/mmcblk0p1",
            "/dev/loop0p2",
            "/dev/disk/by-id/ata-ST1000-part1",
        ] {
            assert!(DeviceRef::new(part).looks_like_partition(), "{part}");
        }
        for disk in ["/dev/sda", "/dev/nvme0n1", "/dev/mmcblk0", "/dev/loop7", "/dev/dm-0"] {
            assert!(!DeviceRef::new(disk).looks_like_partition(), "{disk}");
        }
    }

    #[test]
    fn partition_nodes_follow_kernel_naming() {
        assert_eq!(DeviceRef::new("/dev/sdx").partition(3), PathBuf::from("/dev/sdx3"));
        assert_eq!(
            DeviceRef::new("/dev/nvme1n1").partition(2),
            PathBuf::from("/dev/nvme1n1p2")
        );
    }

    #[test]
    fn ownership_covers_only_own_partitions() {
        let sda = DeviceRef::new("/dev/sda");
        assert!(sda.owns("/dev/sda"));
        assert!(sda.owns("/dev/sda3"));
        assert!(!sda.owns("/dev/sdab"));
        assert!(!sda.owns("/dev/sdb1"));

        let nvme = DeviceRef::new("/dev/nvme0n1");
        assert!(nvme.owns("/dev/nvme0n1p1"));
        assert!(!nvme.owns("/dev/nvme0n10"));
    }

    #[test]
    fn layout_is_ordered_and_non_overlapping() {
        let mut previous_end = 0;
        for (i, spec) in BOOT_LAYOUT.iter().enumerate() {
            assert_eq!(spec.number as usize, i + 1);
            let start = spec.start_bytes().unwrap();
            let end = spec.end_bytes().unwrap();
            assert!(start > previous_end, "{} overlaps its predecessor", spec.name);
            assert!(end > start);
            previous_end = end;
        }
        assert_eq!(BIOS_BOOT.start_bytes(), Some(48 * 512));
        assert_eq!(BOOT_FS.end_bytes(), Some(400 << 20));
    }

    #[test]
    fn only_gpt_and_ext4_are_accepted() {
        assert_eq!("gpt".parse::<PartitionTable>().unwrap(), PartitionTable::Gpt);
        assert!(matches!(
            "msdos".parse::<PartitionTable>(),
            Err(BootError::UnsupportedPartitionTable(_))
        ));
        assert!("zfs".parse::<BootFilesystem>().is_err());
    }
}
