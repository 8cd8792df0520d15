// ============================================================================
// src/mount.rs – Mount table parsing (`/proc/self/mounts`, `/etc/mtab`)
// ============================================================================

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::device::DeviceRef;

/// One mount line, ignoring the fstab-only dump/pass columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub filesystem: String,
    pub options: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn parse(data: &str) -> Self {
        let entries = data
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_ascii_whitespace();
                Some(MountEntry {
                    device: unescape(fields.next()?),
                    mountpoint: unescape(fields.next()?),
                    filesystem: fields.next()?.to_string(),
                    options: fields.next()?.to_string(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("read mount table {}", path.display()))?;
        Ok(Self::parse(&data))
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn push(&mut self, entry: MountEntry) {
        self.entries.push(entry);
    }

    /// True when something is mounted exactly at `path`.
    pub fn is_mounted(&self, path: &Path) -> bool {
        let owned = path.to_string_lossy();
        let wanted = normalize(&owned);
        self.entries
            .iter()
            .any(|e| normalize(&e.mountpoint) == wanted)
    }

    /// Mountpoints backed by `device` itself or any of its partitions.
    pub fn mounts_of(&self, device: &DeviceRef) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| device.owns(&e.device))
            .map(|e| e.mountpoint.clone())
            .collect()
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Decode the `\ooo` octal escapes the kernel uses for whitespace and
/// backslashes in mount fields.
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let octal = &bytes[i + 1..i + 4];
            if octal.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = octal.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
/dev/nvme0n1p4 / ext4 rw,noatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sdb3 /boot ext4 rw,relatime 0 0
/dev/sdb2 /boot/efi vfat rw,relatime,fmask=0022 0 0
/dev/sdc1 /media/usb\\040stick vfat rw 0 0
";

    #[test]
    fn parses_and_unescapes_entries() {
        let table = MountTable::parse(MOUNTS);
        assert_eq!(table.entries().len(), 5);
        assert_eq!(table.entries()[4].mountpoint, "/media/usb stick");
        assert_eq!(table.entries()[3].filesystem, "vfat");
    }

    #[test]
    fn mountpoint_lookup_ignores_trailing_slash() {
        let table = MountTable::parse(MOUNTS);
        assert!(table.is_mounted(Path::new("/boot/")));
        assert!(table.is_mounted(Path::new("/boot/efi")));
        assert!(table.is_mounted(Path::new("/")));
        assert!(!table.is_mounted(Path::new("/boot/grub")));
    }

    #[test]
    fn device_mounts_include_partitions() {
        let table = MountTable::parse(MOUNTS);
        assert_eq!(
            table.mounts_of(&DeviceRef::new("/dev/sdb")),
            vec!["/boot".to_string(), "/boot/efi".to_string()]
        );
        assert!(table.mounts_of(&DeviceRef::new("/dev/sda")).is_empty());
        assert_eq!(table.mounts_of(&DeviceRef::new("/dev/nvme0n1")), vec!["/".to_string()]);
    }
}
