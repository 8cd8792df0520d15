// ============================================================================
// src/config.rs – strict config loader
// ============================================================================

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::packages::PackageManager;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/boottool.toml";

/// Files and mountpoints the workflows read and mutate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Paths {
    pub boot: PathBuf,
    pub efi: PathBuf,
    pub default_grub: PathBuf,
    pub fstab: PathBuf,
    pub mtab: PathBuf,
    pub grub_cfg: PathBuf,
    pub install_status: PathBuf,
    /// Where head/tail sectors are saved before a device is wiped.
    pub backup_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            boot: PathBuf::from("/boot"),
            efi: PathBuf::from("/boot/efi"),
            default_grub: PathBuf::from("/etc/default/grub"),
            fstab: PathBuf::from("/etc/fstab"),
            mtab: PathBuf::from("/etc/mtab"),
            grub_cfg: PathBuf::from("/boot/grub/grub.cfg"),
            install_status: PathBuf::from("/install_status"),
            backup_dir: PathBuf::from("/var/lib/boottool/backups"),
        }
    }
}

#[cfg(test)]
impl Paths {
    /// Same layout re-rooted under `root`.
    pub fn under(root: &Path) -> Self {
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        let d = Self::default();
        Self {
            boot: rebase(d.boot),
            efi: rebase(d.efi),
            default_grub: rebase(d.default_grub),
            fstab: rebase(d.fstab),
            mtab: rebase(d.mtab),
            grub_cfg: rebase(d.grub_cfg),
            install_status: rebase(d.install_status),
            backup_dir: rebase(d.backup_dir),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrubCfg {
    #[serde(default = "default_preload_modules")]
    pub preload_modules: String,
    /// Value of GRUB_CMDLINE_LINUX.
    #[serde(default = "default_cmdline")]
    pub cmdline: String,
}

fn default_preload_modules() -> String {
    "part_gpt part_msdos".to_string()
}

fn default_cmdline() -> String {
    "net.ifnames=0 rootflags=noatime intel_iommu=off".to_string()
}

impl Default for GrubCfg {
    fn default() -> Self {
        Self {
            preload_modules: default_preload_modules(),
            cmdline: default_cmdline(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packages {
    #[serde(default)]
    pub manager: PackageManager,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HybridMbr {
    /// Replace the built-in gdisk automation with a site script. It is
    /// called with the boot device as its only argument.
    #[serde(default)]
    pub script: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelCfg {
    #[serde(default = "default_kernel_source")]
    pub source_dir: PathBuf,
}

fn default_kernel_source() -> PathBuf {
    PathBuf::from("/usr/src/linux")
}

impl Default for KernelCfg {
    fn default() -> Self {
        Self {
            source_dir: default_kernel_source(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub grub: GrubCfg,
    #[serde(default)]
    pub packages: Packages,
    #[serde(default)]
    pub hybrid_mbr: HybridMbr,
    #[serde(default)]
    pub kernel: KernelCfg,
}

impl Config {
    pub fn load<P: AsRef<Path>>(p: P) -> Result<Self> {
        let s = fs::read_to_string(&p)
            .with_context(|| format!("read config: {}", p.as_ref().display()))?;
        let cfg: Self = if p.as_ref().extension().and_then(|e| e.to_str()) == Some("toml") {
            toml::from_str(&s).context("toml parse")?
        } else {
            serde_yaml::from_str(&s).context("yaml parse")?
        };
        Ok(cfg)
    }

    /// An explicit path must exist; the default location is optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(anyhow!("config file not found: {}", path.display()));
                }
                Self::load(path)
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boottool.toml");
        fs::write(
            &path,
            r#"
[paths]
install_status = "/var/log/install_status"

[packages]
manager = "apt"

[hybrid_mbr]
script = "/usr/local/sbin/make_hybrid_mbr.sh"
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.paths.install_status, PathBuf::from("/var/log/install_status"));
        assert_eq!(cfg.paths.fstab, PathBuf::from("/etc/fstab"));
        assert_eq!(cfg.packages.manager, PackageManager::Apt);
        assert_eq!(cfg.grub, GrubCfg::default());
        assert_eq!(
            cfg.hybrid_mbr.script.as_deref(),
            Some(Path::new("/usr/local/sbin/make_hybrid_mbr.sh"))
        );
    }

    #[test]
    fn non_toml_extension_is_read_as_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boottool.yaml");
        fs::write(&path, "grub:\n  cmdline: \"quiet\"\nkernel:\n  source_dir: /usr/src/linux-6.6\n")
            .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.grub.cmdline, "quiet");
        assert_eq!(cfg.grub.preload_modules, "part_gpt part_msdos");
        assert_eq!(cfg.kernel.source_dir, PathBuf::from("/usr/src/linux-6.6"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::discover(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn paths_can_be_rerooted() {
        let paths = Paths::under(Path::new("/mnt/stage"));
        assert_eq!(paths.efi, PathBuf::from("/mnt/stage/boot/efi"));
        assert_eq!(paths.install_status, PathBuf::from("/mnt/stage/install_status"));
    }
}
