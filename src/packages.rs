// ============================================================================
// src/packages.rs – Package manager invocations for the GRUB package
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::cmd::base::{Invocation, Tool};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Portage,
    Apt,
    Dnf,
    Pacman,
}

impl PackageManager {
    /// Environment / index refresh run before installing, if the manager
    /// needs one.
    pub fn refresh(self) -> Option<Invocation> {
        match self {
            PackageManager::Portage => Some(Invocation::tool(Tool::EnvUpdate)),
            PackageManager::Apt => Some(
                Invocation::tool(Tool::AptGet)
                    .arg("update")
                    .env("DEBIAN_FRONTEND", "noninteractive"),
            ),
            PackageManager::Dnf => Some(Invocation::tool(Tool::Dnf).arg("makecache")),
            PackageManager::Pacman => None,
        }
    }

    /// Install GRUB (BIOS and EFI targets) when missing or outdated. Never a
    /// forced reinstall.
    pub fn install_grub(self) -> Invocation {
        match self {
            PackageManager::Portage => Invocation::tool(Tool::Emerge)
                .args(["--update", "--newuse", "sys-boot/grub"]),
            PackageManager::Apt => Invocation::tool(Tool::AptGet)
                .args(["install", "-y", "grub-pc-bin", "grub-efi-amd64-bin"])
                .env("DEBIAN_FRONTEND", "noninteractive"),
            PackageManager::Dnf => Invocation::tool(Tool::Dnf)
                .args(["install", "-y", "grub2-pc", "grub2-efi-x64", "grub2-tools"]),
            PackageManager::Pacman => Invocation::tool(Tool::Pacman)
                .args(["-S", "--needed", "--noconfirm", "grub", "efibootmgr"]),
        }
    }
}
