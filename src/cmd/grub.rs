// ============================================================================
// src/cmd/grub.rs – GRUB package, defaults, fstab, boot code and grub.cfg
// ============================================================================

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cmd::{Invocation, Session, Tool};
use crate::device::DeviceRef;
use crate::error::BootError;
use crate::util::atomic::atomic_symlink;
use crate::util::audit::{invoked_as, record_completion};
use crate::util::lines::{ensure_line, LineOutcome};

const PROC_SELF_MOUNTS: &str = "/proc/self/mounts";

#[derive(Debug, Clone, Copy, Default)]
pub struct GrubOptions {
    /// Leave out the x86_64-efi install and the `/boot/efi` requirement.
    pub skip_uefi: bool,
    /// Pass `--verbose` to grub-install.
    pub debug_grub: bool,
}

/// `install-grub`: make the running system bootable from `device`.
///
/// `/boot/efi` must already be mounted unless UEFI is skipped; nothing is
/// changed when it is not. Under dry-run nothing was really mounted, so the
/// check is only logged.
pub fn install_grub(session: &Session, device: &DeviceRef, opts: &GrubOptions) -> Result<()> {
    let paths = &session.config.paths;
    if !opts.skip_uefi && !session.probe.is_mounted(&paths.efi)? {
        if !session.ctx.dry_run {
            return Err(BootError::EfiNotMounted(paths.efi.clone()).into());
        }
        debug!(efi = %paths.efi.display(), "dry-run: ESP not mounted, continuing");
    }

    session.ui.phase(&format!("installing GRUB for {device}"));

    let manager = session.config.packages.manager;
    if let Some(refresh) = manager.refresh() {
        session.run(refresh).context("refresh package state")?;
    }
    session
        .run(manager.install_grub())
        .context("install the GRUB package")?;

    let grub = &session.config.grub;
    add_line(
        session,
        &paths.default_grub,
        &format!("GRUB_PRELOAD_MODULES=\"{}\"", grub.preload_modules),
    )?;

    let root_partition = root_partition(session)?;
    let partuuid = partuuid_of(session, &root_partition)?;
    info!(root = %root_partition, %partuuid, "root filesystem resolved");

    add_line(
        session,
        &paths.default_grub,
        &format!("GRUB_DEVICE=\"PARTUUID={partuuid}\""),
    )?;
    add_line(session, &paths.fstab, &fstab_root_line(&partuuid))?;
    add_line(
        session,
        &paths.default_grub,
        &format!("GRUB_CMDLINE_LINUX=\"{}\"", grub.cmdline),
    )?;

    relink_mtab(session, &paths.mtab)?;

    if !opts.skip_uefi {
        session
            .run(efi_install(session, device, opts.debug_grub))
            .context("grub-install (x86_64-efi)")?;
    }
    session
        .run(legacy_install(session, device, opts.debug_grub))
        .context("grub-install (i386-pc)")?;

    regenerate_config(session, &paths.grub_cfg, true)?;

    if session.ctx.dry_run {
        println!("[dry-run] append completion record to {}", paths.install_status.display());
    } else {
        record_completion(&paths.install_status, &invoked_as())?;
    }

    session.ui.data_panel(
        "GRUB installed",
        &[
            ("device", device.to_string()),
            ("root", root_partition),
            ("PARTUUID", partuuid),
            ("uefi", if opts.skip_uefi { "skipped".into() } else { paths.efi.display().to_string() }),
        ],
    );
    Ok(())
}

/// Write grub.cfg. An existing file is only overwritten when `replace` is set.
pub fn regenerate_config(session: &Session, output: &Path, replace: bool) -> Result<()> {
    if output.exists() && !replace {
        return Err(BootError::ConfigAlreadyExists(output.to_path_buf()).into());
    }
    if let Some(dir) = output.parent() {
        if session.ctx.dry_run {
            debug!(dir = %dir.display(), "dry-run: not creating");
        } else {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
    }
    session
        .run(Invocation::tool(Tool::GrubMkconfig).arg("-o").path(output))
        .with_context(|| format!("generate {}", output.display()))?;
    info!(output = %output.display(), "GRUB configuration generated");
    Ok(())
}

/// `regenerate-grub-config`
pub fn run_regenerate(session: &Session, output: Option<PathBuf>, replace: bool) -> Result<()> {
    let output = output.unwrap_or_else(|| session.config.paths.grub_cfg.clone());
    session
        .ui
        .phase(&format!("regenerating {}", output.display()));
    regenerate_config(session, &output, replace)?;
    session.ui.success(&format!("{} written.", output.display()));
    Ok(())
}

pub fn fstab_root_line(partuuid: &str) -> String {
    format!("PARTUUID={partuuid}\t/\text4\tnoatime\t0\t1")
}

fn add_line(session: &Session, path: &Path, line: &str) -> Result<()> {
    match ensure_line(path, line, session.ctx.dry_run)? {
        LineOutcome::Appended => session
            .ui
            .note(&format!("{}: added {line}", path.display())),
        LineOutcome::AlreadyPresent => debug!(path = %path.display(), line, "unchanged"),
    }
    Ok(())
}

/// Device node holding `/`, as GRUB sees it.
fn root_partition(session: &Session) -> Result<String> {
    let out = session.run(
        Invocation::tool(Tool::GrubProbe)
            .args(["--target=device", "/"])
            .probe(),
    )?;
    let device = out.stdout.trim();
    if !device.starts_with("/dev/") {
        return Err(BootError::UnexpectedProbeOutput {
            program: "grub-probe",
            output: out.stdout.clone(),
        }
        .into());
    }
    Ok(device.to_string())
}

fn partuuid_of(session: &Session, partition: &str) -> Result<String> {
    let out = session.run(
        Invocation::tool(Tool::Blkid)
            .args(["-s", "PARTUUID", "-o", "value", partition])
            .probe(),
    )?;
    let partuuid = out.stdout.trim();
    if partuuid.is_empty() || partuuid.contains(char::is_whitespace) {
        return Err(BootError::UnexpectedProbeOutput {
            program: "blkid",
            output: out.stdout.clone(),
        }
        .into());
    }
    Ok(partuuid.to_string())
}

fn relink_mtab(session: &Session, mtab: &Path) -> Result<()> {
    if session.ctx.dry_run {
        println!("[dry-run] ln -sf {PROC_SELF_MOUNTS} {}", mtab.display());
        return Ok(());
    }
    atomic_symlink(Path::new(PROC_SELF_MOUNTS), mtab)
        .with_context(|| format!("relink {}", mtab.display()))?;
    debug!(mtab = %mtab.display(), "linked to {PROC_SELF_MOUNTS}");
    Ok(())
}

fn efi_install(session: &Session, device: &DeviceRef, verbose: bool) -> Invocation {
    let paths = &session.config.paths;
    let inv = Invocation::tool(Tool::GrubInstall)
        .args(["--compress=no", "--target=x86_64-efi"])
        .arg(format!("--efi-directory={}", paths.efi.display()))
        .arg(format!("--boot-directory={}", paths.boot.display()))
        .args(["--removable", "--recheck", "--no-rs-codes"]);
    with_verbose(inv, verbose).path(device.path())
}

/// Legacy installs refuse stale blocklists without `--force`.
fn legacy_install(session: &Session, device: &DeviceRef, verbose: bool) -> Invocation {
    let inv = Invocation::tool(Tool::GrubInstall)
        .args(["--compress=no", "--target=i386-pc"])
        .arg(format!("--boot-directory={}", session.config.paths.boot.display()))
        .args(["--recheck", "--no-rs-codes", "--force"]);
    with_verbose(inv, verbose).path(device.path())
}

fn with_verbose(inv: Invocation, verbose: bool) -> Invocation {
    if verbose {
        inv.arg("--verbose")
    } else {
        inv
    }
}
