// ============================================================================
// src/cmd/base.rs – Allowlisted external command runner (for system utilities)
// ============================================================================

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::error::BootError;

/// Every system utility this tool is allowed to spawn, with the absolute
/// locations it is looked up at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Parted,
    Gdisk,
    MkfsExt4,
    MkfsVfat,
    Mount,
    Blkid,
    Lsblk,
    Blockdev,
    Dd,
    Udevadm,
    GrubInstall,
    GrubMkconfig,
    GrubProbe,
    EnvUpdate,
    Emerge,
    AptGet,
    Dnf,
    Pacman,
    Make,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Parted => "parted",
            Tool::Gdisk => "gdisk",
            Tool::MkfsExt4 => "mkfs.ext4",
            Tool::MkfsVfat => "mkfs.vfat",
            Tool::Mount => "mount",
            Tool::Blkid => "blkid",
            Tool::Lsblk => "lsblk",
            Tool::Blockdev => "blockdev",
            Tool::Dd => "dd",
            Tool::Udevadm => "udevadm",
            Tool::GrubInstall => "grub-install",
            Tool::GrubMkconfig => "grub-mkconfig",
            Tool::GrubProbe => "grub-probe",
            Tool::EnvUpdate => "env-update",
            Tool::Emerge => "emerge",
            Tool::AptGet => "apt-get",
            Tool::Dnf => "dnf",
            Tool::Pacman => "pacman",
            Tool::Make => "make",
        }
    }

    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Tool::Parted => &["/sbin/parted", "/usr/sbin/parted", "/usr/bin/parted"],
            Tool::Gdisk => &["/sbin/gdisk", "/usr/sbin/gdisk", "/usr/bin/gdisk"],
            Tool::MkfsExt4 => &[
                "/sbin/mkfs.ext4",
                "/usr/sbin/mkfs.ext4",
                "/usr/bin/mkfs.ext4",
            ],
            Tool::MkfsVfat => &[
                "/sbin/mkfs.vfat",
                "/usr/sbin/mkfs.vfat",
                "/usr/bin/mkfs.vfat",
            ],
            Tool::Mount => &["/bin/mount", "/usr/bin/mount"],
            Tool::Blkid => &["/sbin/blkid", "/usr/sbin/blkid", "/usr/bin/blkid"],
            Tool::Lsblk => &["/bin/lsblk", "/usr/bin/lsblk"],
            Tool::Blockdev => &["/sbin/blockdev", "/usr/sbin/blockdev", "/usr/bin/blockdev"],
            Tool::Dd => &["/bin/dd", "/usr/bin/dd"],
            Tool::Udevadm => &["/sbin/udevadm", "/usr/sbin/udevadm", "/usr/bin/udevadm"],
            // Fedora and friends ship the grub2-* spellings.
            Tool::GrubInstall => &[
                "/usr/sbin/grub-install",
                "/usr/bin/grub-install",
                "/sbin/grub-install",
                "/usr/sbin/grub2-install",
                "/usr/bin/grub2-install",
            ],
            Tool::GrubMkconfig => &[
                "/usr/sbin/grub-mkconfig",
                "/usr/bin/grub-mkconfig",
                "/sbin/grub-mkconfig",
                "/usr/sbin/grub2-mkconfig",
                "/usr/bin/grub2-mkconfig",
            ],
            Tool::GrubProbe => &[
                "/usr/sbin/grub-probe",
                "/usr/bin/grub-probe",
                "/sbin/grub-probe",
                "/usr/sbin/grub2-probe",
                "/usr/bin/grub2-probe",
            ],
            Tool::EnvUpdate => &["/usr/sbin/env-update", "/usr/bin/env-update", "/sbin/env-update"],
            Tool::Emerge => &["/usr/bin/emerge"],
            Tool::AptGet => &["/usr/bin/apt-get"],
            Tool::Dnf => &["/usr/bin/dnf"],
            Tool::Pacman => &["/usr/bin/pacman"],
            Tool::Make => &["/usr/bin/make", "/bin/make"],
        }
    }
}

/// What an [`Invocation`] spawns: an allowlisted tool, or a script path the
/// operator configured explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    Tool(Tool),
    Script(PathBuf),
}

impl Program {
    pub fn name(&self) -> String {
        match self {
            Program::Tool(tool) => tool.name().to_string(),
            Program::Script(path) => path.display().to_string(),
        }
    }
}

/// A single external command: argv, extra environment, optional stdin.
///
/// `capture` collects stdout/stderr instead of streaming them through;
/// `read_only` marks probes that are still run under `--dry-run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: Program,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    pub capture: bool,
    pub read_only: bool,
}

impl Invocation {
    pub fn tool(tool: Tool) -> Self {
        Self::new(Program::Tool(tool))
    }

    pub fn script<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(Program::Script(path.into()))
    }

    fn new(program: Program) -> Self {
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            capture: false,
            read_only: false,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin<B: Into<Vec<u8>>>(mut self, bytes: B) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// Capture output and allow the command under `--dry-run`.
    pub fn probe(mut self) -> Self {
        self.capture = true;
        self.read_only = true;
        self
    }

    #[cfg(test)]
    pub fn is_tool(&self, tool: Tool) -> bool {
        self.program == Program::Tool(tool)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.program.name())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputData {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl OutputData {
    #[cfg(test)]
    pub fn with_stdout<S: Into<String>>(stdout: S) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }
}

/// Capability for spawning external commands. Workflows only ever talk to
/// the system through this trait, so they can be driven by a fake in tests.
pub trait CommandRunner {
    fn execute(&self, invocation: &Invocation) -> Result<OutputData>;

    /// Run and turn a non-zero exit into [`BootError::DelegatedCommandFailure`].
    fn run_checked(&self, invocation: &Invocation) -> Result<OutputData> {
        let out = self.execute(invocation)?;
        if out.status != 0 {
            if !out.stderr.trim().is_empty() {
                debug!(stderr = %out.stderr.trim(), "{} failed", invocation.program.name());
            }
            return Err(BootError::DelegatedCommandFailure {
                program: invocation.program.name(),
                status: out.status,
            }
            .into());
        }
        Ok(out)
    }
}

/// Runs commands on the live system. Streams output of mutating commands to
/// the terminal; under dry-run those are only reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn execute(&self, invocation: &Invocation) -> Result<OutputData> {
        if self.dry_run && !invocation.read_only {
            info!(command = %invocation, "dry-run: not executing");
            println!("[dry-run] {invocation}");
            return Ok(OutputData::default());
        }

        let path = resolve_program(&invocation.program)?;
        info!(command = %invocation, "running");

        let mut cmd = Command::new(&path);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if invocation.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else if invocation.capture {
            cmd.stdin(Stdio::null());
        }
        if invocation.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", path.display()))?;

        if let Some(bytes) = &invocation.stdin {
            if let Some(mut sin) = child.stdin.take() {
                // A child that exits early closes the pipe; its status says why.
                match sin.write_all(bytes) {
                    Err(err) if err.kind() != ErrorKind::BrokenPipe => {
                        return Err(err).context("writing stdin");
                    }
                    _ => {}
                }
            }
        }

        let out = child.wait_with_output().context("collect output")?;
        let data = OutputData {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            status: out.status.code().unwrap_or(-1),
        };
        debug!(status = data.status, "{} exited", invocation.program.name());
        Ok(data)
    }
}

/// Map a program to an absolute, existing executable path.
pub fn resolve_program(program: &Program) -> Result<PathBuf> {
    match program {
        Program::Tool(tool) => tool
            .candidates()
            .iter()
            .map(Path::new)
            .find(|p| p.is_file())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                anyhow!(
                    "None of the candidate binaries {:?} were found on this system",
                    tool.candidates()
                )
            }),
        Program::Script(path) => {
            if !path.is_absolute() {
                return Err(anyhow!("script path must be absolute: {}", path.display()));
            }
            if !path.is_file() {
                return Err(anyhow!("script not found: {}", path.display()));
            }
            std::fs::canonicalize(path)
                .with_context(|| format!("canonicalize failed: {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TOOLS: &[Tool] = &[
        Tool::Parted,
        Tool::Gdisk,
        Tool::MkfsExt4,
        Tool::MkfsVfat,
        Tool::Mount,
        Tool::Blkid,
        Tool::Lsblk,
        Tool::Blockdev,
        Tool::Dd,
        Tool::Udevadm,
        Tool::GrubInstall,
        Tool::GrubMkconfig,
        Tool::GrubProbe,
        Tool::EnvUpdate,
        Tool::Emerge,
        Tool::AptGet,
        Tool::Dnf,
        Tool::Pacman,
        Tool::Make,
    ];

    #[test]
    fn allowlist_only_contains_absolute_paths() {
        for tool in ALL_TOOLS {
            assert!(!tool.candidates().is_empty(), "{} has no candidates", tool.name());
            for path in tool.candidates() {
                assert!(
                    Path::new(path).is_absolute(),
                    "expected {path} for {} to be absolute",
                    tool.name()
                );
            }
        }
    }

    #[test]
    fn relative_scripts_are_refused() {
        let err = resolve_program(&Program::Script(PathBuf::from("make_hybrid_mbr.sh")))
            .unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let inv = Invocation::tool(Tool::Parted)
            .args(["--script", "/dev/sda", "--", "name", "3"])
            .arg("boot fs")
            .env("LC_ALL", "C");
        assert_eq!(
            inv.to_string(),
            "LC_ALL=C parted --script /dev/sda -- name 3 'boot fs'"
        );
    }

    #[test]
    fn dry_run_skips_mutating_commands() {
        let runner = SystemRunner::new(true);
        let inv = Invocation::script("/nonexistent/wipe-everything.sh").arg("/dev/sdx");
        let out = runner.execute(&inv).unwrap();
        assert_eq!(out.status, 0);
    }

    #[test]
    fn probes_capture_stdout_and_feed_stdin() {
        let runner = SystemRunner::new(true);
        let inv = Invocation::script("/bin/sh")
            .args(["-c", "read line; echo \"got $line\""])
            .stdin("hybrid\n")
            .probe();
        let out = runner.run_checked(&inv).unwrap();
        assert_eq!(out.stdout.trim(), "got hybrid");
    }

    #[test]
    fn child_that_ignores_stdin_keeps_its_exit_status() {
        let runner = SystemRunner::new(false);
        let inv = Invocation::script("/bin/sh")
            .args(["-c", "exec 0<&-; exit 5"])
            .stdin(vec![b'y'; 1 << 20])
            .probe();
        let err = runner.run_checked(&inv).unwrap_err();
        match err.downcast_ref::<BootError>() {
            Some(BootError::DelegatedCommandFailure { status, .. }) => assert_eq!(*status, 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_becomes_delegated_failure() {
        let runner = SystemRunner::new(false);
        let inv = Invocation::script("/bin/sh").args(["-c", "exit 3"]).probe();
        let err = runner.run_checked(&inv).unwrap_err();
        match err.downcast_ref::<BootError>() {
            Some(BootError::DelegatedCommandFailure { status, .. }) => assert_eq!(*status, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
