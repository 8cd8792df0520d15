// ============================================================================
// src/testing.rs – Scripted fake host for driving workflows in unit tests
// ============================================================================

use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use crate::cmd::base::{CommandRunner, Invocation, OutputData, Program, Tool};
use crate::cmd::Session;
use crate::config::{Config, Paths};
use crate::context::ExecContext;
use crate::device::DeviceRef;
use crate::mount::{MountEntry, MountTable};
use crate::system::SystemProbe;
use crate::ui::{Prompter, UX};

pub const DISK: &str = "/dev/sdx";
pub const ROOT_PARTITION: &str = "/dev/nvme0n1p4";
pub const ROOT_PARTUUID: &str = "5f1c9a2e-8d4b-4c1e-9a77-0b2f6c3d4e04";

/// Records every invocation, answers probes from a script, and mounts
/// things into its own table when `mount` is called.
pub struct FakeHost {
    pub root: Cell<bool>,
    pub mount_noop: Cell<bool>,
    pub mounts: RefCell<MountTable>,
    block_devices: RefCell<Vec<PathBuf>>,
    calls: RefCell<Vec<Invocation>>,
    responses: RefCell<Vec<(Tool, OutputData)>>,
    failures: RefCell<Vec<(Tool, i32)>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self {
            root: Cell::new(true),
            mount_noop: Cell::new(false),
            mounts: RefCell::new(MountTable::parse(&format!("{ROOT_PARTITION} / ext4 rw 0 0\n"))),
            block_devices: RefCell::new(vec![PathBuf::from(DISK)]),
            calls: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
        };
        host.respond(Tool::Blockdev, "62914560\n");
        host.respond(Tool::GrubProbe, &format!("{ROOT_PARTITION}\n"));
        host.respond(Tool::Blkid, &format!("{ROOT_PARTUUID}\n"));
        host
    }

    pub fn add_block_device(&self, path: &str) {
        self.block_devices.borrow_mut().push(PathBuf::from(path));
    }

    pub fn respond(&self, tool: Tool, stdout: &str) {
        let mut responses = self.responses.borrow_mut();
        responses.retain(|(t, _)| *t != tool);
        responses.push((tool, OutputData::with_stdout(stdout)));
    }

    pub fn fail(&self, tool: Tool, status: i32) {
        self.failures.borrow_mut().push((tool, status));
    }

    pub fn mount(&self, device: &str, mountpoint: &Path) {
        self.mounts.borrow_mut().push(MountEntry {
            device: device.to_string(),
            mountpoint: mountpoint.to_string_lossy().into_owned(),
            filesystem: "auto".into(),
            options: "rw".into(),
        });
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, tool: Tool) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|inv| inv.is_tool(tool))
            .cloned()
            .collect()
    }

    /// Index of the first recorded call matching `pred`.
    pub fn position<F: Fn(&Invocation) -> bool>(&self, pred: F) -> Option<usize> {
        self.calls.borrow().iter().position(pred)
    }
}

impl CommandRunner for FakeHost {
    fn execute(&self, inv: &Invocation) -> Result<OutputData> {
        self.calls.borrow_mut().push(inv.clone());
        let Program::Tool(tool) = &inv.program else {
            return Ok(OutputData::default());
        };

        if let Some((_, status)) = self.failures.borrow().iter().find(|(t, _)| t == tool) {
            return Ok(OutputData {
                status: *status,
                stderr: format!("{} failed", tool.name()),
                ..OutputData::default()
            });
        }

        if *tool == Tool::Mount && !self.mount_noop.get() && inv.args.len() >= 2 {
            let n = inv.args.len();
            self.mount(&inv.args[n - 2], Path::new(&inv.args[n - 1]));
        }

        Ok(self
            .responses
            .borrow()
            .iter()
            .find(|(t, _)| t == tool)
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }
}

impl SystemProbe for FakeHost {
    fn is_block_device(&self, path: &Path) -> bool {
        self.block_devices.borrow().iter().any(|p| p == path)
    }

    fn is_partition(&self, device: &DeviceRef) -> bool {
        device.looks_like_partition()
    }

    fn mount_table(&self) -> Result<MountTable> {
        Ok(self.mounts.borrow().clone())
    }

    fn is_root(&self) -> bool {
        self.root.get()
    }
}

pub struct Answer(pub bool);

impl Prompter for Answer {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(self.0)
    }
}

/// A fake host plus a config whose paths live in a scratch directory.
pub struct Harness {
    pub host: FakeHost,
    pub config: Config,
    pub ui: UX,
    pub dir: TempDir,
    yes: Answer,
    no: Answer,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("etc/default")).expect("etc");
        let config = Config {
            paths: Paths::under(dir.path()),
            ..Config::default()
        };
        Self {
            host: FakeHost::new(),
            config,
            ui: UX::new(),
            dir,
            yes: Answer(true),
            no: Answer(false),
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.config.paths
    }

    pub fn disk(&self) -> DeviceRef {
        DeviceRef::new(DISK)
    }

    pub fn session(&self, force: bool) -> Session<'_> {
        self.session_ctx(ExecContext::new(force, 0, false))
    }

    pub fn session_answering(&self, answer: bool, force: bool) -> Session<'_> {
        Session {
            prompter: if answer { &self.yes } else { &self.no },
            ..self.session(force)
        }
    }

    pub fn session_ctx(&self, ctx: ExecContext) -> Session<'_> {
        Session {
            ctx,
            config: &self.config,
            runner: &self.host,
            probe: &self.host,
            prompter: &self.yes,
            ui: &self.ui,
        }
    }
}
