// ============================================================================
// src/cmd/mod.rs – command subsystem root
// ============================================================================
pub mod base; // external command runner (Tool, Invocation, CommandRunner)
pub mod bootfs; // boottool write-boot-partition
pub mod grub; // boottool install-grub / regenerate-grub-config
pub mod hybrid_mbr; // boottool make-hybrid-mbr
pub mod kernel;
pub mod mount_boot; // boottool mount-boot
pub mod pipeline; // boottool create-boot-device-for-existing-root
pub mod preflight; // boottool check-device
pub mod prepare; // boottool create-boot-device

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::context::ExecContext;
use crate::system::SystemProbe;
use crate::ui::{Prompter, UX};

// Re-export common types for convenience:
pub use base::{CommandRunner, Invocation, OutputData, Tool};

/// Everything a workflow stage needs, passed explicitly.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    pub ctx: ExecContext,
    pub config: &'a Config,
    pub runner: &'a dyn CommandRunner,
    pub probe: &'a dyn SystemProbe,
    pub prompter: &'a dyn Prompter,
    pub ui: &'a UX,
}

impl<'a> Session<'a> {
    /// Run a command, failing on non-zero exit.
    pub fn run(&self, invocation: Invocation) -> Result<OutputData> {
        self.runner.run_checked(&invocation)
    }

    /// Copy of this session with the confirmation gate already passed.
    pub fn forced(&self) -> Session<'a> {
        Session {
            ctx: self.ctx.forced(),
            ..*self
        }
    }

    /// Wait for udev to create partition nodes. Best effort.
    pub fn settle_udev(&self) {
        if let Err(err) = self.run(Invocation::tool(Tool::Udevadm).arg("settle")) {
            warn!("udevadm settle failed: {err:#}");
        }
    }
}
