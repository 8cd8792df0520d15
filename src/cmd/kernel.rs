// ============================================================================
// src/cmd/kernel.rs – Optional kernel configure/build/install
// ============================================================================

use anyhow::{anyhow, Context, Result};
use std::thread;
use tracing::info;

use crate::cmd::{Invocation, Session, Tool};

/// Build and install the kernel in `kernel.source_dir`, running
/// `menuconfig` first when `configure` is set.
pub fn build_and_install(session: &Session, configure: bool) -> Result<()> {
    let src = &session.config.kernel.source_dir;
    if !src.is_dir() {
        return Err(anyhow!("kernel source directory {} not found", src.display()));
    }
    session
        .ui
        .phase(&format!("building kernel in {}", src.display()));

    let make = |target: &str| Invocation::tool(Tool::Make).arg("-C").path(src).arg(target);

    if configure {
        session.run(make("menuconfig")).context("make menuconfig")?;
    }

    let jobs = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    info!(jobs, "compiling kernel");
    session
        .run(make(&format!("-j{jobs}")))
        .context("compile kernel")?;
    session
        .run(make("modules_install"))
        .context("install kernel modules")?;
    session.run(make("install")).context("install kernel")?;

    session.ui.success("Kernel built and installed.");
    Ok(())
}
