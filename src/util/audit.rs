// ============================================================================
// src/util/audit.rs – Append-only install status record
// ============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// `<timestamp> <program> complete`
pub fn completion_line(at: DateTime<Local>, program: &str) -> String {
    format!("{} {} complete", at.format("%Y-%m-%dT%H:%M:%S%:z"), program)
}

/// Append a completion record to the status file. Prior history is never
/// truncated; the file is created if missing.
pub fn record_completion(path: &Path, program: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open status file {}", path.display()))?;
    writeln!(file, "{}", completion_line(Local::now(), program))
        .with_context(|| format!("write status file {}", path.display()))?;
    Ok(())
}

/// Name this process was invoked as.
pub fn invoked_as() -> String {
    std::env::args_os()
        .next()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
