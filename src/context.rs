// ============================================================================
// src/context.rs – Immutable execution context threaded through workflows
// ============================================================================

/// Global switches from the command line. Built once in `main` and passed
/// by value to every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// Skip the confirmation gate before destructive steps.
    pub force: bool,
    /// Number of `-v` flags given.
    pub verbosity: u8,
    /// Print destructive commands and file mutations instead of performing them.
    pub dry_run: bool,
}

impl ExecContext {
    pub fn new(force: bool, verbosity: u8, dry_run: bool) -> Self {
        Self {
            force,
            verbosity,
            dry_run,
        }
    }

    /// Same context with the confirmation gate disabled. Used once the
    /// orchestrated flow has already confirmed with the user.
    pub fn forced(self) -> Self {
        Self {
            force: true,
            ..self
        }
    }

    pub fn tracing_level(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
