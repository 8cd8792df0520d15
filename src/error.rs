// ============================================================================
// src/error.rs – Failure taxonomy for boot device workflows
// ============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Hard precondition and delegation failures. None of these are retried;
/// the first one raised aborts the running workflow.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("{} is a partition, not a whole device", .0.display())]
    InvalidTarget(PathBuf),

    #[error("{} is not a block device", .0.display())]
    NotABlockDevice(PathBuf),

    #[error("{} is busy: mounted at {}", .device.display(), .mountpoints.join(", "))]
    DeviceBusy {
        device: PathBuf,
        mountpoints: Vec<String>,
    },

    #[error("you must be root to {0}")]
    PermissionDenied(&'static str),

    #[error("{} is already mounted", .0.display())]
    AlreadyMounted(PathBuf),

    #[error("mount of {} reported success but {} is not mounted", .source_device.display(), .target.display())]
    MountVerificationFailed {
        source_device: PathBuf,
        target: PathBuf,
    },

    #[error("cannot mount {} before {} is mounted", .target.display(), .parent.display())]
    MountOrder { target: PathBuf, parent: PathBuf },

    #[error("{} not mounted. Exiting.", .0.display())]
    EfiNotMounted(PathBuf),

    #[error("{} already exists (pass --replace to regenerate it)", .0.display())]
    ConfigAlreadyExists(PathBuf),

    #[error("user declined destructive operation on {}", .0.display())]
    UserAborted(PathBuf),

    #[error("unsupported partition table '{0}' (only gpt is supported)")]
    UnsupportedPartitionTable(String),

    #[error("unsupported boot filesystem '{0}' (only ext4 is supported)")]
    UnsupportedFilesystem(String),

    #[error("unexpected output from {program}: {output:?}")]
    UnexpectedProbeOutput {
        program: &'static str,
        output: String,
    },

    #[error("{program} exited with status {status}")]
    DelegatedCommandFailure { program: String, status: i32 },
}

impl BootError {
    /// Process exit code for this failure. Delegated tools keep their own
    /// status; everything else (including signal deaths, reported as -1) is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootError::DelegatedCommandFailure { status, .. } if (1..=255).contains(status) => {
                *status
            }
            _ => 1,
        }
    }
}

/// Exit code for an arbitrary workflow error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BootError>())
        .map(BootError::exit_code)
        .unwrap_or(1)
}
