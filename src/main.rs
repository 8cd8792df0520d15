mod cmd;
mod config;
mod context;
mod device;
mod error;
mod mount;
mod packages;
mod system;
#[cfg(test)]
mod testing;
mod ui;
mod util;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cmd::base::SystemRunner;
use cmd::grub::GrubOptions;
use cmd::pipeline::PipelineOptions;
use cmd::prepare::PrepareOptions;
use cmd::Session;
use config::Config;
use context::ExecContext;
use device::{BootFilesystem, DeviceRef, PartitionTable};
use error::exit_code_for;
use system::LiveSystem;
use ui::{TerminalPrompter, UX};

/// Build a boot device (BIOS + UEFI GRUB) for the root filesystem that is
/// already running.
#[derive(Parser, Debug)]
#[command(name = "boottool", version, about)]
struct Cli {
    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print destructive commands and file edits instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Config file (TOML or YAML); defaults to /etc/boottool.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that a device is a whole, unmounted block device
    CheckDevice { device: PathBuf },

    /// Wipe the device and write the label plus bios_grub and EFI partitions
    CreateBootDevice {
        device: PathBuf,
        #[arg(long, default_value = "gpt")]
        partition_table: PartitionTable,
        #[arg(long, default_value = "ext4")]
        filesystem: BootFilesystem,
        #[arg(long)]
        force: bool,
        /// Do not save the head and tail sectors before wiping
        #[arg(long)]
        no_backup: bool,
    },

    /// Add and format the ext4 /boot partition (partition 3)
    WriteBootPartition {
        device: PathBuf,
        #[arg(long)]
        force: bool,
    },

    /// Write a hybrid MBR over the GPT label (root only)
    MakeHybridMbr { boot_device: PathBuf },

    /// Mount partition 3 at /boot and partition 2 at /boot/efi
    MountBoot { boot_device: PathBuf },

    /// Full pipeline: partition, hybrid MBR, mount, install GRUB, regenerate config
    CreateBootDeviceForExistingRoot {
        #[arg(long)]
        boot_device: PathBuf,
        #[arg(long, default_value = "gpt")]
        boot_device_partition_table: PartitionTable,
        #[arg(long, default_value = "ext4")]
        boot_filesystem: BootFilesystem,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        skip_uefi: bool,
        /// Run grub-install with --verbose
        #[arg(long)]
        debug_grub: bool,
        #[arg(long)]
        compile_kernel: bool,
        /// Run `make menuconfig` before building (implies --compile-kernel)
        #[arg(long)]
        configure_kernel: bool,
        #[arg(long)]
        no_backup: bool,
    },

    /// Install GRUB for the running root onto an already-prepared device
    InstallGrub {
        boot_device: PathBuf,
        #[arg(long)]
        skip_uefi: bool,
        #[arg(long)]
        debug_grub: bool,
    },

    /// Run grub-mkconfig, refusing to overwrite an existing file unless told
    RegenerateGrubConfig {
        #[arg(long)]
        replace: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn force(&self) -> bool {
        match self {
            Commands::CreateBootDevice { force, .. }
            | Commands::WriteBootPartition { force, .. }
            | Commands::CreateBootDeviceForExistingRoot { force, .. } => *force,
            _ => false,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let ctx = ExecContext::new(cli.command.force(), cli.verbose, cli.dry_run);
    init_tracing(&ctx);

    if let Err(err) = run(cli, ctx) {
        eprintln!("boottool: {err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

fn init_tracing(ctx: &ExecContext) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(ctx.tracing_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli, ctx: ExecContext) -> Result<()> {
    let config = Config::discover(cli.config.as_deref())?;
    let runner = SystemRunner::new(ctx.dry_run);
    let probe = LiveSystem::new(&runner);
    let prompter = TerminalPrompter;
    let ui = UX::new();
    let session = Session {
        ctx,
        config: &config,
        runner: &runner,
        probe: &probe,
        prompter: &prompter,
        ui: &ui,
    };

    match cli.command {
        Commands::CheckDevice { device } => {
            cmd::preflight::run(&session, &DeviceRef::resolve(device))
        }
        Commands::CreateBootDevice {
            device,
            partition_table,
            filesystem,
            no_backup,
            ..
        } => cmd::prepare::run(
            &session,
            &DeviceRef::resolve(device),
            &PrepareOptions {
                table: partition_table,
                filesystem,
                backup: !no_backup,
            },
        ),
        Commands::WriteBootPartition { device, .. } => {
            cmd::bootfs::run(&session, &DeviceRef::resolve(device))
        }
        Commands::MakeHybridMbr { boot_device } => {
            cmd::hybrid_mbr::run(&session, &DeviceRef::resolve(boot_device))
        }
        Commands::MountBoot { boot_device } => {
            cmd::mount_boot::run(&session, &DeviceRef::resolve(boot_device))
        }
        Commands::CreateBootDeviceForExistingRoot {
            boot_device,
            boot_device_partition_table,
            boot_filesystem,
            skip_uefi,
            debug_grub,
            compile_kernel,
            configure_kernel,
            no_backup,
            ..
        } => cmd::pipeline::run(
            &session,
            &DeviceRef::resolve(boot_device),
            &PipelineOptions {
                table: boot_device_partition_table,
                filesystem: boot_filesystem,
                skip_uefi,
                debug_grub,
                compile_kernel: compile_kernel || configure_kernel,
                configure_kernel,
                backup: !no_backup,
            },
        ),
        Commands::InstallGrub {
            boot_device,
            skip_uefi,
            debug_grub,
        } => cmd::grub::install_grub(
            &session,
            &DeviceRef::resolve(boot_device),
            &GrubOptions {
                skip_uefi,
                debug_grub,
            },
        ),
        Commands::RegenerateGrubConfig { replace, output } => {
            cmd::grub::run_regenerate(&session, output, replace)
        }
    }
}
