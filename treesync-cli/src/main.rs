//! treesync: one-way directory mirroring.
//!
//! # Usage
//!
//! ```text
//! treesync init <source> <target> [--exclude P]... [--no-delete] [--no-auto-sync] [--case-insensitive]
//! treesync config show [--json]
//! treesync config set [--delete-files B] [--auto-sync B] [--case-sensitive B] [--exclude P]... [--clear-exclusions]
//! treesync sync [--dry-run] [--no-delete] [--source S --target T] [--exclude P]... [--local]
//! treesync diff [--source S --target T] [--exclude P]... [--json]
//! treesync daemon start [--initial-sync] | stop | status | sync [--dry-run] | cancel
//! ```

mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, diff::DiffArgs, init::InitArgs, sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "treesync",
    version,
    about = "Mirror a source directory tree onto a target directory",
    long_about = None,
)]
struct Cli {
    /// Print library diagnostics to stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save the source/target pair and mirror options.
    Init(InitArgs),

    /// Inspect or change saved settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run one full synchronization.
    Sync(SyncArgs),

    /// Show what a sync would copy and delete.
    Diff(DiffArgs),

    /// Run or control the background monitor.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

/// The daemon installs its own subscriber; everything else stays quiet
/// unless `-v` is given.
fn init_logging(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match verbose {
        0 => return,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
