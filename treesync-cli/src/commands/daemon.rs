//! `treesync daemon`: background monitor lifecycle and control.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::Value;

use treesync_daemon::paths::socket_path;
use treesync_daemon::{
    request_cancel, request_status, request_stop, request_sync, start_blocking,
    DaemonError, DaemonOptions,
};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (monitor + socket server).
    Start(StartArgs),
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Queue a full sync in the running daemon and wait for it.
    Sync(DaemonSyncArgs),
    /// Cancel the full sync the daemon is currently running.
    Cancel,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Run one full sync before processing live changes.
    #[arg(long)]
    pub initial_sync: bool,
}

#[derive(Args, Debug)]
pub struct DaemonSyncArgs {
    /// Report what would change without touching the target.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home_dir()?;

    match command {
        DaemonCommand::Start(args) => {
            start_blocking(
                &home,
                DaemonOptions {
                    initial_sync: args.initial_sync,
                },
            )
            .context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => with_readable_times(status),
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Sync(args) => {
            let summary = match request_sync(&home, args.dry_run) {
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    bail!("daemon is not running; use `treesync sync` instead")
                }
                other => other.context("daemon sync failed")?,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render sync summary JSON")?
            );
            if summary.failed > 0 {
                bail!("{} item(s) failed", summary.failed);
            }
        }
        DaemonCommand::Cancel => match request_cancel(&home) {
            Ok(true) => println!("cancellation requested"),
            Ok(false) => println!("no sync in progress"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to cancel sync"),
        },
    }

    Ok(())
}

/// Add RFC 3339 renderings next to the unix timestamps in a status payload.
fn with_readable_times(mut status: Value) -> Value {
    for key in ["started_at", "last_sync_at"] {
        let secs = status[format!("{key}_unix")].as_i64().unwrap_or(0);
        if secs <= 0 {
            continue;
        }
        if let Some(at) = DateTime::<Utc>::from_timestamp(secs, 0) {
            status[key] = Value::String(at.to_rfc3339());
        }
    }
    status
}
