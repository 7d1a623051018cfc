//! `treesync sync`: one full synchronization.

use std::io::IsTerminal;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use treesync_core::{settings, Severity};
use treesync_daemon::{is_running, request_sync};
use treesync_sync::{pipeline, CancelFlag, SyncOutcome, SyncReporter, SyncRequest};

use super::RootOverrides;

/// Arguments for `treesync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Report what would change without touching the target.
    #[arg(long)]
    pub dry_run: bool,

    /// Keep target files that no longer exist in the source.
    #[arg(long)]
    pub no_delete: bool,

    /// Sync in this process even while a daemon is running.
    #[arg(long)]
    pub local: bool,

    #[command(flatten)]
    pub roots: RootOverrides,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let mut request = self.roots.request(&home, self.dry_run)?;
        if self.no_delete {
            request.delete_enabled = false;
        }

        if !self.dry_run && !self.local && is_running(&home) {
            let daemon_target = settings::load_at(&home).ok().map(|s| s.target);
            if daemon_target.as_deref() == Some(request.roots.target.as_path()) {
                if !self.roots.is_empty() || self.no_delete {
                    bail!(
                        "a daemon is mirroring into '{}'; drop the overrides, pass --local, \
                         or stop the daemon first",
                        request.roots.target.display()
                    );
                }
                println!("Daemon is running; queueing the sync behind its pending changes.");
                let summary = request_sync(&home, false).context("daemon sync failed")?;
                let outcome = SyncOutcome {
                    copied: summary.copied,
                    deleted: summary.deleted,
                    failed: summary.failed,
                    cancelled: summary.cancelled,
                };
                print_summary(&outcome, false);
                return finish(&outcome);
            }
        }

        println!(
            "{}Syncing '{}' → '{}'",
            if self.dry_run { "[dry-run] " } else { "" },
            request.roots.source.display(),
            request.roots.target.display()
        );
        let outcome = run_local(request)?;
        print_summary(&outcome, self.dry_run);
        finish(&outcome)
    }
}

/// Run the pipeline on a blocking worker; ctrl-c requests cancellation.
fn run_local(request: SyncRequest) -> Result<SyncOutcome> {
    let cancel = CancelFlag::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let worker_cancel = cancel.clone();
        let mut worker = tokio::task::spawn_blocking(move || {
            pipeline::run(&request, &ConsoleReporter::new(), &worker_cancel)
        });

        let joined = tokio::select! {
            joined = &mut worker => joined,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    eprintln!("{}", "Cancelling after the current file…".yellow());
                    cancel.cancel();
                }
                worker.await
            }
        };
        joined
            .context("sync worker panicked")?
            .context("sync failed")
    })
}

fn print_summary(outcome: &SyncOutcome, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let (copy_verb, delete_verb) = if dry_run {
        ("would copy", "would delete")
    } else {
        ("copied", "deleted")
    };
    let line = format!(
        "{prefix}{} {copy_verb} {}, {delete_verb} {}, failed {}",
        if outcome.cancelled { "⚠" } else { "✓" },
        outcome.copied,
        outcome.deleted,
        outcome.failed
    );
    if outcome.failed > 0 || outcome.cancelled {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.green());
    }
}

fn finish(outcome: &SyncOutcome) -> Result<()> {
    if outcome.cancelled {
        bail!("sync cancelled; target left partially updated");
    }
    if outcome.failed > 0 {
        bail!("{} item(s) failed", outcome.failed);
    }
    Ok(())
}

/// Prints each item with a colored marker; progress goes to a terminal only.
pub(crate) struct ConsoleReporter {
    show_progress: bool,
}

impl ConsoleReporter {
    pub(crate) fn new() -> Self {
        Self {
            show_progress: std::io::stderr().is_terminal(),
        }
    }
}

impl SyncReporter for ConsoleReporter {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => println!("  {} {message}", "·".bright_black()),
            Severity::Changed => println!("  {} {message}", "✎".green()),
            Severity::Deleted => println!("  {} {message}", "✗".red()),
            Severity::Warning => eprintln!("  {} {message}", "!".yellow()),
            Severity::Error => eprintln!("  {} {message}", "✗".red().bold()),
        }
    }

    fn progress(&self, percent: f64) {
        if !self.show_progress {
            return;
        }
        eprint!("\r{percent:>5.1}%");
        if percent >= 100.0 {
            eprintln!();
        }
    }
}
