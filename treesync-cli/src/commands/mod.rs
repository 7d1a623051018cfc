pub mod config;
pub mod daemon;
pub mod diff;
pub mod init;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use treesync_core::{settings, SyncRoots};
use treesync_sync::SyncRequest;

pub(crate) fn home_dir() -> Result<PathBuf> {
    settings::home().context("could not determine home directory")
}

/// Per-invocation overrides shared by `sync` and `diff`.
#[derive(Args, Debug, Default)]
pub struct RootOverrides {
    /// Source directory for this run only (requires --target).
    #[arg(long, requires = "target")]
    pub source: Option<PathBuf>,

    /// Target directory for this run only (requires --source).
    #[arg(long, requires = "source")]
    pub target: Option<PathBuf>,

    /// Extra exclusion pattern for this run (repeatable).
    #[arg(long = "exclude", short = 'e', value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

impl RootOverrides {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none() && self.exclude.is_empty()
    }

    /// Explicit roots start from default options; otherwise the saved
    /// settings are used. Extra patterns are appended either way.
    pub fn request(&self, home: &Path, trial_run: bool) -> Result<SyncRequest> {
        let mut request = match (&self.source, &self.target) {
            (Some(source), Some(target)) => {
                let source = source
                    .canonicalize()
                    .with_context(|| format!("cannot resolve source '{}'", source.display()))?;
                let target = target
                    .canonicalize()
                    .with_context(|| format!("cannot resolve target '{}'", target.display()))?;
                SyncRequest {
                    roots: SyncRoots::new(source, target),
                    user_patterns: Vec::new(),
                    delete_enabled: true,
                    trial_run,
                    case_sensitive: true,
                }
            }
            _ => {
                let saved = settings::load_at(home).context("failed to load settings")?;
                SyncRequest::from_settings(&saved, trial_run)
            }
        };

        for pattern in &self.exclude {
            if !request.user_patterns.contains(pattern) {
                request.user_patterns.push(pattern.clone());
            }
        }
        Ok(request)
    }
}
