//! `treesync init <source> <target> [options]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use treesync_core::{settings, SyncRoots, SyncSettings};
use treesync_sync::validate_roots;

/// Save the mirror configuration to `~/.treesync/settings.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Authoritative directory tree.
    pub source: PathBuf,

    /// Directory that will mirror the source.
    pub target: PathBuf,

    /// Shell-wildcard exclusion pattern (repeatable), e.g. `*.tmp` or `build/*`.
    #[arg(long = "exclude", short = 'e', value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Keep target files that no longer exist in the source.
    #[arg(long)]
    pub no_delete: bool,

    /// Only log live changes instead of applying them.
    #[arg(long)]
    pub no_auto_sync: bool,

    /// Match exclusion patterns case-insensitively.
    #[arg(long)]
    pub case_insensitive: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;

        let source = self
            .source
            .canonicalize()
            .with_context(|| format!("cannot resolve source '{}'", self.source.display()))?;
        let target = self
            .target
            .canonicalize()
            .with_context(|| format!("cannot resolve target '{}'", self.target.display()))?;
        validate_roots(&SyncRoots::new(&source, &target)).context("invalid mirror roots")?;

        let mut settings = SyncSettings::new(source, target);
        settings.set_user_patterns(&self.exclude);
        settings.delete_files = !self.no_delete;
        settings.auto_sync = !self.no_auto_sync;
        settings.case_sensitive = !self.case_insensitive;

        let saved = settings::save_at(&home, &settings).context("failed to save settings")?;

        println!(
            "✓ Mirroring '{}' → '{}'",
            saved.source.display(),
            saved.target.display()
        );
        println!(
            "  Saved to: {}",
            settings::settings_path_at(&home).display()
        );
        Ok(())
    }
}
