//! `treesync diff`: show the pending plan without touching the target.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use treesync_sync::preview;

use super::RootOverrides;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Emit the plan as JSON (`{"copy": [...], "delete": [...]}`).
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub roots: RootOverrides,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let request = self.roots.request(&home, true)?;
        let plan = preview(&request).context("failed to compute differences")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("failed to render plan JSON")?
            );
            return Ok(());
        }

        if plan.is_empty() {
            println!("No differences.");
            return Ok(());
        }
        for rel in &plan.copy {
            println!("{}", format!("+ {rel}").green());
        }
        for rel in &plan.delete {
            println!("{}", format!("- {rel}").red());
        }
        println!(
            "{} to copy, {} to delete",
            plan.copy.len(),
            plan.delete.len()
        );
        Ok(())
    }
}
