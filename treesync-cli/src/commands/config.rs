//! `treesync config`: show or edit saved settings.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use treesync_core::{settings, SyncSettings};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the saved settings.
    Show(ShowArgs),
    /// Change individual settings.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[arg(long, value_name = "BOOL")]
    pub delete_files: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub auto_sync: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub case_sensitive: Option<bool>,

    /// Append an exclusion pattern (repeatable).
    #[arg(long = "exclude", short = 'e', value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Drop every saved exclusion pattern before appending.
    #[arg(long)]
    pub clear_exclusions: bool,
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "setting")]
    key: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = super::home_dir()?;
    let current = settings::load_at(&home).context("failed to load settings")?;

    match command {
        ConfigCommand::Show(args) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&current)
                        .context("failed to render settings JSON")?
                );
            } else {
                print_table(&current);
            }
        }
        ConfigCommand::Set(args) => {
            let updated = apply(current, args)?;
            let saved = settings::save_at(&home, &updated).context("failed to save settings")?;
            println!("✓ Settings updated");
            print_table(&saved);
        }
    }
    Ok(())
}

fn apply(mut settings: SyncSettings, args: SetArgs) -> Result<SyncSettings> {
    let nothing_to_do = args.delete_files.is_none()
        && args.auto_sync.is_none()
        && args.case_sensitive.is_none()
        && args.exclude.is_empty()
        && !args.clear_exclusions;
    if nothing_to_do {
        bail!("nothing to change; pass at least one option (see `treesync config set --help`)");
    }

    if let Some(value) = args.delete_files {
        settings.delete_files = value;
    }
    if let Some(value) = args.auto_sync {
        settings.auto_sync = value;
    }
    if let Some(value) = args.case_sensitive {
        settings.case_sensitive = value;
    }

    let mut patterns = if args.clear_exclusions {
        Vec::new()
    } else {
        settings.user_patterns()
    };
    for pattern in args.exclude {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    settings.set_user_patterns(&patterns);
    Ok(settings)
}

fn print_table(settings: &SyncSettings) {
    let patterns = settings.user_patterns();
    let rows = vec![
        SettingRow {
            key: "source",
            value: settings.source.display().to_string(),
        },
        SettingRow {
            key: "target",
            value: settings.target.display().to_string(),
        },
        SettingRow {
            key: "exclusions",
            value: if patterns.is_empty() {
                "(none)".to_string()
            } else {
                patterns.join("\n")
            },
        },
        SettingRow {
            key: "delete_files",
            value: flag(settings.delete_files),
        },
        SettingRow {
            key: "auto_sync",
            value: flag(settings.auto_sync),
        },
        SettingRow {
            key: "case_sensitive",
            value: flag(settings.case_sensitive),
        },
        SettingRow {
            key: "updated_at",
            value: settings.updated_at.to_rfc3339(),
        },
    ];

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn flag(value: bool) -> String {
    if value {
        "on".green().to_string()
    } else {
        "off".yellow().to_string()
    }
}
