//! treesync core library: domain types, settings persistence, errors.
//!
//! - [`types`]: mirror roots, settings, log severity
//! - [`error`]: [`SettingsError`]
//! - [`settings`]: load / save of `~/.treesync/settings.yaml`

pub mod error;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use types::{parse_user_patterns, Severity, Side, SyncRoots, SyncSettings};
