//! YAML settings persistence.
//!
//! # Storage layout
//!
//! ```text
//! ~/.treesync/
//!   settings.yaml   (mode 0600)
//! ```
//!
//! Every function takes the home directory explicitly (`*_at(home, …)`), so
//! tests point them at a `TempDir`. Front ends resolve the real one once with
//! [`home`].

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::SettingsError;
use crate::types::SyncSettings;

/// Name of the per-user state directory under `$HOME`.
pub const STATE_DIR_NAME: &str = ".treesync";

const SETTINGS_FILE_NAME: &str = "settings.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.treesync/`, pure, no I/O.
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(STATE_DIR_NAME)
}

/// `<home>/.treesync/settings.yaml`, pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    state_dir_at(home).join(SETTINGS_FILE_NAME)
}

/// Resolve the current user's home directory.
pub fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.treesync/settings.yaml`.
///
/// Returns `SettingsError::NotFound` if absent,
/// `SettingsError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<SyncSettings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Err(SettingsError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save settings to `<home>/.treesync/settings.yaml`.
///
/// Write flow: stamp `updated_at` → serialize → `.yaml.tmp` sibling →
/// `chmod 0600` → `rename`. Returns the settings as written.
pub fn save_at(home: &Path, settings: &SyncSettings) -> Result<SyncSettings, SettingsError> {
    let dir = state_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }

    let mut stamped = settings.clone();
    stamped.updated_at = Utc::now();

    let path = settings_path_at(home);
    let tmp_path = path.with_file_name(format!("{SETTINGS_FILE_NAME}.tmp"));
    let yaml = serde_yaml::to_string(&stamped)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(stamped)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
