use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `~/.treesync`, shared with the settings file.
pub fn state_dir(home: &Path) -> PathBuf {
    treesync_core::settings::state_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    state_dir(home).join(DAEMON_SOCKET)
}
