//! Recursive enumeration of a root into relative file paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::exclusion::{relative_path, ExclusionSet};
use crate::SyncError;

/// Files found under one root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Forward-slash relative paths of every non-excluded file.
    pub files: BTreeSet<String>,
    /// Non-excluded files whose names are not valid UTF-8. They cannot be
    /// planned, so a run reports each one as a failure.
    pub unrepresentable: Vec<PathBuf>,
}

/// Walk `root` and collect the relative path of every file not excluded.
///
/// Directories are always descended into; exclusion is tested on file paths
/// only, so `vendor/*` hides the files below `vendor/` while the walk still
/// visits them. Symlinks are not followed, but a symlink to a regular file is
/// inventoried like the file itself.
///
/// A failure to open `root` is returned as [`SyncError::Scan`]. Failures on
/// entries below the root are logged and skipped.
pub fn build_inventory(root: &Path, exclusions: &ExclusionSet) -> Result<Inventory, SyncError> {
    let mut inventory = Inventory::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 || err.path() == Some(root) => {
                return Err(SyncError::Scan {
                    path: root.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                tracing::warn!(
                    root = %root.display(),
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable entry",
                );
                continue;
            }
        };

        if entry.depth() == 0 {
            if !entry.file_type().is_dir() {
                return Err(SyncError::Config(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            continue;
        }

        let file_type = entry.file_type();
        let is_file =
            file_type.is_file() || (file_type.is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let Some(rel) = relative_path(entry.path(), root) else {
            let Ok(raw) = entry.path().strip_prefix(root) else {
                continue;
            };
            if !exclusions.matches_relative(&lossy_relative(raw)) {
                tracing::warn!(
                    path = %entry.path().display(),
                    "file name is not valid UTF-8; it cannot be mirrored",
                );
                inventory.unrepresentable.push(entry.path().to_path_buf());
            }
            continue;
        };
        if exclusions.matches_relative(&rel) {
            tracing::trace!(path = %rel, "excluded from inventory");
            continue;
        }
        inventory.files.insert(rel);
    }

    Ok(inventory)
}

/// Display form of a relative path, used only to test exclusions.
fn lossy_relative(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
