//! Diff two inventories into copy and delete sets.
//!
//! Freshness is decided by modification time alone: a source file is copied
//! when the target copy is missing or strictly older. Equal times mean "up to
//! date", so a content change that keeps the same mtime is not detected.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use filetime::FileTime;
use serde::Serialize;

use treesync_core::SyncRoots;


/// Copy and delete sets for one synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub copy: BTreeSet<String>,
    pub delete: BTreeSet<String>,
}

impl SyncPlan {
    pub fn total(&self) -> usize {
        self.copy.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Compute the plan that makes the target file set match the source one.
///
/// `delete` stays empty unless `delete_enabled`; when enabled it is exactly
/// the target paths absent from the source inventory.
pub fn plan(
    source: &BTreeSet<String>,
    target: &BTreeSet<String>,
    roots: &SyncRoots,
    delete_enabled: bool,
) -> SyncPlan {
    let copy = source
        .iter()
        .filter(|rel| {
            needs_copy(
                &roots.source.join(rel.as_str()),
                &roots.target.join(rel.as_str()),
            )
        })
        .cloned()
        .collect();

    let delete = if delete_enabled {
        target.difference(source).cloned().collect()
    } else {
        BTreeSet::new()
    };

    SyncPlan { copy, delete }
}

fn needs_copy(source: &Path, target: &Path) -> bool {
    let source_mtime = match std::fs::metadata(source) {
        Ok(meta) => FileTime::from_last_modification_time(&meta),
        Err(err) => {
            tracing::warn!(
                path = %source.display(),
                error = %err,
                "source file vanished after scan; leaving it out of the plan",
            );
            return false;
        }
    };

    match std::fs::metadata(target) {
        Ok(meta) => source_mtime > FileTime::from_last_modification_time(&meta),
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            tracing::warn!(
                path = %target.display(),
                error = %err,
                "cannot stat target file; scheduling a copy",
            );
            true
        }
    }
}
