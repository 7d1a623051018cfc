//! Single-path mutations of the target tree.
//!
//! [`copy_single_file`] and [`delete_single_path`] are shared by the plan
//! executor and by the daemon's change monitor, so a change detected live and
//! a change found by a full scan take the same route.
//!
//! ## Read-only handling
//!
//! A read-only target file is made writable before it is overwritten or
//! removed. If the OS still refuses with `PermissionDenied`, the containing
//! directory is made writable as well and the operation is retried once.

use std::io::ErrorKind;
use std::path::{Component, Path};

use filetime::FileTime;
use walkdir::WalkDir;

use treesync_core::SyncRoots;

use crate::error::{io_err, SyncError};
use crate::exclusion::ExclusionSet;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a single-file copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    /// Bytes and timestamps were copied to the target.
    Copied,
    /// The source path matches an exclusion pattern at copy time.
    Excluded,
    /// The source file no longer exists.
    SourceMissing,
}

/// Outcome of a single-path delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    /// The entry was removed; `pruned` empty parent directories went with it.
    Deleted { pruned: usize },
    /// Nothing existed at the target path.
    Missing,
}

// ---------------------------------------------------------------------------
// copy_single_file
// ---------------------------------------------------------------------------

/// Copy `rel` from the source root to the target root.
///
/// Exclusion is re-checked against the live source path first. Missing
/// parents are created, and the source's access and modification times are
/// applied to the copy so the next plan sees the pair as up to date.
pub fn copy_single_file(
    roots: &SyncRoots,
    rel: &str,
    exclusions: &ExclusionSet,
) -> Result<CopyResult, SyncError> {
    check_relative(rel)?;
    let source = roots.source.join(rel);
    let target = roots.target.join(rel);

    if exclusions.should_exclude(&source, &roots.source) {
        return Ok(CopyResult::Excluded);
    }

    let meta = match std::fs::metadata(&source) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(CopyResult::SourceMissing),
        Err(err) => return Err(io_err(&source, err)),
    };
    if !meta.is_file() {
        return Err(io_err(
            &source,
            std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    clear_readonly(&target)?;

    if let Err(err) = std::fs::copy(&source, &target) {
        if err.kind() != ErrorKind::PermissionDenied {
            return Err(io_err(&target, err));
        }
        tracing::debug!(path = %target.display(), "copy denied; clearing read-only and retrying");
        clear_readonly(&target)?;
        if let Some(parent) = target.parent() {
            clear_readonly(parent)?;
        }
        std::fs::copy(&source, &target).map_err(|e| io_err(&target, e))?;
    }

    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(&target, atime, mtime).map_err(|e| io_err(&target, e))?;

    Ok(CopyResult::Copied)
}

// ---------------------------------------------------------------------------
// delete_single_path
// ---------------------------------------------------------------------------

/// Remove `rel` from the target tree, then prune emptied parents.
///
/// A directory is removed with everything below it. Pruning walks upward from
/// the removed entry's parent, stops at the first non-empty directory, and
/// never removes `target_root` itself.
pub fn delete_single_path(target_root: &Path, rel: &str) -> Result<DeleteResult, SyncError> {
    check_relative(rel)?;
    let path = target_root.join(rel);

    let meta = match std::fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DeleteResult::Missing),
        Err(err) => return Err(io_err(&path, err)),
    };

    if meta.is_dir() {
        make_tree_writable(&path);
        std::fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
    } else {
        if !meta.file_type().is_symlink() {
            clear_readonly(&path)?;
        }
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != ErrorKind::PermissionDenied {
                return Err(io_err(&path, err));
            }
            if let Some(parent) = path.parent() {
                clear_readonly(parent)?;
            }
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
    }

    let pruned = prune_empty_parents(&path, target_root)?;
    Ok(DeleteResult::Deleted { pruned })
}

/// Remove empty directories from `removed`'s parent up to, not including, `root`.
fn prune_empty_parents(removed: &Path, root: &Path) -> Result<usize, SyncError> {
    let mut pruned = 0;
    let mut current = removed.parent();

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }

        let mut entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                current = dir.parent();
                continue;
            }
            Err(err) => return Err(io_err(dir, err)),
        };
        if entries.next().is_some() {
            break;
        }

        if let Err(err) = std::fs::remove_dir(dir) {
            if err.kind() != ErrorKind::PermissionDenied {
                return Err(io_err(dir, err));
            }
            clear_readonly(dir)?;
            if let Some(parent) = dir.parent() {
                clear_readonly(parent)?;
            }
            std::fs::remove_dir(dir).map_err(|e| io_err(dir, e))?;
        }

        tracing::debug!(path = %dir.display(), "removed empty directory");
        pruned += 1;
        current = dir.parent();
    }

    Ok(pruned)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Accept only plain `a/b/c` paths below the root.
///
/// `components()` silently drops interior `.` and empty segments, so the
/// segment count is compared too; otherwise `a/./b` would reach the prune
/// walk as `a/.`.
fn check_relative(rel: &str) -> Result<(), SyncError> {
    let path = Path::new(rel);
    let all_normal = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    let segments = rel.split(['/', std::path::MAIN_SEPARATOR]).count();
    if rel.is_empty() || !all_normal || path.components().count() != segments {
        return Err(SyncError::Config(format!(
            "'{rel}' is not a path relative to the sync root"
        )));
    }
    Ok(())
}

/// Give the owner write access to `path` if it has none. Returns whether
/// anything changed; a missing path or a symlink is left alone.
fn clear_readonly(path: &Path) -> Result<bool, SyncError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(io_err(path, err)),
    };
    if meta.file_type().is_symlink() {
        return Ok(false);
    }

    let mut perms = meta.permissions();
    if !perms.readonly() {
        return Ok(false);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    {
        perms.set_readonly(false);
    }

    std::fs::set_permissions(path, perms).map_err(|e| io_err(path, e))?;
    Ok(true)
}

/// Clear read-only bits across a subtree ahead of a recursive remove.
///
/// Directories are yielded before their contents, so each one is writable by
/// the time the walk lists it. Failures are logged; the remove reports them.
fn make_tree_writable(root: &Path) {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "cannot visit entry while clearing read-only");
                continue;
            }
        };
        if let Err(err) = clear_readonly(entry.path()) {
            tracing::debug!(error = %err, "cannot clear read-only");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::set_file_mtime;
    use std::fs;
    use tempfile::TempDir;

    struct Pair {
        src: TempDir,
        dst: TempDir,
    }

    impl Pair {
        fn new() -> Self {
            Self {
                src: TempDir::new().unwrap(),
                dst: TempDir::new().unwrap(),
            }
        }

        fn roots(&self) -> SyncRoots {
            SyncRoots::new(self.src.path(), self.dst.path())
        }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn copy_creates_parents_and_preserves_mtime() {
        let pair = Pair::new();
        let src = pair.src.path().join("deep/nested/file.txt");
        write(&src, "payload");
        set_file_mtime(&src, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let result = copy_single_file(&pair.roots(), "deep/nested/file.txt", &ExclusionSet::empty())
            .unwrap();
        assert_eq!(result, CopyResult::Copied);

        let dst = pair.dst.path().join("deep/nested/file.txt");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&dst).unwrap());
        assert_eq!(mtime, FileTime::from_unix_time(1_600_000_000, 0));
    }

    #[test]
    fn copy_skips_excluded_source() {
        let pair = Pair::new();
        write(&pair.src.path().join("temp.tmp"), "x");
        let set = ExclusionSet::new::<&str>(&[], &["*.tmp"], true);

        let result = copy_single_file(&pair.roots(), "temp.tmp", &set).unwrap();
        assert_eq!(result, CopyResult::Excluded);
        assert!(!pair.dst.path().join("temp.tmp").exists());
    }

    #[test]
    fn copy_reports_missing_source() {
        let pair = Pair::new();
        let result = copy_single_file(&pair.roots(), "gone.txt", &ExclusionSet::empty()).unwrap();
        assert_eq!(result, CopyResult::SourceMissing);
    }

    #[cfg(unix)]
    #[test]
    fn copy_overwrites_read_only_target() {
        let pair = Pair::new();
        write(&pair.src.path().join("ro.txt"), "new");
        let dst = pair.dst.path().join("ro.txt");
        write(&dst, "old");
        set_mode(&dst, 0o444);

        let result = copy_single_file(&pair.roots(), "ro.txt", &ExclusionSet::empty()).unwrap();
        assert_eq!(result, CopyResult::Copied);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
    }

    #[test]
    fn copy_rejects_escaping_paths() {
        let pair = Pair::new();
        for rel in ["", "../outside.txt", "/abs.txt", "a/../b.txt"] {
            let err = copy_single_file(&pair.roots(), rel, &ExclusionSet::empty()).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "{rel}: {err}");
        }
    }

    #[test]
    fn delete_file_prunes_empty_parents_but_not_root() {
        let dst = TempDir::new().unwrap();
        write(&dst.path().join("a/b/c/file.txt"), "x");

        let result = delete_single_path(dst.path(), "a/b/c/file.txt").unwrap();
        assert_eq!(result, DeleteResult::Deleted { pruned: 3 });
        assert!(!dst.path().join("a").exists());
        assert!(dst.path().exists(), "target root must survive");
    }

    #[test]
    fn delete_stops_pruning_at_first_non_empty_dir() {
        let dst = TempDir::new().unwrap();
        write(&dst.path().join("a/keep.txt"), "x");
        write(&dst.path().join("a/b/file.txt"), "x");

        let result = delete_single_path(dst.path(), "a/b/file.txt").unwrap();
        assert_eq!(result, DeleteResult::Deleted { pruned: 1 });
        assert!(!dst.path().join("a/b").exists());
        assert!(dst.path().join("a/keep.txt").exists());
    }

    #[test]
    fn delete_missing_is_consistent() {
        let dst = TempDir::new().unwrap();
        let result = delete_single_path(dst.path(), "never/existed.txt").unwrap();
        assert_eq!(result, DeleteResult::Missing);
    }

    #[test]
    fn delete_directory_removes_descendants() {
        let dst = TempDir::new().unwrap();
        write(&dst.path().join("tree/x.txt"), "x");
        write(&dst.path().join("tree/sub/y.txt"), "y");

        let result = delete_single_path(dst.path(), "tree").unwrap();
        assert_eq!(result, DeleteResult::Deleted { pruned: 0 });
        assert!(!dst.path().join("tree").exists());
    }

    #[cfg(unix)]
    #[test]
    fn delete_clears_read_only_entries() {
        let dst = TempDir::new().unwrap();
        write(&dst.path().join("locked/inner/file.txt"), "x");
        set_mode(&dst.path().join("locked/inner/file.txt"), 0o444);
        set_mode(&dst.path().join("locked/inner"), 0o555);
        set_mode(&dst.path().join("locked"), 0o555);

        delete_single_path(dst.path(), "locked").unwrap();
        assert!(!dst.path().join("locked").exists());
    }

    #[test]
    fn dotted_and_empty_segments_are_rejected_before_any_change() {
        let dst = TempDir::new().unwrap();
        write(&dst.path().join("a/b.txt"), "x");

        for rel in ["a/./b.txt", "./a/b.txt", "a//b.txt", "a/b.txt/"] {
            let err = delete_single_path(dst.path(), rel).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "{rel}: {err}");
        }
        assert!(dst.path().join("a/b.txt").exists());

        let result = delete_single_path(dst.path(), "a/b.txt").unwrap();
        assert_eq!(result, DeleteResult::Deleted { pruned: 1 });
    }

    #[test]
    fn delete_refuses_root() {
        let dst = TempDir::new().unwrap();
        let err = delete_single_path(dst.path(), ".").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)), "got: {err}");
        assert!(dst.path().exists());
    }
}
