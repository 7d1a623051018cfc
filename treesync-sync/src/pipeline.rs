//! Shared sync pipeline entrypoint used by the CLI and the daemon.
//!
//! One run validates the roots, rebuilds the exclusion set (re-reading the
//! ignore file), inventories both trees, plans, and executes.

use std::path::PathBuf;

use treesync_core::{Severity, Side, SyncRoots, SyncSettings};

use crate::exclusion::ExclusionSet;
use crate::executor::{execute, SyncOutcome};
use crate::inventory::build_inventory;
use crate::planner::{plan, SyncPlan};
use crate::report::{CancelFlag, SyncReporter};
use crate::{error::io_err, SyncError};

/// Everything one synchronization needs, supplied per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub roots: SyncRoots,
    pub user_patterns: Vec<String>,
    pub delete_enabled: bool,
    pub trial_run: bool,
    pub case_sensitive: bool,
}

impl SyncRequest {
    pub fn from_settings(settings: &SyncSettings, trial_run: bool) -> Self {
        Self {
            roots: settings.roots(),
            user_patterns: settings.user_patterns(),
            delete_enabled: settings.delete_files,
            trial_run,
            case_sensitive: settings.case_sensitive,
        }
    }

    /// Ignore file of the source root plus the user patterns, read fresh.
    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::load(&self.roots.source, &self.user_patterns, self.case_sensitive)
    }
}

/// Check that both roots are existing directories that neither coincide nor nest.
pub fn validate_roots(roots: &SyncRoots) -> Result<(), SyncError> {
    for side in [Side::Source, Side::Target] {
        let root = roots.root(side);
        if root.as_os_str().is_empty() {
            return Err(SyncError::Config(format!("{side} root is empty")));
        }
        match std::fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SyncError::Config(format!(
                    "{side} root {} is not a directory",
                    root.display()
                )))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::Config(format!(
                    "{side} root {} does not exist",
                    root.display()
                )))
            }
            Err(err) => return Err(io_err(root, err)),
        }
    }

    let source = std::fs::canonicalize(&roots.source).map_err(|e| io_err(&roots.source, e))?;
    let target = std::fs::canonicalize(&roots.target).map_err(|e| io_err(&roots.target, e))?;

    if source == target {
        return Err(SyncError::Config(format!(
            "source and target are the same directory: {}",
            source.display()
        )));
    }
    if target.starts_with(&source) {
        return Err(SyncError::Config(format!(
            "target {} is inside source {}",
            target.display(),
            source.display()
        )));
    }
    if source.starts_with(&target) {
        return Err(SyncError::Config(format!(
            "source {} is inside target {}",
            source.display(),
            target.display()
        )));
    }
    Ok(())
}

/// Compute the plan a run would execute, without executing it.
pub fn preview(request: &SyncRequest) -> Result<SyncPlan, SyncError> {
    validate_roots(&request.roots)?;
    let exclusions = request.exclusions();
    scan_and_plan(request, &exclusions).map(|scanned| scanned.plan)
}

/// Run one full synchronization.
///
/// Scan failures on either root abort the run before anything is written, so
/// an unreadable source can never turn into a plan that empties the target.
pub fn run(
    request: &SyncRequest,
    reporter: &dyn SyncReporter,
    cancel: &CancelFlag,
) -> Result<SyncOutcome, SyncError> {
    validate_roots(&request.roots)?;
    let exclusions = request.exclusions();

    let ignore = exclusions.ignore_patterns();
    if !ignore.is_empty() {
        reporter.log(
            Severity::Info,
            &format!("ignore file patterns: {}", ignore.join(", ")),
        );
    }
    let user = exclusions.user_patterns();
    if !user.is_empty() {
        reporter.log(Severity::Info, &format!("user patterns: {}", user.join(", ")));
    }

    let Scanned {
        plan,
        unrepresentable,
    } = scan_and_plan(request, &exclusions)?;
    for path in &unrepresentable {
        reporter.log(
            Severity::Error,
            &format!("file name is not valid UTF-8, not mirrored: {}", path.display()),
        );
    }
    reporter.log(
        Severity::Info,
        &format!(
            "{} file(s) to copy, {} to delete{}",
            plan.copy.len(),
            plan.delete.len(),
            if request.trial_run { " (trial run)" } else { "" }
        ),
    );

    let mut outcome = execute(
        &plan,
        &request.roots,
        &exclusions,
        request.trial_run,
        reporter,
        cancel,
    );
    outcome.failed += unrepresentable.len();

    tracing::info!(
        source = %request.roots.source.display(),
        target = %request.roots.target.display(),
        copied = outcome.copied,
        deleted = outcome.deleted,
        failed = outcome.failed,
        cancelled = outcome.cancelled,
        trial_run = request.trial_run,
        "sync finished",
    );
    Ok(outcome)
}

/// A plan plus the files no plan can name.
struct Scanned {
    plan: SyncPlan,
    unrepresentable: Vec<PathBuf>,
}

fn scan_and_plan(request: &SyncRequest, exclusions: &ExclusionSet) -> Result<Scanned, SyncError> {
    let source = build_inventory(&request.roots.source, exclusions)?;
    let target = build_inventory(&request.roots.target, exclusions)?;
    let plan = plan(
        &source.files,
        &target.files,
        &request.roots,
        request.delete_enabled,
    );

    let mut unrepresentable = source.unrepresentable;
    // A target-only name is an orphan that cannot be deleted; one that also
    // exists in the source was counted above.
    if request.delete_enabled {
        unrepresentable.extend(target.unrepresentable.into_iter().filter(|path| {
            path.strip_prefix(&request.roots.target)
                .map(|rel| !request.roots.source.join(rel).exists())
                .unwrap_or(true)
        }));
    }
    Ok(Scanned {
        plan,
        unrepresentable,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::report::NullReporter;

    fn request(src: &Path, dst: &Path) -> SyncRequest {
        SyncRequest {
            roots: SyncRoots::new(src, dst),
            user_patterns: Vec::new(),
            delete_enabled: true,
            trial_run: false,
            case_sensitive: true,
        }
    }

    #[test]
    fn missing_source_is_config_error_and_target_untouched() {
        let tmp = TempDir::new().expect("tmp");
        let dst = tmp.path().join("dst");
        fs::create_dir(&dst).expect("mkdir");
        fs::write(dst.join("keep.txt"), "x").expect("write");

        let err = run(
            &request(&tmp.path().join("missing"), &dst),
            &NullReporter,
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)), "got: {err}");
        assert!(dst.join("keep.txt").exists());
    }

    #[test]
    fn nested_roots_are_rejected() {
        let tmp = TempDir::new().expect("tmp");
        let inner = tmp.path().join("inner");
        fs::create_dir(&inner).expect("mkdir");

        for roots in [
            SyncRoots::new(tmp.path(), &inner),
            SyncRoots::new(&inner, tmp.path()),
            SyncRoots::new(tmp.path(), tmp.path()),
        ] {
            let err = validate_roots(&roots).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "got: {err}");
        }
    }

    #[test]
    fn file_root_is_rejected() {
        let tmp = TempDir::new().expect("tmp");
        let file = tmp.path().join("file.txt");
        fs::write(&file, "x").expect("write");
        let dst = TempDir::new().expect("dst");

        let err = validate_roots(&SyncRoots::new(&file, dst.path())).unwrap_err();
        assert!(err.to_string().contains("not a directory"), "got: {err}");
    }

    #[test]
    fn from_settings_carries_every_flag() {
        let mut settings = SyncSettings::new("/s", "/t");
        settings.delete_files = false;
        settings.case_sensitive = false;
        settings.set_user_patterns(&["*.tmp", "build/*"]);

        let req = SyncRequest::from_settings(&settings, true);
        assert_eq!(req.roots, SyncRoots::new("/s", "/t"));
        assert_eq!(req.user_patterns, vec!["*.tmp", "build/*"]);
        assert!(!req.delete_enabled);
        assert!(!req.case_sensitive);
        assert!(req.trial_run);
    }
}
