//! Apply a [`SyncPlan`] to the target tree.

use serde::Serialize;

use treesync_core::{Severity, SyncRoots};

use crate::exclusion::ExclusionSet;
use crate::planner::SyncPlan;
use crate::report::{CancelFlag, SyncReporter};
use crate::writer::{copy_single_file, delete_single_path, CopyResult, DeleteResult};

/// Counts accumulated while a plan executes.
///
/// When `cancelled` is set the counts cover only the items finished before
/// the flag was seen. Nothing is rolled back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub copied: usize,
    pub deleted: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Run every copy, then every delete, reporting after each item.
///
/// A failing item is logged and counted in `failed`; it never aborts the rest
/// of the plan. With `trial_run` nothing is written and each item is reported
/// as "would copy" / "would delete".
pub fn execute(
    plan: &SyncPlan,
    roots: &SyncRoots,
    exclusions: &ExclusionSet,
    trial_run: bool,
    reporter: &dyn SyncReporter,
    cancel: &CancelFlag,
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let total = plan.total();
    if total == 0 {
        return outcome;
    }

    let mut completed = 0usize;

    for rel in &plan.copy {
        if cancel.is_cancelled() {
            return cancelled(outcome, reporter);
        }

        if trial_run {
            reporter.log(Severity::Changed, &format!("would copy: {rel}"));
            outcome.copied += 1;
        } else {
            match copy_single_file(roots, rel, exclusions) {
                Ok(CopyResult::Copied) => {
                    reporter.log(Severity::Changed, &format!("copied: {rel}"));
                    outcome.copied += 1;
                }
                Ok(CopyResult::Excluded) => {
                    reporter.log(Severity::Info, &format!("excluded: {rel}"));
                }
                Ok(CopyResult::SourceMissing) => {
                    reporter.log(Severity::Warning, &format!("source vanished: {rel}"));
                }
                Err(err) => {
                    reporter.log(Severity::Error, &format!("copy failed: {rel}: {err}"));
                    outcome.failed += 1;
                }
            }
        }
        completed += 1;
        reporter.progress(completed as f64 / total as f64 * 100.0);
    }

    for rel in &plan.delete {
        if cancel.is_cancelled() {
            return cancelled(outcome, reporter);
        }

        if trial_run {
            reporter.log(Severity::Deleted, &format!("would delete: {rel}"));
            outcome.deleted += 1;
        } else {
            match delete_single_path(&roots.target, rel) {
                Ok(DeleteResult::Deleted { .. }) => {
                    reporter.log(Severity::Deleted, &format!("deleted: {rel}"));
                    outcome.deleted += 1;
                }
                Ok(DeleteResult::Missing) => {}
                Err(err) => {
                    reporter.log(Severity::Error, &format!("delete failed: {rel}: {err}"));
                    outcome.failed += 1;
                }
            }
        }
        completed += 1;
        reporter.progress(completed as f64 / total as f64 * 100.0);
    }

    outcome
}

fn cancelled(mut outcome: SyncOutcome, reporter: &dyn SyncReporter) -> SyncOutcome {
    reporter.log(Severity::Warning, "sync cancelled");
    outcome.cancelled = true;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records everything it is told.
    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(Severity, String)>>,
        progress: Mutex<Vec<f64>>,
    }

    impl SyncReporter for Recorder {
        fn log(&self, severity: Severity, message: &str) {
            self.lines
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }

        fn progress(&self, percent: f64) {
            self.progress.lock().unwrap().push(percent);
        }
    }

    /// Cancels the shared flag after a fixed number of progress reports.
    struct CancelAfter {
        remaining: Mutex<usize>,
        flag: CancelFlag,
    }

    impl SyncReporter for CancelAfter {
        fn log(&self, _severity: Severity, _message: &str) {}

        fn progress(&self, _percent: f64) {
            let mut remaining = self.remaining.lock().unwrap();
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.flag.cancel();
            }
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (TempDir, TempDir, SyncRoots) {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let roots = SyncRoots::new(src.path(), dst.path());
        (src, dst, roots)
    }

    #[test]
    fn empty_plan_reports_nothing() {
        let (_s, _d, roots) = fixture();
        let rec = Recorder::default();
        let outcome = execute(
            &SyncPlan::default(),
            &roots,
            &ExclusionSet::empty(),
            false,
            &rec,
            &CancelFlag::new(),
        );
        assert_eq!(outcome, SyncOutcome::default());
        assert!(rec.progress.lock().unwrap().is_empty());
    }

    #[test]
    fn copies_then_deletes_with_progress() {
        let (src, dst, roots) = fixture();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        fs::write(dst.path().join("old.txt"), "old").unwrap();

        let plan = SyncPlan {
            copy: set(&["a.txt"]),
            delete: set(&["old.txt"]),
        };
        let rec = Recorder::default();
        let outcome = execute(
            &plan,
            &roots,
            &ExclusionSet::empty(),
            false,
            &rec,
            &CancelFlag::new(),
        );

        assert_eq!(
            outcome,
            SyncOutcome {
                copied: 1,
                deleted: 1,
                failed: 0,
                cancelled: false
            }
        );
        assert!(dst.path().join("a.txt").exists());
        assert!(!dst.path().join("old.txt").exists());
        assert_eq!(*rec.progress.lock().unwrap(), vec![50.0, 100.0]);

        let lines = rec.lines.lock().unwrap();
        assert_eq!(lines[0], (Severity::Changed, "copied: a.txt".to_string()));
        assert_eq!(lines[1], (Severity::Deleted, "deleted: old.txt".to_string()));
    }

    #[test]
    fn trial_run_counts_without_touching_disk() {
        let (src, dst, roots) = fixture();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        fs::write(dst.path().join("old.txt"), "old").unwrap();

        let plan = SyncPlan {
            copy: set(&["a.txt"]),
            delete: set(&["old.txt"]),
        };
        let rec = Recorder::default();
        let outcome = execute(
            &plan,
            &roots,
            &ExclusionSet::empty(),
            true,
            &rec,
            &CancelFlag::new(),
        );

        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.deleted, 1);
        assert!(!dst.path().join("a.txt").exists());
        assert!(dst.path().join("old.txt").exists());
        let lines = rec.lines.lock().unwrap();
        assert!(lines.iter().any(|(_, m)| m == "would copy: a.txt"));
        assert!(lines.iter().any(|(_, m)| m == "would delete: old.txt"));
    }

    #[test]
    fn excluded_and_missing_items_are_not_counted() {
        let (src, _dst, roots) = fixture();
        fs::write(src.path().join("skip.tmp"), "x").unwrap();

        let plan = SyncPlan {
            copy: set(&["skip.tmp", "ghost.txt"]),
            delete: set(&["never-there.txt"]),
        };
        let exclusions = ExclusionSet::new::<&str>(&[], &["*.tmp"], true);
        let rec = Recorder::default();
        let outcome = execute(&plan, &roots, &exclusions, false, &rec, &CancelFlag::new());

        assert_eq!(outcome, SyncOutcome::default());
        assert_eq!(rec.progress.lock().unwrap().len(), 3);
    }

    #[test]
    fn failure_is_counted_and_run_continues() {
        let (src, dst, roots) = fixture();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        fs::write(src.path().join("b.txt"), "b").unwrap();
        // A directory in the way makes the first copy fail.
        fs::create_dir(dst.path().join("a.txt")).unwrap();
        fs::write(dst.path().join("a.txt/inner"), "x").unwrap();

        let plan = SyncPlan {
            copy: set(&["a.txt", "b.txt"]),
            delete: BTreeSet::new(),
        };
        let outcome = execute(
            &plan,
            &roots,
            &ExclusionSet::empty(),
            false,
            &Recorder::default(),
            &CancelFlag::new(),
        );

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.copied, 1);
        assert!(dst.path().join("b.txt").exists());
    }

    #[test]
    fn cancellation_stops_before_next_item() {
        let (src, dst, roots) = fixture();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(src.path().join(name), name).unwrap();
        }
        let plan = SyncPlan {
            copy: set(&["a.txt", "b.txt", "c.txt"]),
            delete: BTreeSet::new(),
        };

        let flag = CancelFlag::new();
        let reporter = CancelAfter {
            remaining: Mutex::new(1),
            flag: flag.clone(),
        };
        let outcome = execute(&plan, &roots, &ExclusionSet::empty(), false, &reporter, &flag);

        assert!(outcome.cancelled);
        assert_eq!(outcome.copied, 1);
        assert!(dst.path().join("a.txt").exists());
        assert!(!dst.path().join("b.txt").exists());
        assert!(!dst.path().join("c.txt").exists());
    }

    #[test]
    fn pre_cancelled_flag_does_nothing() {
        let (src, dst, roots) = fixture();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        let plan = SyncPlan {
            copy: set(&["a.txt"]),
            delete: BTreeSet::new(),
        };
        let flag = CancelFlag::new();
        flag.cancel();

        let outcome = execute(
            &plan,
            &roots,
            &ExclusionSet::empty(),
            false,
            &Recorder::default(),
            &flag,
        );
        assert!(outcome.cancelled);
        assert_eq!(outcome.copied, 0);
        assert!(!dst.path().join("a.txt").exists());
    }
}
