//! Live change monitor for the source tree.
//!
//! Raw `notify` events are normalized into [`ChangeEvent`]s, debounced per
//! relative path, filtered through the exclusion set and forwarded to a
//! [`ChangeSink`]. The monitor never writes to the target tree itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use treesync_sync::exclusion::relative_path;
use treesync_sync::ExclusionSet;

use crate::error::{io_err, DaemonError};

/// Minimum interval between two accepted notifications for the same path.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Debounce entries older than this are dropped on the next lookup.
const DEBOUNCE_RETENTION: Duration = Duration::from_secs(30);

/// Receives normalized changes, as relative forward-slash paths.
///
/// Called on the watcher's backend thread.
pub trait ChangeSink: Send + Sync {
    fn sync_file(&self, rel: &str);
    fn delete_file(&self, rel: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved { from: String },
}

/// One normalized change under the monitored root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: String,
}

impl ChangeEvent {
    fn new(kind: ChangeKind, path: String) -> Self {
        Self { kind, path }
    }
}

/// User-facing exclusion inputs. The ignore file is re-read per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFilter {
    pub user_patterns: Vec<String>,
    pub case_sensitive: bool,
}

impl MonitorFilter {
    pub fn new(user_patterns: Vec<String>, case_sensitive: bool) -> Self {
        Self {
            user_patterns,
            case_sensitive,
        }
    }
}

// ---------------------------------------------------------------------------
// Debouncer
// ---------------------------------------------------------------------------

/// Leading-edge suppression keyed on relative path.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Accept `key` unless it was accepted less than one window before `now`.
    pub fn should_accept(&mut self, key: &str, now: Instant) -> bool {
        let retention = self.window.max(DEBOUNCE_RETENTION);
        self.last_accepted
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= retention);

        match self.last_accepted.get(key) {
            Some(last) if now.saturating_duration_since(*last) < self.window => false,
            _ => {
                self.last_accepted.insert(key.to_string(), now);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.last_accepted.clear();
    }

    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EventNormalizer
// ---------------------------------------------------------------------------

/// Turns raw notifications for one root into sink calls.
#[derive(Debug)]
pub struct EventNormalizer {
    root: PathBuf,
    filter: MonitorFilter,
    debouncer: Debouncer,
}

impl EventNormalizer {
    pub fn new(root: impl Into<PathBuf>, filter: MonitorFilter, cooldown: Duration) -> Self {
        Self {
            root: root.into(),
            filter,
            debouncer: Debouncer::new(cooldown),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a raw event onto a change under the root.
    ///
    /// Directory events, access events and paths outside the root yield
    /// `None`. A rename whose other half lies outside the root degrades to a
    /// plain create or delete.
    pub fn normalize(&self, event: &Event) -> Option<ChangeEvent> {
        let first = event.paths.first()?;

        match &event.kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => None,
            EventKind::Create(_) => self.file_event(ChangeKind::Created, first),
            EventKind::Remove(_) => self.deleted(first),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let to = event.paths.get(1)?;
                match (self.rel(first), self.rel(to)) {
                    (Some(from), Some(_)) if to.is_dir() => {
                        tracing::debug!(from = %from, "directory rename ignored");
                        None
                    }
                    (Some(from), Some(to)) => {
                        Some(ChangeEvent::new(ChangeKind::Moved { from }, to))
                    }
                    (None, Some(_)) => self.file_event(ChangeKind::Created, to),
                    (Some(from), None) => Some(ChangeEvent::new(ChangeKind::Deleted, from)),
                    (None, None) => None,
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => self.deleted(first),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                self.file_event(ChangeKind::Created, first)
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                if first.exists() {
                    self.file_event(ChangeKind::Created, first)
                } else {
                    self.deleted(first)
                }
            }
            EventKind::Modify(_) => self.file_event(ChangeKind::Modified, first),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }

    /// Normalize, debounce, filter and dispatch one raw event.
    pub fn handle(&mut self, event: &Event, now: Instant, sink: &dyn ChangeSink) {
        let Some(change) = self.normalize(event) else {
            return;
        };

        if !self.debouncer.should_accept(&change.path, now) {
            tracing::trace!(path = %change.path, "debounced");
            return;
        }

        let exclusions = ExclusionSet::load(
            &self.root,
            &self.filter.user_patterns,
            self.filter.case_sensitive,
        );
        let excluded = |rel: &str| {
            let hit = exclusions.matches_relative(rel);
            if hit {
                tracing::info!(path = %rel, "ignored change to excluded path");
            }
            hit
        };

        match change.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                if !excluded(&change.path) {
                    sink.sync_file(&change.path);
                }
            }
            ChangeKind::Deleted => {
                if !excluded(&change.path) {
                    sink.delete_file(&change.path);
                }
            }
            ChangeKind::Moved { from } => {
                if !excluded(&from) {
                    sink.delete_file(&from);
                }
                if !excluded(&change.path) {
                    sink.sync_file(&change.path);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.debouncer.clear();
    }

    fn rel(&self, path: &Path) -> Option<String> {
        relative_path(path, &self.root)
    }

    fn file_event(&self, kind: ChangeKind, path: &Path) -> Option<ChangeEvent> {
        if path.is_dir() {
            return None;
        }
        Some(ChangeEvent::new(kind, self.rel(path)?))
    }

    fn deleted(&self, path: &Path) -> Option<ChangeEvent> {
        Some(ChangeEvent::new(ChangeKind::Deleted, self.rel(path)?))
    }
}

// ---------------------------------------------------------------------------
// ChangeMonitor
// ---------------------------------------------------------------------------

struct Running {
    root: PathBuf,
    normalizer: Arc<Mutex<EventNormalizer>>,
    watcher: RecommendedWatcher,
}

/// Recursive watch on one root, `Stopped` until [`ChangeMonitor::start`].
#[derive(Default)]
pub struct ChangeMonitor {
    running: Option<Running>,
}

impl ChangeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        root: &Path,
        filter: MonitorFilter,
        sink: Arc<dyn ChangeSink>,
    ) -> Result<(), DaemonError> {
        self.start_with_cooldown(root, filter, sink, DEFAULT_COOLDOWN)
    }

    /// Start watching `root`. On failure the monitor stays stopped.
    pub fn start_with_cooldown(
        &mut self,
        root: &Path,
        filter: MonitorFilter,
        sink: Arc<dyn ChangeSink>,
        cooldown: Duration,
    ) -> Result<(), DaemonError> {
        if let Some(running) = &self.running {
            return Err(DaemonError::Monitor(format!(
                "already monitoring {}",
                running.root.display()
            )));
        }
        if root.as_os_str().is_empty() {
            return Err(DaemonError::Monitor("monitor root is empty".to_string()));
        }
        if !root.is_dir() {
            return Err(DaemonError::Monitor(format!(
                "{} is not an existing directory",
                root.display()
            )));
        }

        // Backends such as FSEvents report real paths; match them against the
        // canonical root.
        let root = std::fs::canonicalize(root).map_err(|e| io_err(root, e))?;
        let normalizer = Arc::new(Mutex::new(EventNormalizer::new(
            root.clone(),
            filter,
            cooldown,
        )));

        let handler = normalizer.clone();
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                let mut normalizer = match handler.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                normalizer.handle(&event, Instant::now(), sink.as_ref());
            }
            Err(err) => tracing::warn!(error = %err, "watcher event error"),
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tracing::info!(root = %root.display(), "monitoring started");
        self.running = Some(Running {
            root,
            normalizer,
            watcher,
        });
        Ok(())
    }

    /// Release the watch and forget debounce state. No-op when stopped.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        drop(running.watcher);
        if let Ok(mut normalizer) = running.normalizer.lock() {
            normalizer.clear();
        }
        tracing::info!(root = %running.root.display(), "monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.root.as_path())
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
