//! Capabilities handed to the executor: a reporter and a cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use treesync_core::Severity;

/// Receives per-item log lines and progress while a plan executes.
///
/// Called from whichever thread runs the sync; implementations marshal to
/// their own context if they need to.
pub trait SyncReporter: Send + Sync {
    fn log(&self, severity: Severity, message: &str);

    /// `percent` is in `0.0..=100.0`.
    fn progress(&self, _percent: f64) {}
}

/// Routes reporter output into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl SyncReporter for TracingReporter {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info | Severity::Changed | Severity::Deleted => {
                tracing::info!(kind = %severity, "{message}")
            }
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }

    fn progress(&self, percent: f64) {
        tracing::debug!(percent, "sync progress");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl SyncReporter for NullReporter {
    fn log(&self, _severity: Severity, _message: &str) {}
}

/// Cooperative cancellation shared between a running sync and its controller.
///
/// Checked once per plan item, never in the middle of a copy.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the flag can guard the next run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
        observer.reset();
        assert!(!flag.is_cancelled());
    }
}
