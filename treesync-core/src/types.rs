//! Domain types for treesync.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Settings round-trip through serde + serde_yaml.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which side of a mirror a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Severity attached to a line handed to a sync reporter.
///
/// `Changed` and `Deleted` mark successful mutations so front ends can
/// highlight them apart from plain progress chatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Changed,
    Deleted,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Changed => write!(f, "changed"),
            Severity::Deleted => write!(f, "deleted"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// The (source, target) directory pair of one mirror operation.
///
/// The source is always authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRoots {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl SyncRoots {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Root directory for `side`.
    pub fn root(&self, side: Side) -> &Path {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Persisted mirror configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Absolute path to the authoritative tree.
    pub source: PathBuf,
    /// Absolute path to the mirrored tree.
    pub target: PathBuf,
    /// User exclusion patterns, one shell wildcard per line.
    #[serde(default)]
    pub exclusions: String,
    /// Remove target files that no longer exist in the source.
    #[serde(default = "default_true")]
    pub delete_files: bool,
    /// Act on change notifications while the daemon is monitoring.
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    pub updated_at: DateTime<Utc>,
}

impl SyncSettings {
    /// Settings for a new mirror with every flag at its default.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            exclusions: String::new(),
            delete_files: true,
            auto_sync: true,
            case_sensitive: true,
            updated_at: Utc::now(),
        }
    }

    pub fn roots(&self) -> SyncRoots {
        SyncRoots::new(self.source.clone(), self.target.clone())
    }

    /// Parsed form of [`SyncSettings::exclusions`].
    pub fn user_patterns(&self) -> Vec<String> {
        parse_user_patterns(&self.exclusions)
    }

    /// Replace the exclusion text with one pattern per line.
    pub fn set_user_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) {
        self.exclusions = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
    }
}

/// Split newline-separated exclusion text into trimmed, non-empty patterns.
///
/// `#` has no special meaning here; only the ignore file has comments.
pub fn parse_user_patterns(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_patterns_skips_blank_lines() {
        let patterns = parse_user_patterns("*.tmp\n\n   \n  build/*  \r\n#literal\n");
        assert_eq!(patterns, vec!["*.tmp", "build/*", "#literal"]);
    }

    #[test]
    fn set_user_patterns_normalizes_text() {
        let mut settings = SyncSettings::new("/src", "/dst");
        settings.set_user_patterns(&[" *.log ", "", "cache/*"]);
        assert_eq!(settings.exclusions, "*.log\ncache/*");
        assert_eq!(settings.user_patterns(), vec!["*.log", "cache/*"]);
    }

    #[test]
    fn roots_pick_side() {
        let roots = SyncRoots::new("/a", "/b");
        assert_eq!(roots.root(Side::Source), Path::new("/a"));
        assert_eq!(roots.root(Side::Target), Path::new("/b"));
    }

    #[test]
    fn missing_flags_default_to_true() {
        let yaml = "source: /a\ntarget: /b\nupdated_at: 2026-01-01T00:00:00Z\n";
        let settings: SyncSettings = serde_yaml::from_str(yaml).expect("deserialize");
        assert!(settings.delete_files);
        assert!(settings.auto_sync);
        assert!(settings.case_sensitive);
        assert!(settings.exclusions.is_empty());
    }

    #[test]
    fn severity_display() {
        assert_eq!(Severity::Changed.to_string(), "changed");
        assert_eq!(Side::Target.to_string(), "target");
    }
}
