//! Flat shell-wildcard exclusion.
//!
//! Patterns are matched against the whole forward-slash relative path using
//! `fnmatch` rules: `*` also crosses `/`, leading dots are not special, and
//! there is no negation, anchoring or directory scoping. `build/` therefore
//! does not exclude `build/out.o`; `build/*` does.

use std::io::ErrorKind;
use std::path::Path;

use glob::{MatchOptions, Pattern};

pub use treesync_core::parse_user_patterns;

/// Ignore file read from the root of the source tree.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Read `<root>/.gitignore` into an ordered list of patterns.
///
/// Blank lines and lines starting with `#` are skipped. A missing file yields
/// an empty list; any other read failure is logged and also yields an empty
/// list.
pub fn read_ignore_file(root: &Path) -> Vec<String> {
    let path = root.join(IGNORE_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect(),
        Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read ignore file; continuing without it",
            );
            Vec::new()
        }
    }
}

/// `path` relative to `root`, with `/` separators.
///
/// `None` when `path` is not under `root`, is `root` itself, or has a
/// component that is not valid UTF-8.
pub fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Compiled exclusion patterns: ignore-file patterns first, then user patterns.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    ignore: Vec<Pattern>,
    user: Vec<Pattern>,
    options: MatchOptions,
}

impl ExclusionSet {
    pub fn new<S: AsRef<str>>(ignore: &[S], user: &[S], case_sensitive: bool) -> Self {
        Self {
            ignore: ignore.iter().map(|p| compile(p.as_ref())).collect(),
            user: user.iter().map(|p| compile(p.as_ref())).collect(),
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        }
    }

    /// A set that excludes nothing.
    pub fn empty() -> Self {
        Self::new::<&str>(&[], &[], true)
    }

    /// Re-read the ignore file under `root` and combine it with `user`.
    pub fn load(root: &Path, user: &[String], case_sensitive: bool) -> Self {
        let ignore = read_ignore_file(root);
        Self::new(&ignore, user, case_sensitive)
    }

    /// True iff the relative form of `path` matches any pattern.
    ///
    /// Paths that cannot be made relative to `root` are never excluded.
    pub fn should_exclude(&self, path: &Path, root: &Path) -> bool {
        match relative_path(path, root) {
            Some(rel) => self.matches_relative(&rel),
            None => false,
        }
    }

    /// True iff `rel` matches an ignore pattern or a user pattern, in that order.
    pub fn matches_relative(&self, rel: &str) -> bool {
        self.ignore
            .iter()
            .chain(self.user.iter())
            .any(|pattern| pattern.matches_with(rel, self.options))
    }

    pub fn ignore_patterns(&self) -> Vec<&str> {
        self.ignore.iter().map(Pattern::as_str).collect()
    }

    pub fn user_patterns(&self) -> Vec<&str> {
        self.user.iter().map(Pattern::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ignore.is_empty() && self.user.is_empty()
    }
}

/// Compile one pattern with `fnmatch` semantics.
///
/// Runs of `*` collapse to one (`**` is not recursive here). A pattern that
/// still fails to compile is matched literally.
fn compile(raw: &str) -> Pattern {
    let mut collapsed = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '*' && collapsed.ends_with('*') {
            continue;
        }
        collapsed.push(ch);
    }

    match Pattern::new(&collapsed) {
        Ok(pattern) => pattern,
        Err(err) => {
            tracing::warn!(pattern = raw, error = %err, "invalid exclusion pattern; matching it literally");
            Pattern::new(&Pattern::escape(raw)).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[rstest]
    #[case::suffix("*.tmp", "temp.tmp", true)]
    #[case::star_crosses_separator("*.tmp", "sub/dir/x.tmp", true)]
    #[case::trailing_slash_is_literal("build/", "build/out.o", false)]
    #[case::dir_prefix("build/*", "build/deep/out.o", true)]
    #[case::single_char("?.txt", "a.txt", true)]
    #[case::single_char_too_long("?.txt", "ab.txt", false)]
    #[case::class("[ab].txt", "b.txt", true)]
    #[case::negated_class("[!ab].txt", "c.txt", true)]
    #[case::dotfile_not_special("*.log", ".hidden.log", true)]
    #[case::no_negation("!keep.txt", "keep.txt", false)]
    #[case::double_star_is_single("src/**/x.rs", "src/x.rs", false)]
    #[case::double_star_nested("src/**/x.rs", "src/a/b/x.rs", true)]
    #[case::double_star_mid_word("a**b", "axxb", true)]
    #[case::unclosed_class_is_literal("[abc", "[abc", true)]
    #[case::whole_string("a.txt", "dir/a.txt", false)]
    fn fnmatch_semantics(#[case] pattern: &str, #[case] rel: &str, #[case] expected: bool) {
        let set = ExclusionSet::new(&[pattern], &[], true);
        assert_eq!(set.matches_relative(rel), expected, "{pattern} vs {rel}");
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let sensitive = ExclusionSet::new::<&str>(&[], &["*.TMP"], true);
        let insensitive = ExclusionSet::new::<&str>(&[], &["*.TMP"], false);
        assert!(!sensitive.matches_relative("x.tmp"));
        assert!(insensitive.matches_relative("x.tmp"));
    }

    #[test]
    fn never_matches_absolute_path() {
        let root = PathBuf::from("/data/root");
        let set = ExclusionSet::new::<&str>(&[], &["/data/root/*"], true);
        assert!(!set.should_exclude(&root.join("a.txt"), &root));
    }

    #[test]
    fn path_outside_root_is_not_excluded() {
        let set = ExclusionSet::new::<&str>(&[], &["*"], true);
        assert!(!set.should_exclude(Path::new("/elsewhere/a.tmp"), Path::new("/data/root")));
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = PathBuf::from("/r");
        let path = root.join("a").join("b").join("c.txt");
        assert_eq!(relative_path(&path, &root).as_deref(), Some("a/b/c.txt"));
        assert_eq!(relative_path(&root, &root), None);
    }

    #[test]
    fn ignore_file_skips_comments_and_blanks() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(IGNORE_FILE_NAME),
            "# build output\n*.o\n\n   \n  *.log  \n#*.rs\n",
        )
        .unwrap();
        assert_eq!(read_ignore_file(tmp.path()), vec!["*.o", "*.log"]);
    }

    #[test]
    fn missing_ignore_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_ignore_file(tmp.path()).is_empty());
    }

    #[test]
    fn unreadable_ignore_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be fails the read.
        fs::create_dir(tmp.path().join(IGNORE_FILE_NAME)).unwrap();
        assert!(read_ignore_file(tmp.path()).is_empty());
    }

    #[test]
    fn load_combines_ignore_file_and_user_patterns() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(IGNORE_FILE_NAME), "*.o\n").unwrap();
        let set = ExclusionSet::load(tmp.path(), &["*.tmp".to_string()], true);
        assert_eq!(set.ignore_patterns(), vec!["*.o"]);
        assert_eq!(set.user_patterns(), vec!["*.tmp"]);
        assert!(set.should_exclude(&tmp.path().join("main.o"), tmp.path()));
        assert!(set.should_exclude(&tmp.path().join("x.tmp"), tmp.path()));
        assert!(!set.should_exclude(&tmp.path().join("main.c"), tmp.path()));
    }

    #[test]
    fn empty_set_excludes_nothing() {
        let set = ExclusionSet::empty();
        assert!(set.is_empty());
        assert!(!set.matches_relative("anything"));
    }
}
