//! Include/exclude filtering of relative paths.
//!
//! Patterns use shell glob syntax and are matched against the whole
//! POSIX-style relative path, so `*` also crosses `/` (`*.csv` matches
//! `2024/q1.csv`). Rules, in order:
//!
//! 1. A path with any segment starting with `.` is hidden and only passes when
//!    it was explicitly included.
//! 2. With include patterns present, the path must match one of them.
//! 3. A path matching any exclude pattern is dropped; excludes always win.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::utils::errors::{Result, SyncError};

/// Marker that makes a path segment hidden.
const HIDDEN_MARKER: char = '.';

/// Compiled include/exclude rules for one run.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
}

impl PathFilter {
    /// Compile include and exclude patterns.
    ///
    /// # Errors
    /// Returns `SyncError::Glob` if any pattern is invalid.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include.to_vec(),
            exclude: exclude.to_vec(),
            include_set: compile(include)?,
            exclude_set: compile(exclude)?,
        })
    }

    /// Whether the path matches an include pattern, independent of hidden status.
    pub fn is_explicitly_included(&self, rel_path: &str) -> bool {
        self.include_set
            .as_ref()
            .is_some_and(|set| set.is_match(rel_path))
    }

    /// Decide whether `rel_path` participates in the run.
    pub fn included(&self, rel_path: &str, explicitly_included: bool) -> bool {
        if is_hidden(rel_path) && !explicitly_included {
            return false;
        }

        if let Some(set) = &self.include_set {
            if !set.is_match(rel_path) {
                return false;
            }
        }

        match &self.exclude_set {
            Some(set) => !set.is_match(rel_path),
            None => true,
        }
    }

    /// Convenience wrapper computing explicit inclusion first.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.included(rel_path, self.is_explicitly_included(rel_path))
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude
    }
}

/// True when any `/`-separated segment starts with the hidden marker.
pub fn is_hidden(rel_path: &str) -> bool {
    rel_path
        .split('/')
        .any(|segment| segment.starts_with(HIDDEN_MARKER))
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| SyncError::Glob {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }

    let set = builder.build().map_err(|e| SyncError::Glob {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_no_patterns_includes_everything_visible() {
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(filter.matches("a.csv"));
        assert!(filter.matches("deep/nested/b.txt"));
        assert!(!filter.matches(".env"));
    }

    #[test]
    fn test_include_only() {
        let filter = PathFilter::new(&patterns(&["*.csv"]), &[]).unwrap();
        assert!(filter.matches("a.csv"));
        assert!(!filter.matches("a.txt"));
        assert!(filter.matches("2024/q1.csv"));
    }

    #[test]
    fn test_exclude_only() {
        let filter = PathFilter::new(&[], &patterns(&["*.tmp"])).unwrap();
        assert!(!filter.matches("b.tmp"));
        assert!(filter.matches("b.csv"));
        assert!(filter.matches("notes.txt"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter =
            PathFilter::new(&patterns(&["*.csv"]), &patterns(&["archive/*"])).unwrap();
        assert!(filter.matches("current/a.csv"));
        assert!(!filter.matches("archive/a.csv"));
    }

    #[test]
    fn test_hidden_directory_requires_explicit_include() {
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(!filter.matches(".cache/data.csv"));
        assert!(!filter.included(".cache/data.csv", false));

        let filter = PathFilter::new(&patterns(&[".cache/data.csv"]), &[]).unwrap();
        assert!(filter.is_explicitly_included(".cache/data.csv"));
        assert!(filter.matches(".cache/data.csv"));
        assert!(!filter.matches(".cache/other.csv"));
    }

    #[test]
    fn test_explicit_hidden_file_still_subject_to_excludes() {
        let filter =
            PathFilter::new(&patterns(&[".config/*"]), &patterns(&["*.bak"])).unwrap();
        assert!(filter.matches(".config/app.toml"));
        assert!(!filter.matches(".config/app.toml.bak"));
    }

    #[test]
    fn test_explicit_flag_without_include_patterns() {
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(!filter.is_explicitly_included(".hidden"));
        assert!(filter.included(".hidden", true));
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(".git/config"));
        assert!(is_hidden("data/.DS_Store"));
        assert!(!is_hidden("data/file.v1.csv"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = PathFilter::new(&patterns(&["[invalid"]), &[]);
        assert!(matches!(result, Err(SyncError::Glob { .. })));
    }

    #[test]
    fn test_pattern_accessors() {
        let filter = PathFilter::new(&patterns(&["*.csv"]), &patterns(&["*.tmp"])).unwrap();
        assert_eq!(filter.include_patterns(), &["*.csv".to_string()]);
        assert_eq!(filter.exclude_patterns(), &["*.tmp".to_string()]);
    }
}
