//! Directory traversal producing the candidate file set.
//!
//! The walk is lazy: [`FileCollector`] is an iterator that pulls entries from
//! `walkdir` on demand. Entries are visited in file-name order so a fixed tree
//! always yields the same sequence.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use crate::fs::filter::PathFilter;
use crate::report::Reporter;

/// A regular file selected for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the source root, `/`-separated
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub mtime: i64,
}

impl FileEntry {
    /// Build an entry from a path on disk, following a symlink to its target.
    pub fn from_path(path: &Path, root: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        Ok(Self {
            path: path.to_path_buf(),
            relative_path: to_posix_relative(path, root),
            size: metadata.len(),
            mtime,
        })
    }
}

/// Lazily walks `root`, yielding every file that passes the filter and size ceiling.
pub struct FileCollector {
    root: PathBuf,
    walker: walkdir::IntoIter,
    filter: PathFilter,
    max_size_bytes: Option<u64>,
    reporter: Arc<dyn Reporter>,
}

impl FileCollector {
    /// Start a fresh walk. Each call re-reads the tree.
    pub fn new(
        root: &Path,
        filter: PathFilter,
        max_size_bytes: Option<u64>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Self {
            root: root.to_path_buf(),
            walker,
            filter,
            max_size_bytes,
            reporter,
        }
    }

    /// Turn a walk entry into a candidate, or `None` when it does not participate.
    fn admit(&self, entry: &DirEntry) -> Option<FileEntry> {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }

        if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => {}
                Ok(target) if target.is_dir() => {
                    self.reporter
                        .ignored(entry.path(), "symlink to directory not followed");
                    return None;
                }
                Ok(_) => {
                    self.reporter
                        .ignored(entry.path(), "symlink to non-regular file");
                    return None;
                }
                Err(_) => {
                    self.reporter.ignored(entry.path(), "broken symlink");
                    return None;
                }
            }
        } else if !file_type.is_file() {
            self.reporter.ignored(entry.path(), "not a regular file");
            return None;
        }

        let rel = to_posix_relative(entry.path(), &self.root);
        let explicit = self.filter.is_explicitly_included(&rel);
        if !self.filter.included(&rel, explicit) {
            return None;
        }

        let file = match FileEntry::from_path(entry.path(), &self.root) {
            Ok(file) => file,
            Err(e) => {
                self.reporter
                    .ignored(entry.path(), &format!("metadata unreadable: {}", e));
                return None;
            }
        };

        if let Some(max) = self.max_size_bytes {
            if file.size > max {
                self.reporter.oversized(&file.relative_path, file.size, max);
                return None;
            }
        }

        Some(file)
    }
}

impl Iterator for FileCollector {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    self.reporter.ignored(&path, &format!("walk error: {}", e));
                    continue;
                }
            };

            if let Some(file) = self.admit(&entry) {
                return Some(file);
            }
        }
    }
}

/// Relative path from `root` with `/` separators regardless of platform.
fn to_posix_relative(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CaptureReporter;
    use std::fs;
    use tempfile::TempDir;

    fn collect(root: &Path, include: &[&str], exclude: &[&str], max: Option<u64>) -> Vec<String> {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        let filter = PathFilter::new(&include, &exclude).unwrap();
        FileCollector::new(root, filter, max, Arc::new(CaptureReporter::default()))
            .map(|f| f.relative_path)
            .collect()
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(collect(temp_dir.path(), &[], &[], None).is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories_sorted() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("b.txt"), b"content1")?;
        fs::write(temp_dir.path().join("a.txt"), b"content0")?;
        fs::write(temp_dir.path().join("subdir/c.txt"), b"content2")?;

        let files = collect(temp_dir.path(), &[], &[], None);
        assert_eq!(files, vec!["a.txt", "b.txt", "subdir/c.txt"]);

        Ok(())
    }

    #[test]
    fn test_entry_facts() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("file1.txt"), b"12345")?;

        let filter = PathFilter::new(&[], &[]).unwrap();
        let entries: Vec<FileEntry> = FileCollector::new(
            temp_dir.path(),
            filter,
            None,
            Arc::new(CaptureReporter::default()),
        )
        .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 5);
        assert!(entries[0].mtime > 0);
        assert_eq!(entries[0].path, temp_dir.path().join("file1.txt"));
        Ok(())
    }

    #[test]
    fn test_filters_applied() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join(".hidden"))?;
        fs::write(temp_dir.path().join("a.csv"), b"a")?;
        fs::write(temp_dir.path().join("a.txt"), b"a")?;
        fs::write(temp_dir.path().join(".hidden/h.csv"), b"h")?;

        assert_eq!(collect(temp_dir.path(), &[], &[], None), vec!["a.csv", "a.txt"]);
        assert_eq!(collect(temp_dir.path(), &["a.csv"], &[], None), vec!["a.csv"]);
        assert_eq!(
            collect(temp_dir.path(), &[".hidden/h.csv", "a.txt"], &[], None),
            vec![".hidden/h.csv", "a.txt"]
        );
        Ok(())
    }

    #[test]
    fn test_size_ceiling_is_inclusive() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("exact.bin"), vec![0u8; 10])?;
        fs::write(temp_dir.path().join("over.bin"), vec![0u8; 11])?;

        let reporter = Arc::new(CaptureReporter::default());
        let filter = PathFilter::new(&[], &[]).unwrap();
        let files: Vec<String> =
            FileCollector::new(temp_dir.path(), filter, Some(10), reporter.clone())
                .map(|f| f.relative_path)
                .collect();

        assert_eq!(files, vec!["exact.bin"]);
        assert_eq!(reporter.lines(), vec!["SKIP (size>max) over.bin"]);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinked_directory_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let outside = TempDir::new()?;
        fs::write(outside.path().join("x.txt"), b"x")?;
        fs::write(temp_dir.path().join("real.txt"), b"r")?;
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("linked"))?;
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("alias.txt"),
        )?;

        let files = collect(temp_dir.path(), &[], &[], None);
        assert_eq!(files, vec!["alias.txt", "real.txt"]);
        Ok(())
    }

    #[test]
    fn test_collection_is_restartable_by_new_call() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("one.txt"), b"1")?;
        assert_eq!(collect(temp_dir.path(), &[], &[], None).len(), 1);

        fs::write(temp_dir.path().join("two.txt"), b"2")?;
        assert_eq!(collect(temp_dir.path(), &[], &[], None).len(), 2);
        Ok(())
    }
}
