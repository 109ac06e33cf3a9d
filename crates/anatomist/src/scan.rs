//! Project walking and test discovery.
//!
//! Everything returned here is relative to the project root and sorted, so
//! two scans of the same tree produce identical results.

use crate::path_util::{clean_relative, relative_to};
use crate::AnatomistError;
use common::config::{ConfigError, TestRoots};
use common::TestConvention;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every test file discovered under the configured test directories.
#[derive(Debug, Clone)]
pub struct TestUniverse {
    files: BTreeSet<PathBuf>,
    roots: Vec<PathBuf>,
    convention: TestConvention,
}

impl TestUniverse {
    /// Builds a universe from known paths, without touching the filesystem.
    ///
    /// Paths that don't lie under one of `roots` or don't follow `convention`
    /// are ignored, so the universe invariant holds for injected fixtures too.
    pub fn from_paths<I, P>(roots: Vec<PathBuf>, convention: TestConvention, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots: Vec<PathBuf> = roots.iter().map(|r| clean_relative(r)).collect();
        let files = paths
            .into_iter()
            .map(|p| clean_relative(p.as_ref()))
            .filter(|p| roots.iter().any(|r| p.starts_with(r)) && convention.is_test_name(p))
            .collect();
        Self {
            files,
            roots,
            convention,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Test files in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Test directories that were actually scanned.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn convention(&self) -> &TestConvention {
        &self.convention
    }

    /// Returns `true` if `path` lies inside a scanned test directory.
    pub fn in_test_dir(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| path.starts_with(r))
    }

    /// A direct test: inside a test directory, named like a test, and discovered.
    pub fn is_direct_test(&self, path: &Path) -> bool {
        self.in_test_dir(path) && self.convention.is_test_name(path) && self.contains(path)
    }
}

/// Scans the configured test directories for test files.
///
/// # Errors
/// - `ConfigError::MissingTestDir` if an explicitly configured directory does not exist.
/// - `ConfigError::NoTestDirectories` if none of the default directories exist.
///
/// Individual unreadable entries are skipped.
pub fn discover_tests(
    project_root: &Path,
    roots: &TestRoots,
    convention: &TestConvention,
    excludes: &[String],
) -> Result<TestUniverse, AnatomistError> {
    let mut scanned = Vec::new();
    let mut files = BTreeSet::new();

    for dir in &roots.dirs {
        let rel = clean_relative(dir);
        let abs = project_root.join(&rel);
        if !abs.is_dir() {
            if roots.explicit {
                return Err(ConfigError::MissingTestDir(dir.clone()).into());
            }
            tracing::debug!(dir = %dir.display(), "default test directory absent, skipping");
            continue;
        }

        for path in walk_py_files(project_root, &abs, excludes) {
            if convention.is_test_name(&path) {
                files.insert(path);
            }
        }
        scanned.push(rel);
    }

    if scanned.is_empty() {
        let looked_for: Vec<String> = roots
            .dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        return Err(ConfigError::NoTestDirectories(looked_for.join(", ")).into());
    }

    tracing::debug!(tests = files.len(), roots = scanned.len(), "test discovery complete");
    Ok(TestUniverse {
        files,
        roots: scanned,
        convention: convention.clone(),
    })
}

/// Walks `dir` for `.py` files, skipping excluded directories.
///
/// Returned paths are relative to `project_root` and sorted.
pub fn walk_py_files(project_root: &Path, dir: &Path, excludes: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e.path(), excludes))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().and_then(|s| s.to_str()) == Some("py") {
            if let Some(rel) = relative_to(project_root, path) {
                files.push(rel);
            }
        }
    }

    files.sort();
    files
}

/// Returns `true` if the directory name is on the exclude list.
fn is_excluded(path: &Path, excludes: &[String]) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| excludes.iter().any(|x| x == name))
        .unwrap_or(false)
}
