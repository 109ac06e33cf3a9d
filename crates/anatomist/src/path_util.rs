//! Path normalization utilities for project-relative file handling.

use std::path::{Component, Path, PathBuf};

use crate::AnatomistError;

/// Canonicalizes the project root (removes `\\?\` on Windows via `dunce`).
///
/// # Errors
/// Returns `AnatomistError::IoError` if the directory does not exist or is unreadable.
pub fn canonical_root(path: &Path) -> Result<PathBuf, AnatomistError> {
    let canonical = dunce::canonicalize(path)?;
    if !canonical.is_dir() {
        return Err(AnatomistError::IoError(std::io::Error::other(format!(
            "not a directory: {}",
            canonical.display()
        ))));
    }
    Ok(canonical)
}

/// Renders a path as a UTF-8 string with forward slashes, for reports and JSON.
pub fn normalize_path(path: &Path) -> String {
    dunce::simplified(path).to_string_lossy().replace('\\', "/")
}

/// Drops `.` components so that `./tests/test_a.py` and `tests/test_a.py` compare equal.
pub fn clean_relative(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Expresses `path` relative to `root`. `None` if it lies outside.
pub fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(clean_relative)
}
