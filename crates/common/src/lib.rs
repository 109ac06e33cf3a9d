//! Shared vocabulary for the change-to-test mapping engine.
//!
//! Every crate in the workspace speaks in terms of these types: a
//! [`ChangedFile`] coming out of change detection, the [`Reason`] a test was
//! selected, and the [`TestConvention`] that decides what a test file looks
//! like.

pub mod config;
pub mod module_id;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a file differs from the comparison baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ChangeKind {
    Added = 0,
    Modified = 1,
    Deleted = 2,
}

impl ChangeKind {
    /// Maps a `git --name-status` letter to a change kind.
    ///
    /// `A` is an addition, `D` a deletion; copies, type changes and unmerged
    /// entries are all treated as modifications.
    pub fn from_status(letter: char) -> Self {
        match letter {
            'A' | '?' => ChangeKind::Added,
            'D' => ChangeKind::Deleted,
            _ => ChangeKind::Modified,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A project-relative path known to differ from the comparison baseline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChangedFile {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangedFile {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Shorthand for a modified file.
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }

    /// Deleted files cannot be imported going forward and are excluded from matching.
    pub fn is_deleted(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }
}

/// Why a test file ended up in the affected set.
///
/// Ordered by strength of evidence so that a sorted reason set reads from the
/// most direct cause to the most inferred one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Reason {
    /// The test file itself changed.
    DirectChange = 0,
    /// The test file is named after a changed module (`calculator` -> `test_calculator.py`).
    NamingConvention = 1,
    /// The test file statically imports a changed module or its parent package.
    ImportMatch = 2,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::DirectChange => "direct-change",
            Reason::NamingConvention => "naming-convention",
            Reason::ImportMatch => "import-match",
        };
        f.write_str(s)
    }
}

/// The file-name convention that marks a Python file as a test file.
///
/// A name matches when it ends in `.py` and its stem starts with one of the
/// prefixes or ends with one of the suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConvention {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for TestConvention {
    fn default() -> Self {
        Self {
            prefixes: vec!["test_".to_string()],
            suffixes: vec!["_test".to_string()],
        }
    }
}

impl TestConvention {
    /// Returns the subject under test encoded in a test file name, if the name
    /// follows the convention (`test_calculator.py` -> `calculator`).
    ///
    /// Prefixes are tried before suffixes. A marker that would leave an empty
    /// subject (`test_.py`) does not count.
    pub fn subject<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let stem = file_name.strip_suffix(".py")?;
        for prefix in &self.prefixes {
            if let Some(rest) = stem.strip_prefix(prefix.as_str()) {
                if !rest.is_empty() {
                    return Some(rest);
                }
            }
        }
        for suffix in &self.suffixes {
            if let Some(rest) = stem.strip_suffix(suffix.as_str()) {
                if !rest.is_empty() {
                    return Some(rest);
                }
            }
        }
        None
    }

    /// Returns `true` if stripping any one marker from `file_name` leaves exactly
    /// `subject`. Unlike [`subject`](Self::subject) this tries every marker, so
    /// `test_io_test.py` names both `io_test` and `test_io`.
    pub fn names_subject(&self, file_name: &str, subject: &str) -> bool {
        let Some(stem) = file_name.strip_suffix(".py") else {
            return false;
        };
        if subject.is_empty() {
            return false;
        }
        self.prefixes
            .iter()
            .any(|p| stem.strip_prefix(p.as_str()) == Some(subject))
            || self
                .suffixes
                .iter()
                .any(|s| stem.strip_suffix(s.as_str()) == Some(subject))
    }

    /// Returns `true` if the file name of `path` follows the convention.
    pub fn is_test_name(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| self.subject(n))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_from_status() {
        assert_eq!(ChangeKind::from_status('A'), ChangeKind::Added);
        assert_eq!(ChangeKind::from_status('?'), ChangeKind::Added);
        assert_eq!(ChangeKind::from_status('D'), ChangeKind::Deleted);
        assert_eq!(ChangeKind::from_status('M'), ChangeKind::Modified);
        assert_eq!(ChangeKind::from_status('T'), ChangeKind::Modified);
    }

    #[test]
    fn test_reason_ordering() {
        assert!(Reason::DirectChange < Reason::NamingConvention);
        assert!(Reason::NamingConvention < Reason::ImportMatch);
        assert_eq!(Reason::ImportMatch.to_string(), "import-match");
    }

    #[test]
    fn test_convention_subject() {
        let conv = TestConvention::default();
        assert_eq!(conv.subject("test_calculator.py"), Some("calculator"));
        assert_eq!(conv.subject("calculator_test.py"), Some("calculator"));
        assert_eq!(conv.subject("calculator.py"), None);
        assert_eq!(conv.subject("test_calculator.txt"), None);
        assert_eq!(conv.subject("test_.py"), None);
        // Case-sensitive.
        assert_eq!(conv.subject("Test_calculator.py"), None);
    }

    #[test]
    fn test_convention_custom_markers() {
        let conv = TestConvention {
            prefixes: vec!["check_".into()],
            suffixes: vec!["_spec".into()],
        };
        assert_eq!(conv.subject("check_io.py"), Some("io"));
        assert_eq!(conv.subject("io_spec.py"), Some("io"));
        assert_eq!(conv.subject("test_io.py"), None);
    }

    #[test]
    fn test_names_subject_tries_every_marker() {
        let conv = TestConvention::default();
        assert!(conv.names_subject("test_io_test.py", "io_test"));
        assert!(conv.names_subject("test_io_test.py", "test_io"));
        assert!(conv.names_subject("calculator_test.py", "calculator"));
        assert!(!conv.names_subject("test_calculator.py", "calc"));
        assert!(!conv.names_subject("test_calculator.py", "Calculator"));
        assert!(!conv.names_subject("test_.py", ""));
    }

    #[test]
    fn test_is_test_name() {
        let conv = TestConvention::default();
        assert!(conv.is_test_name(Path::new("tests/unit/test_api.py")));
        assert!(!conv.is_test_name(Path::new("tests/conftest.py")));
    }

    #[test]
    fn test_changed_file_deleted() {
        let file = ChangedFile::modified("src/app/utils/calculator.py");
        assert!(!file.is_deleted());
        assert!(ChangedFile::new("a.py", ChangeKind::Deleted).is_deleted());
    }
}
