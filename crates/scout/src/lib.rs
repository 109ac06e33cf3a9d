//! # The Scout: Change Detection
//!
//! Asks `git` which Python files differ from a baseline. Every command runs in
//! the project root with `--relative`, so returned paths are relative to it
//! even when the project is a subdirectory of the repository. Renames are
//! reported as a deletion plus an addition (`--no-renames`).

use common::{ChangeKind, ChangedFile};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The object id of the empty tree, used as the baseline before the first commit.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("`git {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// What to compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    /// Uncommitted work relative to `base`.
    WorkingTree {
        base: String,
        staged: bool,
        unstaged: bool,
        untracked: bool,
    },
    /// Everything between `sha` and `HEAD`.
    SinceCommit(String),
    /// Changes on `target` since it forked from `base` (`base...target`).
    Branches { base: String, target: String },
}

impl Default for ChangeSource {
    fn default() -> Self {
        ChangeSource::WorkingTree {
            base: "HEAD".to_string(),
            staged: true,
            unstaged: true,
            untracked: true,
        }
    }
}

/// Shells out to the `git` CLI inside one project root.
pub struct GitChangeDetector {
    root: PathBuf,
}

impl GitChangeDetector {
    /// # Errors
    /// `ScoutError::NotARepository` if `root` is not inside a git work tree.
    pub fn open(root: &Path) -> Result<Self, ScoutError> {
        let detector = Self {
            root: root.to_path_buf(),
        };
        match detector.git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) if out.trim() == "true" => Ok(detector),
            Ok(_) | Err(ScoutError::CommandFailed { .. }) => {
                Err(ScoutError::NotARepository(root.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }

    /// Changed `.py` files, ordered by path, one entry per path.
    pub fn detect(&self, source: &ChangeSource) -> Result<Vec<ChangedFile>, ScoutError> {
        let mut found = Vec::new();

        match source {
            ChangeSource::WorkingTree {
                base,
                staged,
                unstaged,
                untracked,
            } => {
                if *staged {
                    let baseline = if self.resolves(base) {
                        base.as_str()
                    } else {
                        tracing::debug!(base = %base, "base does not resolve, using the empty tree");
                        EMPTY_TREE
                    };
                    found.extend(self.name_status(&["--cached", baseline])?);
                }
                if *unstaged {
                    found.extend(self.name_status(&[])?);
                }
                if *untracked {
                    let out = self.git(&["ls-files", "--others", "--exclude-standard"])?;
                    found.extend(
                        out.lines()
                            .filter(|l| !l.is_empty())
                            .map(|l| ChangedFile::new(l, ChangeKind::Added)),
                    );
                }
            }
            ChangeSource::SinceCommit(sha) => {
                found.extend(self.name_status(&[sha.as_str(), "HEAD"])?);
            }
            ChangeSource::Branches { base, target } => {
                let range = format!("{base}...{target}");
                found.extend(self.name_status(&[range.as_str()])?);
            }
        }

        let changes = merge_changes(found);
        tracing::debug!(changed = changes.len(), "change detection complete");
        Ok(changes)
    }

    fn name_status(&self, extra: &[&str]) -> Result<Vec<ChangedFile>, ScoutError> {
        let mut args = vec!["diff", "--name-status", "--relative", "--no-renames"];
        args.extend_from_slice(extra);
        Ok(parse_name_status(&self.git(&args)?))
    }

    fn resolves(&self, rev: &str) -> bool {
        let spec = format!("{rev}^{{commit}}");
        self.git(&["rev-parse", "--verify", "--quiet", spec.as_str()])
            .is_ok()
    }

    fn git(&self, args: &[&str]) -> Result<String, ScoutError> {
        let output = Command::new("git")
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .current_dir(&self.root)
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ScoutError::CommandFailed {
                command: args.join(" "),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parses `git diff --name-status` output.
///
/// A rename or copy line (`R100\told\tnew`) yields the old path as deleted and
/// the new path as added.
pub fn parse_name_status(output: &str) -> Vec<ChangedFile> {
    let mut changes = Vec::new();

    for line in output.lines() {
        let mut fields = line.split('\t');
        let (Some(status), Some(first)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some(letter) = status.chars().next() else {
            continue;
        };

        match (letter, fields.next()) {
            ('R', Some(second)) => {
                changes.push(ChangedFile::new(first, ChangeKind::Deleted));
                changes.push(ChangedFile::new(second, ChangeKind::Added));
            }
            ('C', Some(second)) => {
                changes.push(ChangedFile::new(second, ChangeKind::Added));
            }
            _ => changes.push(ChangedFile::new(first, ChangeKind::from_status(letter))),
        }
    }

    changes
}

/// Keeps `.py` files only, one entry per path, ordered by path.
///
/// When several sources report the same path the strongest kind wins:
/// deleted over modified over added.
pub fn merge_changes<I>(changes: I) -> Vec<ChangedFile>
where
    I: IntoIterator<Item = ChangedFile>,
{
    let mut merged: BTreeMap<PathBuf, ChangeKind> = BTreeMap::new();
    for change in changes {
        if change.path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        merged
            .entry(change.path)
            .and_modify(|k| *k = (*k).max(change.kind))
            .or_insert(change.kind);
    }
    merged
        .into_iter()
        .map(|(path, kind)| ChangedFile::new(path, kind))
        .collect()
}
