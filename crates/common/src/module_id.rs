//! Module identifier derivation.
//!
//! A module identifier is the dotted name Python code uses to import a file:
//! `src/app/calc.py` is `src.app.calc`, `pkg/__init__.py` is `pkg`.

use std::path::{Component, Path};

/// Derives the dotted module identifier of a project-relative `.py` path.
///
/// Returns `None` for non-Python files, paths that escape the project root
/// (`..`), absolute paths, and the root-level `__init__.py`.
pub fn module_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("py") {
        return None;
    }

    let mut parts = package_parts(path.parent().unwrap_or(Path::new("")))?;
    let stem = path.file_stem()?.to_str()?;
    if stem != "__init__" {
        parts.push(stem);
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// Returns the dotted package that contains `path` (`tests/unit/test_x.py` -> `tests.unit`).
///
/// The root package is the empty string. `None` if the path is absolute or
/// climbs out of the project root.
pub fn package_of(path: &Path) -> Option<String> {
    let parts = package_parts(path.parent().unwrap_or(Path::new("")))?;
    Some(parts.join("."))
}

fn package_parts(dir: &Path) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    for component in dir.components() {
        match component {
            Component::Normal(os) => parts.push(os.to_str()?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}

/// Last component of a dotted identifier (`app.utils.calculator` -> `calculator`).
pub fn last_component(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// Immediate parent package of a dotted identifier (`a.b.c` -> `a.b`).
pub fn parent_package(id: &str) -> Option<&str> {
    id.rsplit_once('.').map(|(parent, _)| parent)
}

/// Every dotted prefix of an identifier, shortest first (`a.b.c` -> `a`, `a.b`, `a.b.c`).
pub fn prefixes(id: &str) -> impl Iterator<Item = &str> {
    id.match_indices('.')
        .map(move |(i, _)| &id[..i])
        .chain(std::iter::once(id))
}
