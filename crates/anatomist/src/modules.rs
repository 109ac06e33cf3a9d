//! Module identifier index.
//!
//! Maps each module identifier to the project files that could define it. A
//! file under a source root (`src` by default) is importable both with and
//! without that root, so `src/pkg/calc.py` is listed as `src.pkg.calc` and
//! `pkg.calc`. Two files claiming the same identifier (`src/util.py` and
//! `lib/util.py` with `lib` also a source root) are both kept.

use crate::scan::walk_py_files;
use common::module_id::module_id;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    source_roots: Vec<String>,
    modules: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl ModuleIndex {
    /// Walks the whole project and indexes every `.py` file.
    ///
    /// The walked map only feeds ambiguity diagnostics ([`resolve`](Self::resolve),
    /// [`ambiguous`](Self::ambiguous)). Selection derives identifiers through
    /// [`identifiers_for`](Self::identifiers_for), which never consults it, so
    /// new and deleted files map the same way as indexed ones.
    pub fn build(project_root: &Path, source_roots: &[String], excludes: &[String]) -> Self {
        let files = walk_py_files(project_root, project_root, excludes);
        let index = Self::from_paths(source_roots, files);
        tracing::debug!(
            modules = index.modules.len(),
            ambiguous = index.ambiguous().count(),
            "module index built"
        );
        index
    }

    /// Indexes an explicit list of project-relative paths.
    pub fn from_paths<I, P>(source_roots: &[String], paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut index = Self {
            source_roots: source_roots.to_vec(),
            modules: BTreeMap::new(),
        };
        for path in paths {
            let path = path.as_ref();
            for id in index.identifiers_for(path) {
                index
                    .modules
                    .entry(id)
                    .or_default()
                    .insert(path.to_path_buf());
            }
        }
        index
    }

    /// Every identifier `path` can be imported by: the full dotted path first,
    /// then the form with a leading source root stripped.
    ///
    /// Pure: works for paths that are not (or no longer) on disk.
    pub fn identifiers_for(&self, path: &Path) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(full) = module_id(path) {
            ids.push(full);
        }

        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        if let Some(Component::Normal(first)) = components.next() {
            let is_source_root = first
                .to_str()
                .map(|f| self.source_roots.iter().any(|r| r == f))
                .unwrap_or(false);
            if is_source_root {
                let rest: PathBuf = components.collect();
                if let Some(stripped) = module_id(&rest) {
                    if !ids.contains(&stripped) {
                        ids.push(stripped);
                    }
                }
            }
        }

        ids
    }

    /// Files that could define `id`.
    pub fn resolve(&self, id: &str) -> Option<&BTreeSet<PathBuf>> {
        self.modules.get(id)
    }

    /// Identifiers claimed by more than one file.
    pub fn ambiguous(&self) -> impl Iterator<Item = (&str, &BTreeSet<PathBuf>)> {
        self.modules
            .iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(id, files)| (id.as_str(), files))
    }
}
