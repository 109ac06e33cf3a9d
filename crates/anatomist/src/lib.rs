//! # The Anatomist: Import Extraction & Indexing
//!
//! **Role**: Turns a Python project on disk into the static facts the test
//! selector needs.
//!
//! **Core Types**:
//! - `ImportSet`: module identifiers one file imports, each explicit or implied
//!   (empty when the file can't be parsed).
//! - `TestUniverse`: every test file discovered under the configured test directories.
//! - `ModuleIndex`: module identifier -> project files that could define it.
//! - `ImportGraph`: test file -> imported modules, queryable in reverse.
//!
//! **Design**:
//! - Parsing uses the tree-sitter Python grammar; a broken file degrades to an
//!   empty `ImportSet` plus a `ParseWarning`, never an `Err`.
//! - All paths are relative to the project root.
//! - Indexes are built fresh per run and handed to the caller; nothing is global.

pub mod graph;
pub mod imports;
pub mod modules;
pub mod parser;
pub mod path_util;
pub mod scan;

pub use graph::ImportGraph;
pub use modules::ModuleIndex;
pub use parser::{ParsedImports, ParserHost};
pub use scan::TestUniverse;

use common::config::ConfigError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How a module ended up in an `ImportSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// Only bound as a side effect: `import a.b` runs the `a` package.
    Implied,
    /// Named in an import statement.
    Explicit,
}

/// The set of module identifiers a file statically imports.
///
/// `import a.b.c` records `a.b.c` as explicit and `a`, `a.b` as implied. A
/// module that is both keeps the explicit mark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImportSet(BTreeMap<String, ImportKind>);

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.0.contains_key(module)
    }

    pub fn kind_of(&self, module: &str) -> Option<ImportKind> {
        self.0.get(module).copied()
    }

    /// Every module, explicit or implied, in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, ImportKind)> {
        self.0.iter().map(|(m, k)| (m.as_str(), *k))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, module: impl Into<String>) {
        self.0.insert(module.into(), ImportKind::Explicit);
    }

    pub(crate) fn insert_implied(&mut self, module: impl Into<String>) {
        self.0.entry(module.into()).or_insert(ImportKind::Implied);
    }
}

/// Collects explicit imports.
impl<S: Into<String>> FromIterator<S> for ImportSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|m| (m.into(), ImportKind::Explicit))
                .collect(),
        )
    }
}

/// A file whose imports could not be extracted. The file still takes part in
/// the run with an empty `ImportSet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Errors produced by the Anatomist crate.
#[derive(Debug, thiserror::Error)]
pub enum AnatomistError {
    /// Tree-sitter could not be set up with the Python grammar.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// I/O error (project root unreadable, etc.).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The test universe could not be established.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
