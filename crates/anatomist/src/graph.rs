//! # Import Graph
//!
//! Bipartite graph of test files and the modules they import:
//! `Test --imports--> Module`, each edge tagged with its `ImportKind`.
//! Answering "which tests import module M" is a walk over the incoming edges
//! of M, plus the explicit incoming edges of M's parent package.
//!
//! Built in two passes:
//! 1. **Parse Pass**: extract every test file's `ImportSet` in parallel (one
//!    `ParserHost` per rayon worker).
//! 2. **Link Pass**: merge the results sequentially, in discovery order, into
//!    the graph.

use crate::parser::{ParsedImports, ParserHost};
use crate::scan::TestUniverse;
use crate::{AnatomistError, ImportKind, ImportSet, ParseWarning};
use common::module_id::parent_package;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Statistics about the import graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStats {
    pub test_count: usize,
    pub module_count: usize,
    pub edge_count: usize,
    pub parse_errors: usize,
}

/// Graph node: either side of an import edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportNode {
    Test(PathBuf),
    Module(String),
}

/// Test file -> imported modules, with reverse lookup.
#[derive(Debug, Default)]
pub struct ImportGraph {
    graph: DiGraph<ImportNode, ImportKind>,
    module_nodes: HashMap<String, NodeIndex>,
    warnings: Vec<ParseWarning>,
    pub stats: GraphStats,
}

impl ImportGraph {
    /// Parses every test file in `universe` and links the results.
    ///
    /// A file that fails to parse contributes an empty `ImportSet` and a
    /// warning; the remaining files are unaffected.
    ///
    /// # Errors
    /// Only if the Python grammar cannot be loaded at all.
    pub fn build(project_root: &Path, universe: &TestUniverse) -> Result<Self, AnatomistError> {
        // Surface grammar problems once instead of once per file.
        ParserHost::new()?;

        let tests: Vec<&Path> = universe.iter().collect();
        let parsed: Vec<(PathBuf, ParsedImports)> = tests
            .par_iter()
            .map_init(ParserHost::new, |host, test| {
                let result = match host {
                    Ok(h) => h.parse_file(project_root, test),
                    Err(e) => ParsedImports {
                        imports: ImportSet::new(),
                        warning: Some(ParseWarning {
                            path: test.to_path_buf(),
                            message: e.to_string(),
                        }),
                    },
                };
                (test.to_path_buf(), result)
            })
            .collect();

        let mut graph = Self::default();
        for (test, result) in parsed {
            if let Some(warning) = result.warning {
                graph.warnings.push(warning);
            }
            graph.link(test, result.imports);
        }

        tracing::debug!(
            tests = graph.stats.test_count,
            modules = graph.stats.module_count,
            edges = graph.stats.edge_count,
            parse_errors = graph.stats.parse_errors,
            "import graph built"
        );
        Ok(graph)
    }

    /// Builds a graph from precomputed import sets (no parsing).
    pub fn from_import_sets<I, P>(sets: I) -> Self
    where
        I: IntoIterator<Item = (P, ImportSet)>,
        P: Into<PathBuf>,
    {
        let mut graph = Self::default();
        for (test, imports) in sets {
            graph.link(test.into(), imports);
        }
        graph
    }

    fn link(&mut self, test: PathBuf, imports: ImportSet) {
        let test_node = self.graph.add_node(ImportNode::Test(test));
        self.stats.test_count += 1;

        for (module, kind) in imports.entries() {
            let module_node = match self.module_nodes.get(module) {
                Some(&n) => n,
                None => {
                    let n = self.graph.add_node(ImportNode::Module(module.to_string()));
                    self.module_nodes.insert(module.to_string(), n);
                    self.stats.module_count += 1;
                    n
                }
            };
            self.graph.add_edge(test_node, module_node, kind);
            self.stats.edge_count += 1;
        }

        self.stats.parse_errors = self.warnings.len();
    }

    /// Tests that import `module` itself, or explicitly import its immediate
    /// parent package.
    ///
    /// `from a import b` selects a test for a change to `a.b`, but the `a`
    /// that `import a.c` binds as a side effect does not: only `a.c` and `a`
    /// itself match that test. One level, no transitive closure.
    pub fn tests_importing(&self, module: &str) -> BTreeSet<PathBuf> {
        let mut tests = BTreeSet::new();
        self.collect_importers(module, false, &mut tests);
        if let Some(parent) = parent_package(module) {
            self.collect_importers(parent, true, &mut tests);
        }
        tests
    }

    fn collect_importers(&self, module: &str, explicit_only: bool, tests: &mut BTreeSet<PathBuf>) {
        let Some(&node) = self.module_nodes.get(module) else {
            return;
        };
        for edge in self.graph.edges_directed(node, Direction::Incoming) {
            if explicit_only && *edge.weight() != ImportKind::Explicit {
                continue;
            }
            if let ImportNode::Test(path) = &self.graph[edge.source()] {
                tests.insert(path.clone());
            }
        }
    }

    /// Files that could not be parsed during the build.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }
}
