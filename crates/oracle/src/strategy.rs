//! Matching strategies.
//!
//! Each strategy answers one question about a changed file: "which tests does
//! this evidence point at?". The orchestrator runs them in registration order
//! and tags every hit with the strategy's [`Reason`].

use crate::naming::tests_named_for;
use crate::MappingContext;
use common::Reason;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A rule that maps one changed file to test files.
///
/// # Implementation Notes
/// - `path` is project-relative and never a deleted file.
/// - `module_ids` holds every identifier the file can be imported by (may be empty).
/// - A terminal strategy that returns hits stops evaluation for that file.
pub trait Strategy {
    fn reason(&self) -> Reason;

    fn matches(&self, path: &Path, module_ids: &[String], ctx: &MappingContext<'_>)
        -> BTreeSet<PathBuf>;

    fn is_terminal(&self) -> bool {
        false
    }
}

/// The changed file is itself a test file.
pub struct DirectChange;

impl Strategy for DirectChange {
    fn reason(&self) -> Reason {
        Reason::DirectChange
    }

    fn matches(&self, path: &Path, _: &[String], ctx: &MappingContext<'_>) -> BTreeSet<PathBuf> {
        let mut hits = BTreeSet::new();
        if ctx.universe.is_direct_test(path) {
            hits.insert(path.to_path_buf());
        }
        hits
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// A test file is named after the changed module.
pub struct NamingConvention;

impl Strategy for NamingConvention {
    fn reason(&self) -> Reason {
        Reason::NamingConvention
    }

    fn matches(&self, _: &Path, module_ids: &[String], ctx: &MappingContext<'_>) -> BTreeSet<PathBuf> {
        module_ids
            .iter()
            .flat_map(|id| tests_named_for(id, ctx.universe))
            .collect()
    }
}

/// A test file imports the changed module or its parent package.
pub struct ImportMatch;

impl Strategy for ImportMatch {
    fn reason(&self) -> Reason {
        Reason::ImportMatch
    }

    fn matches(&self, path: &Path, module_ids: &[String], ctx: &MappingContext<'_>) -> BTreeSet<PathBuf> {
        let mut hits = BTreeSet::new();
        for id in module_ids {
            if let Some(files) = ctx.modules.resolve(id) {
                if files.len() > 1 {
                    tracing::debug!(
                        module = %id,
                        changed = %path.display(),
                        candidates = files.len(),
                        "ambiguous module identifier, keeping every importer"
                    );
                }
            }
            hits.extend(ctx.graph.tests_importing(id));
        }
        hits
    }
}

/// The three strategies in evaluation order.
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(DirectChange),
        Box::new(NamingConvention),
        Box::new(ImportMatch),
    ]
}
