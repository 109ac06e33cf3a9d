//! # The Oracle: Change -> Test Mapping
//!
//! **Role**: Decides which test files are affected by a set of changed files.
//!
//! **Algorithm** (per changed file, deleted files skipped):
//! 1. **Direct**: the file is itself a discovered test file. Selected, done.
//! 2. **Naming**: tests named after any of the file's module identifiers.
//! 3. **Imports**: tests that import the module or its parent package.
//!
//! Hits are unioned across files, deduplicated by path and returned in
//! lexicographic order with every reason and trigger that led to them.

pub mod naming;
pub mod strategy;

use anatomist::path_util::clean_relative;
use anatomist::scan::discover_tests;
use anatomist::{AnatomistError, ImportGraph, ModuleIndex, ParseWarning, TestUniverse};
use common::config::Settings;
use common::{ChangedFile, Reason};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use strategy::{default_strategies, Strategy};

/// Read-only view over the indexes built for one run.
#[derive(Clone, Copy)]
pub struct MappingContext<'a> {
    pub universe: &'a TestUniverse,
    pub modules: &'a ModuleIndex,
    pub graph: &'a ImportGraph,
}

/// Everything the oracle needs, built fresh from disk.
#[derive(Debug)]
pub struct ProjectIndex {
    pub universe: TestUniverse,
    pub modules: ModuleIndex,
    pub graph: ImportGraph,
}

impl ProjectIndex {
    /// Discovers tests, indexes modules and parses every test file's imports.
    ///
    /// # Errors
    /// Test-directory configuration errors, or a grammar that fails to load.
    /// Unparseable files are not errors.
    pub fn build(project_root: &Path, settings: &Settings) -> Result<Self, AnatomistError> {
        let universe = discover_tests(
            project_root,
            &settings.test_roots(),
            &settings.convention(),
            &settings.modules.exclude,
        )?;
        let modules = ModuleIndex::build(
            project_root,
            &settings.modules.source_roots,
            &settings.modules.exclude,
        );
        let graph = ImportGraph::build(project_root, &universe)?;
        Ok(Self {
            universe,
            modules,
            graph,
        })
    }

    pub fn context(&self) -> MappingContext<'_> {
        MappingContext {
            universe: &self.universe,
            modules: &self.modules,
            graph: &self.graph,
        }
    }
}

/// One selected test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffectedTest {
    pub path: PathBuf,
    /// Never empty.
    pub reasons: BTreeSet<Reason>,
    /// Changed files that led here.
    pub triggers: BTreeSet<PathBuf>,
}

/// What the caller should do with an [`AffectedSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No changed files at all.
    NoChanges,
    /// Files changed but no test maps to them.
    Unmapped,
    /// At least one test was selected.
    Selected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AffectedSet {
    /// Ordered by path, no duplicates.
    pub tests: Vec<AffectedTest>,
    /// True only when the change set was empty.
    pub nothing_to_run: bool,
    pub changed_count: usize,
    pub skipped_deleted: usize,
    pub parse_warnings: Vec<ParseWarning>,
}

impl AffectedSet {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.tests.iter().map(|t| t.path.as_path())
    }

    pub fn get(&self, path: &Path) -> Option<&AffectedTest> {
        self.tests
            .binary_search_by(|t| t.path.as_path().cmp(path))
            .ok()
            .map(|i| &self.tests[i])
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn outcome(&self) -> Outcome {
        if self.nothing_to_run {
            Outcome::NoChanges
        } else if self.tests.is_empty() {
            Outcome::Unmapped
        } else {
            Outcome::Selected
        }
    }
}

#[derive(Default)]
struct Selection {
    reasons: BTreeSet<Reason>,
    triggers: BTreeSet<PathBuf>,
}

/// Runs the matching strategies over a change set.
pub struct TestOracle {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for TestOracle {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }
}

impl TestOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom strategy list, evaluated in order.
    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Maps `changed` onto the test universe in `ctx`.
    pub fn select(&self, changed: &[ChangedFile], ctx: &MappingContext<'_>) -> AffectedSet {
        let distinct: BTreeSet<(PathBuf, bool)> = changed
            .iter()
            .map(|c| (clean_relative(&c.path), c.is_deleted()))
            .collect();
        let changed_count = distinct
            .iter()
            .map(|(p, _)| p)
            .collect::<BTreeSet<_>>()
            .len();

        let mut selected: BTreeMap<PathBuf, Selection> = BTreeMap::new();
        let mut skipped_deleted = 0;

        for (path, deleted) in &distinct {
            if *deleted {
                tracing::debug!(path = %path.display(), "deleted file, not matched");
                skipped_deleted += 1;
                continue;
            }

            let ids = ctx.modules.identifiers_for(path);
            for strategy in &self.strategies {
                let hits: Vec<PathBuf> = strategy
                    .matches(path, &ids, ctx)
                    .into_iter()
                    .filter(|t| ctx.universe.contains(t))
                    .collect();
                if hits.is_empty() {
                    continue;
                }

                tracing::debug!(
                    changed = %path.display(),
                    reason = %strategy.reason(),
                    hits = hits.len(),
                    "strategy matched"
                );
                for hit in hits {
                    let entry = selected.entry(hit).or_default();
                    entry.reasons.insert(strategy.reason());
                    entry.triggers.insert(path.clone());
                }
                if strategy.is_terminal() {
                    break;
                }
            }
        }

        AffectedSet {
            tests: selected
                .into_iter()
                .map(|(path, s)| AffectedTest {
                    path,
                    reasons: s.reasons,
                    triggers: s.triggers,
                })
                .collect(),
            nothing_to_run: changed.is_empty(),
            changed_count,
            skipped_deleted,
            parse_warnings: ctx.graph.warnings().to_vec(),
        }
    }
}

/// Convenience wrapper over [`TestOracle::select`] with the default strategies.
pub fn select(changed: &[ChangedFile], ctx: &MappingContext<'_>) -> AffectedSet {
    TestOracle::default().select(changed, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomist::ImportSet;
    use common::{ChangeKind, TestConvention};
    use std::fs;

    struct Fixture {
        universe: TestUniverse,
        modules: ModuleIndex,
        graph: ImportGraph,
    }

    impl Fixture {
        fn new(tests: &[(&str, &[&str])], sources: &[&str]) -> Self {
            let universe = TestUniverse::from_paths(
                vec![PathBuf::from("tests")],
                TestConvention::default(),
                tests.iter().map(|(p, _)| *p),
            );
            let modules = ModuleIndex::from_paths(
                &["src".to_string()],
                sources.iter().chain(tests.iter().map(|(p, _)| p)),
            );
            let graph = ImportGraph::from_import_sets(
                tests
                    .iter()
                    .map(|(p, imports)| (*p, imports.iter().copied().collect::<ImportSet>())),
            );
            Self {
                universe,
                modules,
                graph,
            }
        }

        fn ctx(&self) -> MappingContext<'_> {
            MappingContext {
                universe: &self.universe,
                modules: &self.modules,
                graph: &self.graph,
            }
        }
    }

    fn calculator_project() -> Fixture {
        Fixture::new(
            &[
                ("tests/test_calculator.py", &["src.calculator", "src.formatter"]),
                ("tests/test_formatter.py", &["src.formatter"]),
                ("tests/test_utils.py", &[]),
            ],
            &["src/calculator.py", "src/formatter.py", "src/unused_helper.py"],
        )
    }

    fn reasons(set: &AffectedSet, path: &str) -> Vec<Reason> {
        set.get(Path::new(path))
            .map(|t| t.reasons.iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_naming_and_import_match() {
        let fx = Fixture::new(
            &[
                ("tests/test_calculator.py", &["src.calculator"]),
                ("tests/test_formatter.py", &["src.formatter"]),
            ],
            &["src/calculator.py", "src/formatter.py"],
        );
        let set = select(&[ChangedFile::modified("src/calculator.py")], &fx.ctx());

        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec![Path::new("tests/test_calculator.py")]
        );
        assert_eq!(
            reasons(&set, "tests/test_calculator.py"),
            vec![Reason::NamingConvention, Reason::ImportMatch]
        );
        assert_eq!(set.outcome(), Outcome::Selected);
    }

    #[test]
    fn test_explicit_parent_package_import() {
        // `from src import calculator` names the `src` package itself, so a
        // change to any module directly inside it reaches that test.
        let fx = Fixture::new(
            &[
                ("tests/test_calculator.py", &["src"]),
                ("tests/test_formatter.py", &["src.formatter"]),
            ],
            &["src/calculator.py", "src/formatter.py"],
        );
        let set = select(&[ChangedFile::modified("src/formatter.py")], &fx.ctx());

        assert_eq!(set.len(), 2);
        assert_eq!(
            reasons(&set, "tests/test_calculator.py"),
            vec![Reason::ImportMatch]
        );
        assert_eq!(
            reasons(&set, "tests/test_formatter.py"),
            vec![Reason::NamingConvention, Reason::ImportMatch]
        );
    }

    #[test]
    fn test_direct_change_short_circuits() {
        let fx = calculator_project();
        let set = select(&[ChangedFile::modified("tests/test_utils.py")], &fx.ctx());

        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec![Path::new("tests/test_utils.py")]
        );
        assert_eq!(
            reasons(&set, "tests/test_utils.py"),
            vec![Reason::DirectChange]
        );
    }

    #[test]
    fn test_empty_change_set_is_nothing_to_run() {
        let fx = calculator_project();
        let set = select(&[], &fx.ctx());

        assert!(set.is_empty());
        assert!(set.nothing_to_run);
        assert_eq!(set.outcome(), Outcome::NoChanges);
    }

    #[test]
    fn test_unmapped_change_is_not_nothing_to_run() {
        let fx = calculator_project();
        let set = select(&[ChangedFile::modified("src/unused_helper.py")], &fx.ctx());

        assert!(set.is_empty());
        assert!(!set.nothing_to_run);
        assert_eq!(set.changed_count, 1);
        assert_eq!(set.outcome(), Outcome::Unmapped);
    }

    #[test]
    fn test_naming_without_imports() {
        let fx = Fixture::new(
            &[("tests/pkg/test_calculator.py", &[])],
            &["pkg/calculator.py"],
        );
        let set = select(&[ChangedFile::modified("pkg/calculator.py")], &fx.ctx());
        assert_eq!(
            reasons(&set, "tests/pkg/test_calculator.py"),
            vec![Reason::NamingConvention]
        );
    }

    #[test]
    fn test_import_without_naming() {
        let fx = Fixture::new(
            &[("tests/test_arith.py", &["pkg", "pkg.calculator"])],
            &["pkg/calculator.py"],
        );
        let set = select(&[ChangedFile::modified("pkg/calculator.py")], &fx.ctx());
        assert_eq!(
            reasons(&set, "tests/test_arith.py"),
            vec![Reason::ImportMatch]
        );
    }

    #[test]
    fn test_source_root_stripped_identifier() {
        let fx = Fixture::new(
            &[("tests/test_app.py", &["app", "app.core"])],
            &["src/app/__init__.py", "src/app/core.py"],
        );
        let set = select(&[ChangedFile::modified("src/app/core.py")], &fx.ctx());
        assert_eq!(reasons(&set, "tests/test_app.py"), vec![Reason::ImportMatch]);
    }

    #[test]
    fn test_unindexed_file_still_maps() {
        // `src/fresh.py` was created after the module index was built.
        let fx = Fixture::new(&[("tests/test_new.py", &["fresh"])], &[]);
        assert!(fx.modules.resolve("fresh").is_none());

        let set = select(&[ChangedFile::new("src/fresh.py", ChangeKind::Added)], &fx.ctx());
        assert_eq!(reasons(&set, "tests/test_new.py"), vec![Reason::ImportMatch]);
    }

    #[test]
    fn test_ambiguous_identifier_keeps_every_importer() {
        let fx = Fixture::new(
            &[("tests/test_a.py", &["util"]), ("tests/test_b.py", &["src.util"])],
            &["src/util.py", "util.py"],
        );
        assert_eq!(fx.modules.resolve("util").map(|f| f.len()), Some(2));

        let set = select(&[ChangedFile::modified("src/util.py")], &fx.ctx());
        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec![Path::new("tests/test_a.py"), Path::new("tests/test_b.py")]
        );
    }

    #[test]
    fn test_deleted_files_counted_not_matched() {
        let fx = calculator_project();
        let set = select(
            &[
                ChangedFile::new("src/calculator.py", ChangeKind::Deleted),
                ChangedFile::new("tests/test_utils.py", ChangeKind::Deleted),
            ],
            &fx.ctx(),
        );
        assert!(set.is_empty());
        assert!(!set.nothing_to_run);
        assert_eq!(set.changed_count, 2);
        assert_eq!(set.skipped_deleted, 2);
    }

    #[test]
    fn test_triggers_merge_across_changes() {
        let fx = calculator_project();
        let set = select(
            &[
                ChangedFile::modified("src/formatter.py"),
                ChangedFile::modified("src/calculator.py"),
                ChangedFile::modified("./src/calculator.py"),
            ],
            &fx.ctx(),
        );

        assert_eq!(set.changed_count, 2);
        let calc = set.get(Path::new("tests/test_calculator.py")).unwrap();
        assert_eq!(
            calc.triggers.iter().collect::<Vec<_>>(),
            vec![Path::new("src/calculator.py"), Path::new("src/formatter.py")]
        );
        assert_eq!(
            calc.reasons.iter().copied().collect::<Vec<_>>(),
            vec![Reason::NamingConvention, Reason::ImportMatch]
        );
    }

    #[test]
    fn test_results_within_universe_with_reasons() {
        let fx = calculator_project();
        let changed: Vec<ChangedFile> = [
            "src/calculator.py",
            "src/formatter.py",
            "tests/test_utils.py",
            "tests/conftest.py",
            "README.md",
        ]
        .into_iter()
        .map(ChangedFile::modified)
        .collect();
        let set = select(&changed, &fx.ctx());

        assert!(!set.is_empty());
        for test in &set.tests {
            assert!(fx.universe.contains(&test.path));
            assert!(!test.reasons.is_empty());
            assert!(!test.triggers.is_empty());
        }
        let paths: Vec<&Path> = set.paths().collect();
        let mut sorted = paths.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let fx = calculator_project();
        let changed = [
            ChangedFile::modified("src/formatter.py"),
            ChangedFile::modified("tests/test_utils.py"),
            ChangedFile::modified("src/calculator.py"),
        ];
        let first = select(&changed, &fx.ctx());
        let second = select(&changed, &fx.ctx());
        assert_eq!(first, second);

        let mut reversed = changed.to_vec();
        reversed.reverse();
        assert_eq!(first, select(&reversed, &fx.ctx()));
    }

    #[test]
    fn test_custom_strategy_list() {
        let fx = calculator_project();
        let oracle = TestOracle::with_strategies(vec![Box::new(strategy::ImportMatch)]);
        let set = oracle.select(&[ChangedFile::modified("src/calculator.py")], &fx.ctx());
        for test in &set.tests {
            assert_eq!(
                test.reasons.iter().copied().collect::<Vec<_>>(),
                vec![Reason::ImportMatch]
            );
        }
    }

    #[test]
    fn test_json_shape() {
        let fx = calculator_project();
        let set = select(&[ChangedFile::modified("tests/test_utils.py")], &fx.ctx());
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["nothing_to_run"], false);
        assert_eq!(json["tests"][0]["path"], "tests/test_utils.py");
        assert_eq!(json["tests"][0]["reasons"][0], "direct-change");
    }

    #[test]
    fn test_project_index_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("src/__init__.py"), "").unwrap();
        fs::write(root.join("src/calculator.py"), "def add(a, b):\n    return a + b\n").unwrap();
        fs::write(root.join("src/formatter.py"), "def fmt(x):\n    return str(x)\n").unwrap();
        fs::write(
            root.join("tests/test_calculator.py"),
            "from src.calculator import add\n\ndef test_add():\n    assert add(1, 2) == 3\n",
        )
        .unwrap();
        fs::write(
            root.join("tests/test_formatter.py"),
            "from src.formatter import fmt\n",
        )
        .unwrap();
        fs::write(root.join("tests/test_broken.py"), "def broken(:\n").unwrap();

        let index = ProjectIndex::build(root, &Settings::default()).unwrap();
        assert_eq!(index.universe.len(), 3);
        assert_eq!(index.graph.warnings().len(), 1);

        let set = select(&[ChangedFile::modified("src/calculator.py")], &index.context());
        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec![Path::new("tests/test_calculator.py")]
        );
        assert_eq!(
            reasons(&set, "tests/test_calculator.py"),
            vec![Reason::NamingConvention, Reason::ImportMatch]
        );
        assert_eq!(set.parse_warnings.len(), 1);
    }

    fn write_project(root: &Path, files: &[(&str, &str)]) {
        for (path, contents) in files {
            let abs = root.join(path);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(abs, contents).unwrap();
        }
    }

    fn plain_import_project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            &[
                ("src/__init__.py", ""),
                ("src/calculator.py", "def add(a, b):\n    return a + b\n"),
                ("src/formatter.py", "def fmt(x):\n    return str(x)\n"),
                ("src/unused_helper.py", "def helper():\n    pass\n"),
                (
                    "tests/test_calculator.py",
                    "import src.calculator\n\ndef test_add():\n    assert src.calculator.add(1, 2) == 3\n",
                ),
                ("tests/test_formatter.py", "import src.formatter\n"),
            ],
        );
        tmp
    }

    #[test]
    fn test_plain_import_selects_only_the_imported_module() {
        let tmp = plain_import_project();
        let index = ProjectIndex::build(tmp.path(), &Settings::default()).unwrap();

        let set = select(&[ChangedFile::modified("src/calculator.py")], &index.context());
        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec![Path::new("tests/test_calculator.py")]
        );
        assert_eq!(
            reasons(&set, "tests/test_calculator.py"),
            vec![Reason::NamingConvention, Reason::ImportMatch]
        );
    }

    #[test]
    fn test_plain_import_unmapped_change() {
        let tmp = plain_import_project();
        let index = ProjectIndex::build(tmp.path(), &Settings::default()).unwrap();

        let set = select(&[ChangedFile::modified("src/unused_helper.py")], &index.context());
        assert!(set.is_empty());
        assert!(!set.nothing_to_run);
        assert_eq!(set.outcome(), Outcome::Unmapped);
    }

    #[test]
    fn test_plain_import_package_init_change() {
        // Both tests execute `src/__init__.py` when they import a submodule.
        let tmp = plain_import_project();
        let index = ProjectIndex::build(tmp.path(), &Settings::default()).unwrap();

        let set = select(&[ChangedFile::modified("src/__init__.py")], &index.context());
        assert_eq!(set.len(), 2);
        for test in &set.tests {
            assert_eq!(
                test.reasons.iter().copied().collect::<Vec<_>>(),
                vec![Reason::ImportMatch]
            );
        }
    }

    #[test]
    fn test_project_index_missing_explicit_test_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.tests.dirs = Some(vec![PathBuf::from("qa")]);
        let err = ProjectIndex::build(tmp.path(), &settings).unwrap_err();
        assert!(err.to_string().contains("qa"));
    }
}
