use anatomist::path_util::{canonical_root, normalize_path};
use anyhow::Context;
use clap::Parser;
use common::config::{CliOverrides, OnUnmapped, Settings};
use common::ChangedFile;
use oracle::{AffectedSet, Outcome, ProjectIndex, TestOracle};
use scout::{ChangeSource, GitChangeDetector};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing_subscriber::EnvFilter;

/// Runs only the pytest tests affected by your changes.
#[derive(Parser, Debug)]
#[command(name = "pytest-smart", version, about, long_about = None)]
struct Cli {
    /// Compare the working tree against this ref.
    #[arg(long, default_value = "HEAD")]
    base: String,

    /// Use every change between this commit and HEAD.
    #[arg(long, value_name = "SHA", conflicts_with_all = ["base_branch", "staged_only", "unstaged_only", "no_untracked"])]
    from_commit: Option<String>,

    /// Use the changes on --target-branch since it forked from this branch.
    #[arg(long, value_name = "BRANCH", conflicts_with_all = ["staged_only", "unstaged_only", "no_untracked"])]
    base_branch: Option<String>,

    /// Branch compared against --base-branch.
    #[arg(long, value_name = "BRANCH", default_value = "HEAD", requires = "base_branch")]
    target_branch: String,

    /// Only consider staged changes.
    #[arg(long, conflicts_with = "unstaged_only")]
    staged_only: bool,

    /// Only consider unstaged changes.
    #[arg(long)]
    unstaged_only: bool,

    /// Ignore untracked files.
    #[arg(long)]
    no_untracked: bool,

    /// Test directory to scan (repeatable). Replaces the configured ones.
    #[arg(long = "test-dir", value_name = "DIR")]
    test_dirs: Vec<PathBuf>,

    /// Project root. Defaults to the current directory.
    #[arg(long, value_name = "DIR", default_value = ".")]
    project_root: PathBuf,

    /// Config file. Defaults to pytest-smart.toml in the project root.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show the selection without running pytest.
    #[arg(long)]
    dry_run: bool,

    /// Print the selection as JSON.
    #[arg(long)]
    json: bool,

    /// Run the full suite when changes map to no tests.
    #[arg(long)]
    fallback_all: bool,

    /// Debug logging and per-test reasons.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long)]
    quiet: bool,

    /// Arguments passed through to pytest.
    #[arg(last = true, value_name = "PYTEST_ARGS")]
    pytest_args: Vec<String>,
}

impl Cli {
    fn change_source(&self) -> ChangeSource {
        if let Some(sha) = &self.from_commit {
            return ChangeSource::SinceCommit(sha.clone());
        }
        if let Some(base) = &self.base_branch {
            return ChangeSource::Branches {
                base: base.clone(),
                target: self.target_branch.clone(),
            };
        }
        ChangeSource::WorkingTree {
            base: self.base.clone(),
            staged: !self.unstaged_only,
            unstaged: !self.staged_only,
            untracked: !self.no_untracked && !self.staged_only,
        }
    }

    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            test_dirs: self.test_dirs.clone(),
            fallback_all: self.fallback_all,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --quiet = error only, --verbose = debug, default = warnings
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(".env: {e}");
        }
    }
    tracing::debug!(?cli, "parsed CLI arguments");

    let project_root = canonical_root(&cli.project_root)
        .with_context(|| format!("invalid project root {}", cli.project_root.display()))?;

    let mut settings = match &cli.config {
        Some(path) => {
            anyhow::ensure!(path.is_file(), "config file not found: {}", path.display());
            Settings::load(path)?
        }
        None => Settings::load_from_root(&project_root)?,
    };
    settings.apply_cli_overrides(&cli.overrides());

    let detector = GitChangeDetector::open(&project_root)?;
    let changed = detector
        .detect(&cli.change_source())
        .context("change detection failed")?;

    let index = ProjectIndex::build(&project_root, &settings)?;
    let affected = TestOracle::new().select(&changed, &index.context());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&affected)?);
    } else if !cli.quiet {
        report(&changed, &affected, cli.verbose, settings.runner.on_unmapped);
    }

    let Some(paths) = tests_to_run(&affected, settings.runner.on_unmapped) else {
        return Ok(());
    };
    if cli.dry_run {
        return Ok(());
    }

    let code = run_tests(&project_root, &settings.runner.command, &paths, &cli.pytest_args)?;
    std::process::exit(code);
}

fn report(
    changed: &[ChangedFile],
    affected: &AffectedSet,
    verbose: bool,
    on_unmapped: OnUnmapped,
) {
    for line in report_lines(changed, affected, verbose, on_unmapped) {
        println!("{line}");
    }
}

fn report_lines(
    changed: &[ChangedFile],
    affected: &AffectedSet,
    verbose: bool,
    on_unmapped: OnUnmapped,
) -> Vec<String> {
    let mut lines = Vec::new();
    if affected.outcome() == Outcome::NoChanges {
        lines.push("No Python files changed. Nothing to test.".to_string());
        return lines;
    }

    lines.push(format!(
        "{} changed Python file(s) found",
        affected.changed_count
    ));
    if verbose {
        for file in changed {
            lines.push(format!("  {} ({})", normalize_path(&file.path), file.kind));
        }
    }

    for warning in &affected.parse_warnings {
        lines.push(format!(
            "warning: could not parse {}: {}",
            normalize_path(&warning.path),
            warning.message
        ));
    }

    if affected.is_empty() {
        lines.push("No tests affected by the changes.".to_string());
        if on_unmapped == OnUnmapped::All {
            lines.push("Running the full test suite instead.".to_string());
        }
        return lines;
    }

    lines.push(format!("Found {} affected test file(s):", affected.len()));
    for test in &affected.tests {
        if verbose {
            let reasons: Vec<String> = test.reasons.iter().map(|r| r.to_string()).collect();
            let triggers: Vec<String> = test
                .triggers
                .iter()
                .map(|t| normalize_path(t))
                .collect();
            lines.push(format!(
                "  {} [{}] <- {}",
                normalize_path(&test.path),
                reasons.join(", "),
                triggers.join(", ")
            ));
        } else {
            lines.push(format!("  {}", normalize_path(&test.path)));
        }
    }
    lines
}

/// Paths to hand to the runner, or `None` when nothing should run.
///
/// An empty list means the full suite.
fn tests_to_run(affected: &AffectedSet, on_unmapped: OnUnmapped) -> Option<Vec<PathBuf>> {
    match affected.outcome() {
        Outcome::NoChanges => None,
        Outcome::Unmapped => match on_unmapped {
            OnUnmapped::Skip => None,
            OnUnmapped::All => Some(Vec::new()),
        },
        Outcome::Selected => Some(affected.paths().map(Path::to_path_buf).collect()),
    }
}

fn runner_args(command: &[String], paths: &[PathBuf], passthrough: &[String]) -> Vec<String> {
    command
        .iter()
        .skip(1)
        .cloned()
        .chain(paths.iter().map(|p| normalize_path(p)))
        .chain(passthrough.iter().cloned())
        .collect()
}

fn run_tests(
    project_root: &Path,
    command: &[String],
    paths: &[PathBuf],
    passthrough: &[String],
) -> anyhow::Result<i32> {
    let program = command
        .first()
        .context("runner command is empty")?;
    let args = runner_args(command, paths, passthrough);
    tracing::debug!(program = %program, ?args, "running tests");

    let status = Command::new(program)
        .args(&args)
        .current_dir(project_root)
        .status()
        .with_context(|| format!("failed to run {program}"))?;

    Ok(status.code().unwrap_or(1))
}
