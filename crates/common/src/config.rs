//! Layered configuration: compiled defaults, then `pytest-smart.toml`, then CLI flags.

use crate::TestConvention;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the optional configuration file looked up in the project root.
pub const CONFIG_FILE: &str = "pytest-smart.toml";

/// Test directories searched when none are configured.
pub const DEFAULT_TEST_DIRS: &[&str] = &["tests", "test"];

/// Directory names never descended into while walking the project.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "__pycache__",
    ".git",
    "venv",
    ".venv",
    "node_modules",
    ".pytest_cache",
    ".tox",
    "build",
    "dist",
];

/// Errors from loading or applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("test directory does not exist: {}", .0.display())]
    MissingTestDir(PathBuf),
    #[error("no test directory found (looked for: {0})")]
    NoTestDirectories(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tests: TestsConfig,
    pub modules: ModulesConfig,
    pub runner: RunnerConfig,
}

/// `[tests]`: where tests live and how they are named.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    /// Test directory roots relative to the project root. `None` means the defaults.
    pub dirs: Option<Vec<PathBuf>>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        let convention = TestConvention::default();
        Self {
            dirs: None,
            prefixes: convention.prefixes,
            suffixes: convention.suffixes,
        }
    }
}

/// `[modules]`: how project files map to import names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Top-level directories that are not part of the import path (`src/pkg/x.py` is `pkg.x`).
    pub source_roots: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            source_roots: vec!["src".to_string()],
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What to do when changes exist but no test maps to them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnUnmapped {
    /// Report and exit successfully.
    #[default]
    Skip,
    /// Run the whole suite.
    All,
}

/// `[runner]`: the test runner the selection is handed to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub command: Vec<String>,
    pub on_unmapped: OnUnmapped,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string()],
            on_unmapped: OnUnmapped::Skip,
        }
    }
}

/// Test directory roots plus whether the user chose them.
///
/// Explicit roots must all exist; default roots are best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRoots {
    pub dirs: Vec<PathBuf>,
    pub explicit: bool,
}

/// CLI values that override file settings when present.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub test_dirs: Vec<PathBuf>,
    pub fallback_all: bool,
}

impl Settings {
    /// Loads settings from a TOML file. A missing file yields the defaults; a
    /// file that exists but can't be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `pytest-smart.toml` from the project root.
    pub fn load_from_root(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load(&project_root.join(CONFIG_FILE))
    }

    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if !overrides.test_dirs.is_empty() {
            self.tests.dirs = Some(overrides.test_dirs.clone());
        }
        if overrides.fallback_all {
            self.runner.on_unmapped = OnUnmapped::All;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tests.prefixes.iter().all(|p| p.is_empty())
            && self.tests.suffixes.iter().all(|s| s.is_empty())
        {
            return Err(ConfigError::Invalid(
                "at least one non-empty test prefix or suffix is required".into(),
            ));
        }
        if self.runner.command.is_empty() {
            return Err(ConfigError::Invalid("runner command is empty".into()));
        }
        if let Some(dirs) = &self.tests.dirs {
            if dirs.is_empty() {
                return Err(ConfigError::Invalid("tests.dirs is empty".into()));
            }
        }
        Ok(())
    }

    pub fn convention(&self) -> TestConvention {
        TestConvention {
            prefixes: nonempty(&self.tests.prefixes),
            suffixes: nonempty(&self.tests.suffixes),
        }
    }

    pub fn test_roots(&self) -> TestRoots {
        match &self.tests.dirs {
            Some(dirs) => TestRoots {
                dirs: dirs.clone(),
                explicit: true,
            },
            None => TestRoots {
                dirs: DEFAULT_TEST_DIRS.iter().map(PathBuf::from).collect(),
                explicit: false,
            },
        }
    }
}

fn nonempty(markers: &[String]) -> Vec<String> {
    markers.iter().filter(|m| !m.is_empty()).cloned().collect()
}
