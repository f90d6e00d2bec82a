use crate::{HarnessError, Result};
use clap::ValueEnum;
use conformance_harness::MatchStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MANIFEST: &str = "wpt-manifest.json";
pub const DEFAULT_EXPECTATIONS: &str = "to-run.yaml";
pub const DEFAULT_TESTS_ROOT: &str = "tests";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Which candidates are dispatched at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
  /// Every candidate; those under no listed directory simply run.
  #[default]
  All,
  /// Only candidates under a directory named in the expectations list.
  Listed,
}

/// Optional TOML file with the same settings as the command line.
///
/// Relative paths are resolved against the file's own directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
  pub manifest: Option<PathBuf>,
  pub expectations: Option<PathBuf>,
  pub strategy: Option<MatchStrategy>,
  pub scope: Option<Scope>,
  pub tests_root: Option<PathBuf>,
  pub timeout_secs: Option<u64>,
  pub jobs: Option<usize>,
  pub adapter: Vec<String>,
}

impl ConfigFile {
  pub fn from_path(path: &Path) -> Result<Self> {
    let raw = fs::read_to_string(path)?;
    let mut config = Self::from_str(&raw).map_err(|err| match err {
      HarnessError::Config(msg) => HarnessError::Config(format!("{}: {msg}", path.display())),
      other => other,
    })?;
    if let Some(base) = path.parent() {
      config.rebase(base);
    }
    Ok(config)
  }

  pub fn from_str(raw: &str) -> Result<Self> {
    toml::from_str(raw).map_err(|err| HarnessError::Config(format!("parse config: {err}")))
  }

  fn rebase(&mut self, base: &Path) {
    for slot in [&mut self.manifest, &mut self.expectations, &mut self.tests_root] {
      if let Some(path) = slot.as_mut() {
        if path.is_relative() {
          *path = base.join(&*path);
        }
      }
    }
  }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct HarnessOverrides {
  pub manifest: Option<PathBuf>,
  pub expectations: Option<PathBuf>,
  pub strategy: Option<MatchStrategy>,
  pub scope: Option<Scope>,
}

/// Where the inputs live and how to read them. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
  pub manifest: PathBuf,
  pub expectations: PathBuf,
  pub strategy: MatchStrategy,
  pub scope: Scope,
}

impl Default for HarnessConfig {
  fn default() -> Self {
    Self::resolve(&ConfigFile::default(), HarnessOverrides::default())
  }
}

impl HarnessConfig {
  pub fn resolve(file: &ConfigFile, cli: HarnessOverrides) -> Self {
    Self {
      manifest: cli
        .manifest
        .or_else(|| file.manifest.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST)),
      expectations: cli
        .expectations
        .or_else(|| file.expectations.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPECTATIONS)),
      strategy: cli.strategy.or(file.strategy).unwrap_or_default(),
      scope: cli.scope.or(file.scope).unwrap_or_default(),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
  pub tests_root: Option<PathBuf>,
  pub timeout_secs: Option<u64>,
  pub jobs: Option<usize>,
  pub adapter: Vec<String>,
}

/// Settings that only matter once tests are actually executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
  pub tests_root: PathBuf,
  pub timeout: Duration,
  pub jobs: usize,
  /// Program and arguments of the execution adapter.
  pub adapter: Vec<String>,
}

impl RunConfig {
  pub fn resolve(file: &ConfigFile, cli: RunOverrides) -> Result<Self> {
    let adapter = if cli.adapter.is_empty() {
      file.adapter.clone()
    } else {
      cli.adapter
    };
    if adapter.is_empty() {
      return Err(HarnessError::Config(
        "no adapter command given (pass it after `--` or set `adapter` in the config file)".into(),
      ));
    }

    let jobs = cli.jobs.or(file.jobs).unwrap_or(1);
    if jobs == 0 {
      return Err(HarnessError::Config("jobs must be at least 1".into()));
    }

    Ok(Self {
      tests_root: cli
        .tests_root
        .or_else(|| file.tests_root.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TESTS_ROOT)),
      timeout: Duration::from_secs(
        cli
          .timeout_secs
          .or(file.timeout_secs)
          .unwrap_or(DEFAULT_TIMEOUT_SECS),
      ),
      jobs,
      adapter,
    })
  }
}
