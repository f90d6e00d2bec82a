use clap::ValueEnum;
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How expectation keys are compared against test paths.
///
/// A harness picks one strategy per run and compiles every key through it, so
/// validation and classification always agree on what a key matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
  /// Keys are literal file names.
  Exact,
  /// Keys are filesystem-style glob patterns; `*` and `?` never cross a `/`.
  #[default]
  Glob,
}

impl MatchStrategy {
  pub fn as_str(self) -> &'static str {
    match self {
      MatchStrategy::Exact => "exact",
      MatchStrategy::Glob => "glob",
    }
  }

  pub fn compile(self, key: &str) -> Result<Matcher, PatternError> {
    match self {
      MatchStrategy::Exact => Ok(Matcher::Exact(key.to_string())),
      MatchStrategy::Glob => {
        let glob = GlobBuilder::new(key)
          .literal_separator(true)
          .build()
          .map_err(|err| PatternError {
            pattern: key.to_string(),
            message: err.kind().to_string(),
          })?;
        Ok(Matcher::Glob(glob.compile_matcher()))
      }
    }
  }
}

impl fmt::Display for MatchStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid glob '{pattern}': {message}")]
pub struct PatternError {
  pub pattern: String,
  pub message: String,
}

#[derive(Debug, Clone)]
pub enum Matcher {
  Exact(String),
  Glob(GlobMatcher),
}

impl Matcher {
  pub fn matches(&self, candidate: &str) -> bool {
    match self {
      Matcher::Exact(key) => key == candidate,
      Matcher::Glob(glob) => glob.is_match(candidate),
    }
  }

  /// The key this matcher was compiled from.
  pub fn key(&self) -> &str {
    match self {
      Matcher::Exact(key) => key,
      Matcher::Glob(glob) => glob.glob().glob(),
    }
  }
}
