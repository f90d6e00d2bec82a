use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which outcomes of executed tests make the runner exit non-zero.
///
/// Skipped tests never count; they were not executed.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailOn {
  /// Non-zero on any failure or timeout (default).
  #[default]
  Any,
  /// Non-zero on failures only; timeouts are tolerated.
  Failed,
  /// Always zero.
  None,
}

impl FailOn {
  pub fn should_fail(&self, failed: usize, timed_out: usize) -> bool {
    match self {
      FailOn::Any => failed + timed_out > 0,
      FailOn::Failed => failed > 0,
      FailOn::None => false,
    }
  }
}
