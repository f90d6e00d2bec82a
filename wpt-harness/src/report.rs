use crate::adapter::{ExecError, ExecResult, Registry, TestRef};
use crate::expectations::Reason;
use conformance_harness::FailOn;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
  Passed,
  Failed,
  TimedOut,
  Skipped,
}

impl fmt::Display for TestOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let value = match self {
      TestOutcome::Passed => "passed",
      TestOutcome::Failed => "failed",
      TestOutcome::TimedOut => "timed_out",
      TestOutcome::Skipped => "skipped",
    };
    f.write_str(value)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResult {
  pub path: String,
  pub group: String,
  pub outcome: TestOutcome,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_label: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<Reason>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Summary {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub timed_out: usize,
  pub skipped: usize,
}

impl Summary {
  fn record(&mut self, outcome: TestOutcome) {
    self.total += 1;
    match outcome {
      TestOutcome::Passed => self.passed += 1,
      TestOutcome::Failed => self.failed += 1,
      TestOutcome::TimedOut => self.timed_out += 1,
      TestOutcome::Skipped => self.skipped += 1,
    }
  }

  pub fn should_fail(&self, fail_on: FailOn) -> bool {
    fail_on.should_fail(self.failed, self.timed_out)
  }
}

impl fmt::Display for Summary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} passed, {} failed, {} timed out, {} skipped ({} total)",
      self.passed, self.failed, self.timed_out, self.skipped, self.total
    )
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
  pub schema_version: u32,
  pub summary: Summary,
  /// In dispatch order.
  pub results: Vec<TestResult>,
}

impl Report {
  pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
    self
      .results
      .iter()
      .filter(|r| matches!(r.outcome, TestOutcome::Failed | TestOutcome::TimedOut))
  }
}

/// A [`Registry`] that collects everything into a [`Report`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
  group: String,
  summary: Summary,
  results: Vec<TestResult>,
}

impl ReportBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn finish(self) -> Report {
    info!(summary = %self.summary, "run finished");
    Report {
      schema_version: REPORT_SCHEMA_VERSION,
      summary: self.summary,
      results: self.results,
    }
  }

  fn push(&mut self, result: TestResult) {
    self.summary.record(result.outcome);
    self.results.push(result);
  }
}

impl Registry for ReportBuilder {
  fn enter_group(&mut self, group: &str) {
    debug!(group, "entering group");
    self.group = group.to_string();
  }

  fn register_skip(
    &mut self,
    test: TestRef<'_>,
    label: &str,
    reason: Option<Reason>,
    note: Option<&str>,
  ) {
    debug!(path = test.path, label, "skipped");
    self.push(TestResult {
      path: test.path.to_string(),
      group: self.group.clone(),
      outcome: TestOutcome::Skipped,
      skip_label: Some(label.to_string()),
      skip_reason: reason,
      note: note.map(str::to_string),
      error: None,
    });
  }

  fn register_result(&mut self, test: TestRef<'_>, result: &ExecResult) {
    let (outcome, error) = match result {
      Ok(()) => (TestOutcome::Passed, None),
      Err(err @ ExecError::TimedOut(_)) => (TestOutcome::TimedOut, Some(err.to_string())),
      Err(err) => (TestOutcome::Failed, Some(err.to_string())),
    };
    debug!(path = test.path, %outcome, "finished");
    self.push(TestResult {
      path: test.path.to_string(),
      group: self.group.clone(),
      outcome,
      skip_label: None,
      skip_reason: None,
      note: None,
      error,
    });
  }
}
