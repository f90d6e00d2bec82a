//! Test selection for running web-platform-tests against one implementation.
//!
//! A run has two phases. Loading reads the manifest and the expectations
//! list, builds the candidate set and validates the list against it; any
//! problem there aborts before a single test is dispatched. Dispatch then
//! classifies every candidate as run or skip and hands it to an
//! [`adapter::ExecutionAdapter`] or records the skip in a
//! [`adapter::Registry`].

use std::io;
use thiserror::Error;

pub mod adapter;
pub mod config;
pub mod expectations;
pub mod manifest;
pub mod reconcile;
pub mod report;
pub mod runner;
pub mod validate;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("WPT manifest format mismatch; expected version {expected} but got {found}")]
  ManifestVersion { expected: u64, found: String },
  #[error("invalid manifest: {0}")]
  ManifestFormat(String),
  #[error("invalid expectations: {0}")]
  ExpectationsFormat(String),
  #[error("bad lexicographical directory sorting in expectations: {dir} should come before {previous}")]
  DirectoryOrder { dir: String, previous: String },
  #[error(
    "bad lexicographical expectation pattern sorting in {dir}: {pattern} should come before {previous}"
  )]
  PatternOrder {
    dir: String,
    pattern: String,
    previous: String,
  },
  #[error("bad reason \"{reason}\" for expectation {pattern} in {dir}")]
  UnknownReason {
    dir: String,
    pattern: String,
    reason: String,
  },
  #[error("expectation {pattern} in {dir} does not match any test in the manifest")]
  UnmatchedExpectation { dir: String, pattern: String },
  #[error("invalid pattern {pattern} in {dir}: {message}")]
  InvalidPattern {
    dir: String,
    pattern: String,
    message: String,
  },
  #[error("invalid configuration: {0}")]
  Config(String),
}

pub use adapter::{CommandAdapter, ExecError, ExecResult, ExecutionAdapter, Registry, TestRef};
pub use config::{ConfigFile, HarnessConfig, RunConfig, Scope};
pub use expectations::{DirectoryBlock, ExpectationDocument, ExpectationEntry, Reason, SkipSpec};
pub use manifest::{CandidateSet, Manifest, EXPECTED_MANIFEST_VERSION};
pub use reconcile::{Block, Classification, Decision, Expectations, Rule};
pub use report::{Report, ReportBuilder, Summary, TestOutcome, TestResult, REPORT_SCHEMA_VERSION};
pub use runner::{Harness, Selection, UNLISTED_GROUP};
pub use validate::validate;
