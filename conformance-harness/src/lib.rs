//! Shared utilities for writing deterministic conformance test runners.
//!
//! Runners keep their suite-specific loading and validation to themselves and
//! lean on this crate for the pieces every harness needs: turning expectation
//! keys into matchers, narrowing and sharding the candidate list, writing JSON
//! reports, and deciding the process exit code.

mod fail_on;
mod filter;
mod matcher;
mod report;
mod shard;

pub use fail_on::FailOn;
pub use filter::{build_filter, Filter};
pub use matcher::{MatchStrategy, Matcher, PatternError};
pub use report::{to_json_pretty_stable, write_json_report, write_json_report_to_writer};
pub use shard::{apply_shard, Shard};
