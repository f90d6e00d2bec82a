use crate::adapter::{ExecResult, ExecutionAdapter, Registry};
use crate::config::{HarnessConfig, Scope};
use crate::expectations::ExpectationDocument;
use crate::manifest::{CandidateSet, Manifest};
use crate::reconcile::{Classification, Decision, Expectations};
use crate::validate::validate;
use crate::{HarnessError, Result};
use conformance_harness::{apply_shard, Filter, Shard};
use rayon::prelude::*;
use tracing::{debug, info};

/// Group name for candidates under no listed directory.
pub const UNLISTED_GROUP: &str = "(unlisted)";

/// Which part of the candidate set a run covers.
#[derive(Debug, Clone)]
pub struct Selection {
  pub filter: Filter,
  pub shard: Option<Shard>,
  pub scope: Scope,
}

impl Default for Selection {
  fn default() -> Self {
    Self {
      filter: Filter::All,
      shard: None,
      scope: Scope::All,
    }
  }
}

/// Everything loaded and validated before the first test is dispatched.
#[derive(Debug, Clone)]
pub struct Harness {
  candidates: CandidateSet,
  expectations: Expectations,
}

impl Harness {
  /// Reads and validates both inputs. The manifest version is checked before
  /// anything else is read.
  pub fn load(config: &HarnessConfig) -> Result<Self> {
    let manifest = Manifest::from_path(&config.manifest)?;
    let candidates = manifest.candidates()?;
    let document = ExpectationDocument::from_path(&config.expectations, config.strategy)?;
    Self::new(candidates, &document)
  }

  pub fn new(candidates: CandidateSet, document: &ExpectationDocument) -> Result<Self> {
    let expectations = validate(document, &candidates)?;
    Ok(Self {
      candidates,
      expectations,
    })
  }

  pub fn candidates(&self) -> &CandidateSet {
    &self.candidates
  }

  pub fn expectations(&self) -> &Expectations {
    &self.expectations
  }

  /// Classifies the selected candidates, ordered by group in expectations
  /// order (unlisted last) and by manifest order within a group.
  pub fn plan(&self, selection: &Selection) -> Result<Vec<Classification<'_, '_>>> {
    let filtered = self
      .candidates
      .iter()
      .filter(|path| selection.filter.matches(path));
    let selected: Vec<&str> = match selection.shard {
      Some(shard) => apply_shard(filtered, shard),
      None => filtered.collect(),
    };

    if selected.is_empty() && (!selection.filter.is_all() || selection.shard.is_some()) {
      return Err(HarnessError::Config(format!(
        "selection matched no tests out of {}",
        self.candidates.len()
      )));
    }

    let mut plan: Vec<Classification<'_, '_>> = selected
      .into_iter()
      .map(|path| self.expectations.classify(path))
      .filter(|c| selection.scope == Scope::All || c.group.is_some())
      .collect();
    plan.sort_by_key(|c| c.group.map_or(usize::MAX, |block| block.index));

    for group in plan.chunk_by(|a, b| a.group_name() == b.group_name()) {
      debug!(
        group = group[0].group_name().unwrap_or(UNLISTED_GROUP),
        run = group.iter().filter(|c| c.decision.is_run()).count(),
        skipped = group.iter().filter(|c| !c.decision.is_run()).count(),
        "classified group"
      );
    }
    info!(
      planned = plan.len(),
      skipped = plan.iter().filter(|c| !c.decision.is_run()).count(),
      "classified candidates"
    );
    Ok(plan)
  }

  /// Executes the run entries of `plan` and reports every entry to
  /// `registry` in plan order.
  ///
  /// With `jobs > 1` the adapter is called from a thread pool; registration
  /// still happens on the calling thread, in order, once all runs finish.
  pub fn dispatch(
    &self,
    plan: &[Classification<'_, '_>],
    adapter: &dyn ExecutionAdapter,
    jobs: usize,
    registry: &mut dyn Registry,
  ) -> Result<()> {
    let runs: Vec<_> = plan.iter().filter(|c| c.decision.is_run()).collect();
    let execute = |c: &&Classification<'_, '_>| -> ExecResult {
      debug!(path = c.path, "dispatching");
      adapter.execute(c.test_ref())
    };

    let results: Vec<ExecResult> = if jobs > 1 {
      let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|err| HarnessError::Config(format!("build thread pool: {err}")))?;
      pool.install(|| runs.par_iter().map(execute).collect())
    } else {
      runs.iter().map(execute).collect()
    };
    let mut results = results.into_iter();

    let mut current_group = None;
    for c in plan {
      let group = c.group_name().unwrap_or(UNLISTED_GROUP);
      if current_group != Some(group) {
        registry.enter_group(group);
        current_group = Some(group);
      }

      match c.decision {
        Decision::Skip(rule) => {
          let label = c.skip_label().unwrap_or_else(|| c.path.to_string());
          registry.register_skip(c.test_ref(), &label, rule.reason, rule.note.as_deref());
        }
        Decision::Run => {
          if let Some(result) = results.next() {
            registry.register_result(c.test_ref(), &result);
          }
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapter::{ExecError, TestRef};
  use crate::expectations::Reason;
  use crate::report::{ReportBuilder, TestOutcome};
  use conformance_harness::{build_filter, MatchStrategy};
  use std::sync::Mutex;

  fn harness() -> Harness {
    let candidates: CandidateSet = [
      "dom/a.html",
      "css/foo.html",
      "other/x.html",
      "css/bar.html",
      "dom/slow.html",
    ]
    .into_iter()
    .collect();
    let document = ExpectationDocument::from_str(
      "DIR: css\nfoo.html: [fail, crbug/1]\n---\nDIR: dom\nslow.html: [timeout]\n",
      MatchStrategy::Glob,
    )
    .unwrap();
    Harness::new(candidates, &document).unwrap()
  }

  fn paths(plan: &[Classification<'_, '_>]) -> Vec<String> {
    plan.iter().map(|c| c.path.to_string()).collect()
  }

  #[test]
  fn plan_groups_by_directory_order() {
    let harness = harness();
    let plan = harness.plan(&Selection::default()).unwrap();
    assert_eq!(
      paths(&plan),
      ["css/foo.html", "css/bar.html", "dom/a.html", "dom/slow.html", "other/x.html"]
    );
  }

  #[test]
  fn listed_scope_drops_unlisted_candidates() {
    let harness = harness();
    let plan = harness
      .plan(&Selection {
        scope: Scope::Listed,
        ..Selection::default()
      })
      .unwrap();
    assert!(!paths(&plan).contains(&"other/x.html".to_string()));
    assert_eq!(plan.len(), 4);
  }

  #[test]
  fn empty_filter_selection_is_an_error() {
    let harness = harness();
    let err = harness
      .plan(&Selection {
        filter: build_filter(Some("nothing/**")).unwrap(),
        ..Selection::default()
      })
      .unwrap_err();
    assert!(err.to_string().contains("matched no tests out of 5"));
  }

  #[test]
  fn regex_filter_narrows_the_plan() {
    let harness = harness();
    let plan = harness
      .plan(&Selection {
        filter: build_filter(Some("re:^(css/f|other/)")).unwrap(),
        ..Selection::default()
      })
      .unwrap();
    assert_eq!(paths(&plan), ["css/foo.html", "other/x.html"]);
  }

  #[test]
  fn dispatch_skips_and_runs_in_plan_order() {
    let harness = harness();
    let plan = harness.plan(&Selection::default()).unwrap();
    let seen = Mutex::new(Vec::new());
    let adapter = |test: TestRef<'_>| {
      seen.lock().unwrap().push(test.path.to_string());
      if test.path == "dom/a.html" {
        Err(ExecError::Failed("nope".into()))
      } else {
        Ok(())
      }
    };

    let mut builder = ReportBuilder::new();
    harness.dispatch(&plan, &adapter, 1, &mut builder).unwrap();
    let report = builder.finish();

    assert_eq!(
      seen.into_inner().unwrap(),
      ["css/bar.html", "dom/a.html", "other/x.html"]
    );
    let rows: Vec<_> = report
      .results
      .iter()
      .map(|r| (r.path.as_str(), r.group.as_str(), r.outcome))
      .collect();
    assert_eq!(
      rows,
      [
        ("css/foo.html", "css", TestOutcome::Skipped),
        ("css/bar.html", "css", TestOutcome::Passed),
        ("dom/a.html", "dom", TestOutcome::Failed),
        ("dom/slow.html", "dom", TestOutcome::Skipped),
        ("other/x.html", UNLISTED_GROUP, TestOutcome::Passed),
      ]
    );
    assert_eq!(report.results[0].skip_label.as_deref(), Some("[fail] foo.html"));
    assert_eq!(report.results[0].skip_reason, Some(Reason::Fail));
    assert_eq!(report.results[0].note.as_deref(), Some("crbug/1"));
    assert_eq!(report.results[3].skip_reason, Some(Reason::Timeout));
  }

  #[test]
  fn parallel_dispatch_registers_in_plan_order() {
    let harness = harness();
    let plan = harness.plan(&Selection::default()).unwrap();
    let adapter = |_: TestRef<'_>| -> ExecResult { Ok(()) };

    let mut serial = ReportBuilder::new();
    harness.dispatch(&plan, &adapter, 1, &mut serial).unwrap();
    let mut parallel = ReportBuilder::new();
    harness.dispatch(&plan, &adapter, 4, &mut parallel).unwrap();

    assert_eq!(serial.finish(), parallel.finish());
  }
}
