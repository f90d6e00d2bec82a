use conformance_harness::{MatchStrategy, Shard};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use wpt_harness::{
  Decision, ExecError, Harness, HarnessConfig, HarnessError, Reason, ReportBuilder, Scope,
  Selection, TestOutcome, TestRef,
};

const MANIFEST: &str = r#"{
  "version": 4,
  "items": {
    "testharness": {
      "css/foo.html": [["/css/foo.html", {}]],
      "css/bar.html": [["/css/bar.html", {}]],
      "css/grid/a.html": [["/css/grid/a.html", {}]],
      "dom/nodes/Node-cloneNode.html": [["/dom/nodes/Node-cloneNode.html", {}]],
      "dom/nodes/Node-cloneNode.worker.js": [["/dom/nodes/Node-cloneNode.worker.html", {}]],
      "html/canvas/shape.svg": [["/html/canvas/shape.svg", {}]],
      "xhr/open.html": [["/xhr/open.html", {}]]
    }
  }
}"#;

const TO_RUN: &str = r#"
DIR: css
foo.html: [fail, https://github.com/example/wpt/issues/1]
"grid/*.html": [timeout]
---
DIR: dom
"nodes/*": [fail]
"#;

fn write_inputs(dir: &Path, manifest: &str, to_run: &str) -> HarnessConfig {
  let manifest_path = dir.join("wpt-manifest.json");
  let expectations_path = dir.join("to-run.yaml");
  fs::write(&manifest_path, manifest).unwrap();
  fs::write(&expectations_path, to_run).unwrap();
  HarnessConfig {
    manifest: manifest_path,
    expectations: expectations_path,
    strategy: MatchStrategy::Glob,
    scope: Scope::All,
  }
}

#[test]
fn listed_tests_skip_and_the_rest_run() {
  let temp = tempdir().unwrap();
  let config = write_inputs(temp.path(), MANIFEST, TO_RUN);
  let harness = Harness::load(&config).unwrap();

  let candidates: Vec<_> = harness.candidates().iter().collect();
  assert_eq!(
    candidates,
    [
      "css/foo.html",
      "css/bar.html",
      "css/grid/a.html",
      "dom/nodes/Node-cloneNode.html",
      "xhr/open.html",
    ]
  );
  assert_eq!(harness.candidates().excluded(), 2);

  let expectations = harness.expectations();
  let foo = expectations.classify("css/foo.html");
  match foo.decision {
    Decision::Skip(rule) => assert_eq!(rule.reason, Some(Reason::Fail)),
    Decision::Run => panic!("css/foo.html should be skipped"),
  }
  assert!(expectations.classify("css/bar.html").decision.is_run());
  assert!(expectations.classify("xhr/open.html").decision.is_run());
}

#[test]
fn dispatch_reports_every_candidate_once() {
  let temp = tempdir().unwrap();
  let config = write_inputs(temp.path(), MANIFEST, TO_RUN);
  let harness = Harness::load(&config).unwrap();
  let plan = harness.plan(&Selection::default()).unwrap();

  let adapter = |test: TestRef<'_>| {
    if test.path.starts_with("xhr/") {
      Err(ExecError::Failed("network".into()))
    } else {
      Ok(())
    }
  };
  let mut builder = ReportBuilder::new();
  harness.dispatch(&plan, &adapter, 2, &mut builder).unwrap();
  let report = builder.finish();

  assert_eq!(report.summary.total, 5);
  assert_eq!(report.summary.skipped, 3);
  assert_eq!(report.summary.passed, 1);
  assert_eq!(report.summary.failed, 1);

  let labels: Vec<_> = report
    .results
    .iter()
    .filter_map(|r| r.skip_label.as_deref())
    .collect();
  assert_eq!(
    labels,
    ["[fail] foo.html", "[timeout] grid/a.html", "[fail] nodes/Node-cloneNode.html"]
  );
  let xhr = report.results.last().unwrap();
  assert_eq!(xhr.path, "xhr/open.html");
  assert_eq!(xhr.outcome, TestOutcome::Failed);
}

#[test]
fn listed_scope_and_shards_narrow_the_plan() {
  let temp = tempdir().unwrap();
  let config = write_inputs(temp.path(), MANIFEST, TO_RUN);
  let harness = Harness::load(&config).unwrap();

  let listed = harness
    .plan(&Selection {
      scope: Scope::Listed,
      ..Selection::default()
    })
    .unwrap();
  assert!(listed.iter().all(|c| c.group.is_some()));
  assert_eq!(listed.len(), 4);

  let mut seen = Vec::new();
  for index in 0..2 {
    let plan = harness
      .plan(&Selection {
        shard: Some(Shard { index, total: 2 }),
        ..Selection::default()
      })
      .unwrap();
    seen.extend(plan.iter().map(|c| c.path.to_string()));
  }
  seen.sort();
  assert_eq!(seen.len(), 5);
  seen.dedup();
  assert_eq!(seen.len(), 5);
}

#[test]
fn wrong_manifest_version_stops_before_expectations_are_read() {
  let temp = tempdir().unwrap();
  let manifest = MANIFEST.replace("\"version\": 4", "\"version\": 3");
  // The expectations would also fail validation; the version error must win.
  let config = write_inputs(temp.path(), &manifest, "DIR: zzz\n---\nDIR: aaa\n");
  let err = Harness::load(&config).unwrap_err();
  assert!(
    matches!(err, HarnessError::ManifestVersion { expected: 4, .. }),
    "{err}"
  );
}

#[test]
fn unsorted_directories_abort_loading() {
  let temp = tempdir().unwrap();
  let to_run = "DIR: dom\n\"nodes/*\": [fail]\n---\nDIR: css\nfoo.html: [fail]\n";
  let config = write_inputs(temp.path(), MANIFEST, to_run);
  let err = Harness::load(&config).unwrap_err().to_string();
  assert!(err.contains("css should come before dom"), "{err}");
}

#[test]
fn stale_expectation_aborts_loading() {
  let temp = tempdir().unwrap();
  let to_run = "DIR: css\nfoo.html: [fail]\nremoved-test.html: [timeout]\n";
  let config = write_inputs(temp.path(), MANIFEST, to_run);
  let err = Harness::load(&config).unwrap_err().to_string();
  assert!(err.contains("removed-test.html"), "{err}");
}

#[test]
fn exact_strategy_treats_any_value_as_skip() {
  let temp = tempdir().unwrap();
  let mut config = write_inputs(
    temp.path(),
    MANIFEST,
    "DIR: css\nbar.html: 0\nfoo.html: true\n---\nDIR: dom\nnodes/Node-cloneNode.html: ~\n",
  );
  config.strategy = MatchStrategy::Exact;
  let harness = Harness::load(&config).unwrap();
  let plan = harness.plan(&Selection::default()).unwrap();

  let skipped: Vec<_> = plan.iter().filter_map(|c| c.skip_label()).collect();
  assert_eq!(
    skipped,
    ["css/foo.html", "css/bar.html", "dom/nodes/Node-cloneNode.html"]
  );
  assert!(harness.expectations().classify("css/grid/a.html").decision.is_run());
}

#[test]
fn indexed_mapping_reason_skips_the_test() {
  let temp = tempdir().unwrap();
  let config = write_inputs(temp.path(), MANIFEST, "DIR: css\nfoo.html: {0: \"fail\"}\n");
  let harness = Harness::load(&config).unwrap();

  let classification = harness.expectations().classify("css/foo.html");
  match classification.decision {
    Decision::Skip(rule) => assert_eq!(rule.reason, Some(Reason::Fail)),
    Decision::Run => panic!("css/foo.html should be skipped"),
  }
  assert_eq!(classification.skip_label().as_deref(), Some("[fail] foo.html"));
  assert!(harness.expectations().classify("css/bar.html").decision.is_run());
}
