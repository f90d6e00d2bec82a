use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use conformance_harness::{build_filter, write_json_report, FailOn, MatchStrategy, Shard};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;
use wpt_harness::config::{ConfigFile, HarnessOverrides, RunOverrides};
use wpt_harness::validate::rule_match_counts;
use wpt_harness::{
  CommandAdapter, Decision, Harness, HarnessConfig, ReportBuilder, RunConfig, Scope, Selection,
};

#[derive(Parser, Debug)]
#[command(version, about = "Select, skip and dispatch web-platform-tests", long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Check the expectations list against the manifest without running anything.
  Validate {
    #[command(flatten)]
    common: CommonArgs,

    /// Print how many tests each expectation matches.
    #[arg(long)]
    counts: bool,
  },
  /// Print the run/skip decision for every selected test.
  List(CommonArgs),
  /// Run the selected tests through an adapter command.
  Run(RunArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
  /// TOML file providing defaults for any of these options.
  #[arg(long, value_name = "PATH")]
  config: Option<PathBuf>,

  /// WPT manifest JSON (default: wpt-manifest.json).
  #[arg(long, value_name = "PATH")]
  manifest: Option<PathBuf>,

  /// Expectations YAML (default: to-run.yaml).
  #[arg(long, value_name = "PATH")]
  expectations: Option<PathBuf>,

  /// How expectation keys are matched (default: glob).
  #[arg(long, value_enum)]
  strategy: Option<MatchStrategy>,

  /// Whether tests outside every listed directory are dispatched (default: all).
  #[arg(long, value_enum)]
  scope: Option<Scope>,

  /// Glob to filter tests, or a regex prefixed with `re:`
  #[arg(long)]
  filter: Option<String>,

  /// Run only a shard (zero-based): `i/n`
  #[arg(long)]
  shard: Option<Shard>,

  /// Enable tracing output from the harness (filter with RUST_LOG)
  #[arg(long)]
  trace: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
  #[command(flatten)]
  common: CommonArgs,

  /// Directory the manifest paths are relative to (default: tests).
  #[arg(long, value_name = "DIR")]
  tests_root: Option<PathBuf>,

  /// Timeout per test case (default: 10).
  #[arg(long)]
  timeout_secs: Option<u64>,

  /// Number of tests to execute concurrently (default: 1).
  #[arg(long)]
  jobs: Option<usize>,

  /// Write a JSON report to this path.
  #[arg(long, value_name = "PATH")]
  report: Option<PathBuf>,

  /// Which outcomes produce a non-zero exit code.
  #[arg(long, value_enum, default_value_t = FailOn::Any)]
  fail_on: FailOn,

  /// Adapter command; `{path}` and `{file}` in its arguments are replaced per test.
  #[arg(last = true, value_name = "COMMAND")]
  adapter: Vec<String>,
}

struct Loaded {
  file: ConfigFile,
  harness: Harness,
  selection: Selection,
}

fn main() -> ExitCode {
  match try_main() {
    Ok(code) => code,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    }
  }
}

fn try_main() -> Result<ExitCode> {
  let cli = Cli::parse();
  match cli.command {
    Command::Validate { common, counts } => validate(common, counts),
    Command::List(common) => list(common),
    Command::Run(args) => run(args),
  }
}

fn load(common: CommonArgs) -> Result<Loaded> {
  init_tracing(common.trace);

  let file = match &common.config {
    Some(path) => ConfigFile::from_path(path)
      .with_context(|| format!("read config {}", path.display()))?,
    None => ConfigFile::default(),
  };
  let config = HarnessConfig::resolve(
    &file,
    HarnessOverrides {
      manifest: common.manifest,
      expectations: common.expectations,
      strategy: common.strategy,
      scope: common.scope,
    },
  );

  let harness = Harness::load(&config).with_context(|| {
    format!(
      "load {} with {}",
      config.manifest.display(),
      config.expectations.display()
    )
  })?;
  let selection = Selection {
    filter: build_filter(common.filter.as_deref())?,
    shard: common.shard,
    scope: config.scope,
  };

  Ok(Loaded {
    file,
    harness,
    selection,
  })
}

fn validate(common: CommonArgs, counts: bool) -> Result<ExitCode> {
  let Loaded { harness, .. } = load(common)?;
  let candidates = harness.candidates();
  let expectations = harness.expectations();

  if counts {
    for (dir, key, count) in rule_match_counts(expectations, candidates) {
      println!("{count:>6} {dir}/{key}");
    }
  }
  println!(
    "ok: {} candidate tests ({} excluded), {} directories, {} {} expectations",
    candidates.len(),
    candidates.excluded(),
    expectations.blocks().len(),
    expectations
      .blocks()
      .iter()
      .map(|b| b.rules.len())
      .sum::<usize>(),
    expectations.strategy(),
  );
  Ok(ExitCode::SUCCESS)
}

fn list(common: CommonArgs) -> Result<ExitCode> {
  let Loaded {
    harness, selection, ..
  } = load(common)?;
  for c in harness.plan(&selection)? {
    match c.decision {
      Decision::Run => println!("RUN  {}", c.path),
      Decision::Skip(rule) => match rule.reason {
        Some(reason) => println!("SKIP [{reason}] {}", c.path),
        None => println!("SKIP {}", c.path),
      },
    }
  }
  Ok(ExitCode::SUCCESS)
}

fn run(args: RunArgs) -> Result<ExitCode> {
  let Loaded {
    file,
    harness,
    selection,
  } = load(args.common)?;
  let run_config = RunConfig::resolve(
    &file,
    RunOverrides {
      tests_root: args.tests_root,
      timeout_secs: args.timeout_secs,
      jobs: args.jobs,
      adapter: args.adapter,
    },
  )?;
  let adapter = CommandAdapter::new(
    &run_config.adapter,
    run_config.tests_root.clone(),
    run_config.timeout,
  )
  .context("adapter command is empty")?;

  let plan = harness.plan(&selection)?;
  let mut builder = ReportBuilder::new();
  harness.dispatch(&plan, &adapter, run_config.jobs, &mut builder)?;
  let report = builder.finish();

  for failure in report.failures() {
    eprintln!(
      "Test {} {}: {}",
      failure.path,
      failure.outcome,
      failure.error.as_deref().unwrap_or_default()
    );
  }
  println!("{}", report.summary);

  if let Some(path) = &args.report {
    write_json_report(path, &report)?;
  }

  Ok(if report.summary.should_fail(args.fail_on) {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  })
}

fn init_tracing(enable: bool) {
  if !enable {
    return;
  }

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr);
  if let Err(err) = builder.try_init() {
    eprintln!("failed to install tracing subscriber: {err}");
  }
}
