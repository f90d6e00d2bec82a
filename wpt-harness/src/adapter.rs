use crate::expectations::Reason;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A candidate as handed to adapters and registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRef<'a> {
  /// Manifest path without the leading `/`, e.g. `css/css-grid/grid-001.html`.
  pub path: &'a str,
  /// `path` relative to its expectations directory, or `path` itself when no
  /// directory lists it.
  pub file: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
  /// The implementation under test failed the test.
  Failed(String),
  TimedOut(Duration),
  /// The adapter could not run the test at all.
  Harness(String),
}

impl fmt::Display for ExecError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecError::Failed(msg) => write!(f, "failed: {msg}"),
      ExecError::TimedOut(after) => write!(f, "timeout after {} seconds", after.as_secs_f64()),
      ExecError::Harness(msg) => write!(f, "harness error: {msg}"),
    }
  }
}

pub type ExecResult = std::result::Result<(), ExecError>;

/// Runs one test against the implementation under test.
///
/// Timeouts and retries are the adapter's business; the harness only decides
/// which tests reach it.
pub trait ExecutionAdapter: Send + Sync {
  fn execute(&self, test: TestRef<'_>) -> ExecResult;
}

impl<F> ExecutionAdapter for F
where
  F: Fn(TestRef<'_>) -> ExecResult + Send + Sync,
{
  fn execute(&self, test: TestRef<'_>) -> ExecResult {
    self(test)
  }
}

/// The reporting side of a run: receives groups, skips and results in
/// dispatch order.
pub trait Registry {
  fn enter_group(&mut self, group: &str);
  fn register_skip(
    &mut self,
    test: TestRef<'_>,
    label: &str,
    reason: Option<Reason>,
    note: Option<&str>,
  );
  fn register_result(&mut self, test: TestRef<'_>, result: &ExecResult);
}

/// Runs each test as a child process.
///
/// `{path}` and `{file}` in the arguments are replaced by the test's fields;
/// if neither appears, the test's location under `tests_root` is appended.
/// Exit status zero passes, anything else fails with the captured stderr.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
  program: String,
  args: Vec<String>,
  tests_root: PathBuf,
  timeout: Duration,
}

impl CommandAdapter {
  pub fn new(command: &[String], tests_root: PathBuf, timeout: Duration) -> Option<Self> {
    let (program, args) = command.split_first()?;
    Some(Self {
      program: program.clone(),
      args: args.to_vec(),
      tests_root,
      timeout,
    })
  }

  fn args_for(&self, test: TestRef<'_>) -> Vec<String> {
    let mut substituted = false;
    let mut args: Vec<String> = self
      .args
      .iter()
      .map(|arg| {
        if arg.contains("{path}") || arg.contains("{file}") {
          substituted = true;
          arg.replace("{path}", test.path).replace("{file}", test.file)
        } else {
          arg.clone()
        }
      })
      .collect();
    if !substituted {
      args.push(self.tests_root.join(test.path).to_string_lossy().into_owned());
    }
    args
  }
}

impl ExecutionAdapter for CommandAdapter {
  fn execute(&self, test: TestRef<'_>) -> ExecResult {
    let args = self.args_for(test);
    debug!(program = %self.program, ?args, "spawning test");

    let mut child = Command::new(&self.program)
      .args(&args)
      .env("WPT_TEST_PATH", test.path)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|err| ExecError::Harness(format!("spawn {}: {err}", self.program)))?;

    // Drain stderr on the side so a chatty child cannot block on a full pipe.
    let reader = child.stderr.take().map(|mut stderr| {
      thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = stderr.read_to_end(&mut buf) {
          debug!("stopped reading test stderr: {err}");
        }
        String::from_utf8_lossy(&buf).into_owned()
      })
    });

    let deadline = Instant::now() + self.timeout;
    let status: Option<ExitStatus> = loop {
      match child.try_wait() {
        Ok(Some(status)) => break Some(status),
        Ok(None) if Instant::now() >= deadline => {
          if let Err(err) = child.kill() {
            warn!(path = test.path, "failed to kill timed out test: {err}");
          }
          let _ = child.wait();
          break None;
        }
        Ok(None) => thread::sleep(POLL_INTERVAL),
        Err(err) => return Err(ExecError::Harness(format!("wait for {}: {err}", test.path))),
      }
    };

    // A killed child's grandchildren may still hold stderr open, so only
    // collect it from processes that exited on their own.
    let Some(status) = status else {
      return Err(ExecError::TimedOut(self.timeout));
    };
    if status.success() {
      return Ok(());
    }

    let stderr = reader
      .and_then(|handle| handle.join().ok())
      .unwrap_or_default();
    let stderr = stderr.trim();
    Err(ExecError::Failed(if stderr.is_empty() {
      format!("exited with {status}")
    } else {
      format!("exited with {status}: {stderr}")
    }))
  }
}
