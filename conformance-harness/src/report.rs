use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialize `value` as pretty JSON.
///
/// Output is only as deterministic as `value`: keep result lists in a stable
/// order and prefer `BTreeMap` over `HashMap` for anything serialized.
pub fn to_json_pretty_stable<T: Serialize>(value: &T) -> anyhow::Result<String> {
  serde_json::to_string_pretty(value).context("format JSON report")
}

/// Write a pretty JSON report to `path`, creating parent directories as needed.
///
/// The report is written next to `path` first and renamed into place, so an
/// interrupted run never leaves a truncated report behind.
pub fn write_json_report<T: Serialize>(path: &Path, report: &T) -> anyhow::Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
  }

  let staging = path.with_extension("json.partial");
  {
    let file =
      fs::File::create(&staging).with_context(|| format!("create {}", staging.display()))?;
    let mut writer = BufWriter::new(file);
    write_json_report_to_writer(&mut writer, report)
      .with_context(|| format!("write report to {}", staging.display()))?;
    writer
      .flush()
      .with_context(|| format!("flush {}", staging.display()))?;
  }
  fs::rename(&staging, path)
    .with_context(|| format!("move {} to {}", staging.display(), path.display()))?;
  Ok(())
}

pub fn write_json_report_to_writer<W: Write, T: Serialize>(
  writer: &mut W,
  report: &T,
) -> anyhow::Result<()> {
  serde_json::to_writer_pretty(&mut *writer, report).context("write JSON report")?;
  writeln!(&mut *writer).context("write JSON report")?;
  Ok(())
}
