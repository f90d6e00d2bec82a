use crate::{HarnessError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The only manifest layout this harness understands.
pub const EXPECTED_MANIFEST_VERSION: u64 = 4;

/// Path suffixes that are never candidates, whatever the expectations say.
///
/// Worker variants are unsupported. SVG testharness files are listed by the
/// manifest but cannot be loaded as documents (w3c/web-platform-tests#7313).
pub const EXCLUDED_SUFFIXES: &[&str] = &[".worker.html", ".svg"];

/// A parsed WPT manifest, reduced to its testharness section.
#[derive(Debug, Clone)]
pub struct Manifest {
  pub version: u64,
  testharness: Map<String, Value>,
}

impl Manifest {
  pub fn from_path(path: &Path) -> Result<Self> {
    let raw = fs::read_to_string(path)?;
    Self::from_str(&raw).map_err(|err| match err {
      HarnessError::ManifestFormat(msg) => {
        HarnessError::ManifestFormat(format!("{}: {msg}", path.display()))
      }
      other => other,
    })
  }

  pub fn from_str(raw: &str) -> Result<Self> {
    let value: Value = serde_json::from_str(raw)
      .map_err(|err| HarnessError::ManifestFormat(format!("parse JSON: {err}")))?;
    Self::from_value(value)
  }

  /// Checks the version before looking at anything else, so a manifest from
  /// a different generator fails with a version error rather than a shape
  /// error.
  pub fn from_value(mut value: Value) -> Result<Self> {
    let version = match value.get("version") {
      Some(Value::Number(n)) if integral(n) == Some(EXPECTED_MANIFEST_VERSION) => {
        EXPECTED_MANIFEST_VERSION
      }
      Some(other) => {
        return Err(HarnessError::ManifestVersion {
          expected: EXPECTED_MANIFEST_VERSION,
          found: other.to_string(),
        })
      }
      None => {
        return Err(HarnessError::ManifestVersion {
          expected: EXPECTED_MANIFEST_VERSION,
          found: "no version".to_string(),
        })
      }
    };

    // Generated manifests nest the section under `items`; hand-written
    // fixtures often put it at the top level.
    let section = match value.pointer_mut("/items/testharness") {
      Some(section) => section.take(),
      None => value
        .get_mut("testharness")
        .map(Value::take)
        .ok_or_else(|| HarnessError::ManifestFormat("missing `items.testharness` section".into()))?,
    };
    let Value::Object(testharness) = section else {
      return Err(HarnessError::ManifestFormat(
        "`testharness` section must be an object".into(),
      ));
    };

    Ok(Self {
      version,
      testharness,
    })
  }

  pub fn candidates(&self) -> Result<CandidateSet> {
    build_candidate_set(&self.testharness)
  }
}

/// Test paths eligible for dispatch, in manifest order, without a leading `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
  paths: Vec<String>,
  excluded: usize,
}

impl CandidateSet {
  pub fn paths(&self) -> &[String] {
    &self.paths
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  /// Number of manifest entries dropped by [`EXCLUDED_SUFFIXES`].
  pub fn excluded(&self) -> usize {
    self.excluded
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for CandidateSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      paths: iter.into_iter().map(Into::into).collect(),
      excluded: 0,
    }
  }
}

/// `4` and `4.0` are the same version; `4.5` is neither.
fn integral(n: &serde_json::Number) -> Option<u64> {
  n.as_u64().or_else(|| {
    n.as_f64()
      .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64)
      .map(|v| v as u64)
  })
}

pub fn is_excluded(path: &str) -> bool {
  EXCLUDED_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Collects the first field of every entry under every container.
///
/// Containers do not overlap and list each test once, so no deduplication is
/// done here.
pub fn build_candidate_set(testharness: &Map<String, Value>) -> Result<CandidateSet> {
  let mut paths = Vec::new();
  let mut excluded = 0;

  for (container, entries) in testharness {
    let entries = entries.as_array().ok_or_else(|| {
      HarnessError::ManifestFormat(format!("container {container} must list entries in an array"))
    })?;
    for entry in entries {
      let raw = entry
        .as_array()
        .and_then(|fields| fields.first())
        .and_then(Value::as_str)
        .ok_or_else(|| {
          HarnessError::ManifestFormat(format!(
            "entry under {container} must be an array starting with a test path, got {entry}"
          ))
        })?;

      if is_excluded(raw) {
        debug!(path = raw, "excluding test by suffix");
        excluded += 1;
        continue;
      }

      paths.push(raw.strip_prefix('/').unwrap_or(raw).to_string());
    }
  }

  info!(
    candidates = paths.len(),
    excluded,
    containers = testharness.len(),
    "built candidate set"
  );
  Ok(CandidateSet { paths, excluded })
}
