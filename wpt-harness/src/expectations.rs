use crate::{HarnessError, Result};
use conformance_harness::MatchStrategy;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Reserved key naming the directory a block applies to.
pub const DIR_KEY: &str = "DIR";

/// Why a pattern-listed test is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
  Fail,
  Timeout,
}

impl Reason {
  pub const ALL: [Reason; 2] = [Reason::Fail, Reason::Timeout];

  pub fn as_str(self) -> &'static str {
    match self {
      Reason::Fail => "fail",
      Reason::Timeout => "timeout",
    }
  }
}

impl fmt::Display for Reason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Reason {
  type Err = ();

  fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
    Reason::ALL
      .into_iter()
      .find(|reason| reason.as_str() == raw)
      .ok_or(())
  }
}

/// The value attached to one expectation key.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipSpec {
  /// Exact-name lists: the key being present marks the test skipped. The value
  /// is kept as authored and never inspected.
  Flag(Value),
  /// Pattern lists: `[reason, note]`, `{0: reason, 1: note}` or a bare
  /// `reason`. The code is kept unchecked here; validation decides whether
  /// it is a known [`Reason`].
  Reason { code: String, note: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationEntry {
  pub key: String,
  pub spec: SkipSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryBlock {
  pub dir: String,
  /// Entries in authored order, which is also match precedence.
  pub entries: Vec<ExpectationEntry>,
}

/// The expectations list as authored: one block per YAML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationDocument {
  pub strategy: MatchStrategy,
  pub blocks: Vec<DirectoryBlock>,
}

impl ExpectationDocument {
  pub fn from_path(path: &Path, strategy: MatchStrategy) -> Result<Self> {
    let raw = fs::read_to_string(path)?;
    Self::from_str(&raw, strategy).map_err(|err| match err {
      HarnessError::ExpectationsFormat(msg) => {
        HarnessError::ExpectationsFormat(format!("{}: {msg}", path.display()))
      }
      other => other,
    })
  }

  pub fn from_str(raw: &str, strategy: MatchStrategy) -> Result<Self> {
    let mut blocks = Vec::new();
    for (idx, document) in serde_yaml::Deserializer::from_str(raw).enumerate() {
      let value = Value::deserialize(document)
        .map_err(|err| HarnessError::ExpectationsFormat(format!("document {}: {err}", idx + 1)))?;
      match value {
        Value::Null => continue,
        Value::Mapping(mapping) => blocks.push(parse_block(idx + 1, mapping, strategy)?),
        _ => {
          return Err(HarnessError::ExpectationsFormat(format!(
            "document {} must be a mapping with a {DIR_KEY} key",
            idx + 1
          )))
        }
      }
    }

    Ok(Self { strategy, blocks })
  }
}

fn parse_block(doc: usize, mapping: Mapping, strategy: MatchStrategy) -> Result<DirectoryBlock> {
  let mut dir = None;
  let mut entries = Vec::new();

  for (key, value) in mapping {
    let Value::String(key) = key else {
      return Err(HarnessError::ExpectationsFormat(format!(
        "document {doc}: keys must be strings, got {}",
        describe(&key)
      )));
    };

    if key == DIR_KEY {
      let Value::String(value) = value else {
        return Err(HarnessError::ExpectationsFormat(format!(
          "document {doc}: {DIR_KEY} must be a string"
        )));
      };
      dir = Some(value);
      continue;
    }

    let spec = match strategy {
      MatchStrategy::Exact => SkipSpec::Flag(value),
      MatchStrategy::Glob => parse_reason(doc, &key, value)?,
    };
    entries.push(ExpectationEntry { key, spec });
  }

  let dir = dir.ok_or_else(|| {
    HarnessError::ExpectationsFormat(format!("document {doc} is missing a {DIR_KEY} key"))
  })?;
  Ok(DirectoryBlock { dir, entries })
}

fn parse_reason(doc: usize, key: &str, value: Value) -> Result<SkipSpec> {
  let (code, note) = match value {
    Value::Sequence(items) => {
      let mut items = items.into_iter();
      let code = items.next().as_ref().and_then(scalar_text);
      let note = items.next().as_ref().and_then(scalar_text);
      (code, note)
    }
    // `{0: fail, 1: note}` indexes like a sequence.
    Value::Mapping(fields) => {
      let field = |idx: u64| {
        fields
          .get(Value::Number(idx.into()))
          .or_else(|| fields.get(idx.to_string().as_str()))
          .and_then(scalar_text)
      };
      (field(0), field(1))
    }
    other => (scalar_text(&other), None),
  };

  let code = code.ok_or_else(|| {
    HarnessError::ExpectationsFormat(format!(
      "document {doc}: expectation {key} needs a reason, e.g. `{key}: [fail, <note>]`"
    ))
  })?;
  Ok(SkipSpec::Reason { code, note })
}

fn scalar_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn describe(value: &Value) -> String {
  serde_yaml::to_string(value)
    .map(|s| s.trim_end().to_string())
    .unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  const PATTERNS: &str = r#"
DIR: css/css-grid
"abspos/*.html": [fail, https://github.com/example/issue/1]
grid-items/item-001.html: timeout
---
DIR: dom/nodes
Node-cloneNode.html: [fail]
"#;

  #[test]
  fn pattern_document_keeps_authored_order() {
    let doc = ExpectationDocument::from_str(PATTERNS, MatchStrategy::Glob).unwrap();
    let dirs: Vec<_> = doc.blocks.iter().map(|b| b.dir.as_str()).collect();
    assert_eq!(dirs, ["css/css-grid", "dom/nodes"]);

    let keys: Vec<_> = doc.blocks[0].entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["abspos/*.html", "grid-items/item-001.html"]);
    assert_eq!(
      doc.blocks[0].entries[0].spec,
      SkipSpec::Reason {
        code: "fail".into(),
        note: Some("https://github.com/example/issue/1".into()),
      }
    );
    assert_eq!(
      doc.blocks[0].entries[1].spec,
      SkipSpec::Reason {
        code: "timeout".into(),
        note: None,
      }
    );
  }

  #[test]
  fn dir_key_need_not_come_first() {
    let doc =
      ExpectationDocument::from_str("a.html: [fail]\nDIR: css\n", MatchStrategy::Glob).unwrap();
    assert_eq!(doc.blocks[0].dir, "css");
    assert_eq!(doc.blocks[0].entries.len(), 1);
  }

  #[test]
  fn unknown_reason_codes_are_kept_for_validation() {
    let doc =
      ExpectationDocument::from_str("DIR: css\na.html: [flaky]\nb.html: 3\n", MatchStrategy::Glob)
        .unwrap();
    let codes: Vec<_> = doc.blocks[0]
      .entries
      .iter()
      .map(|e| match &e.spec {
        SkipSpec::Reason { code, .. } => code.as_str(),
        SkipSpec::Flag(_) => unreachable!(),
      })
      .collect();
    assert_eq!(codes, ["flaky", "3"]);
  }

  #[test]
  fn indexed_mapping_values_read_like_sequences() {
    let doc = ExpectationDocument::from_str(
      "DIR: css\nfoo.html: {0: fail}\nbar.html: {\"0\": timeout, \"1\": crbug/2}\n",
      MatchStrategy::Glob,
    )
    .unwrap();
    let specs: Vec<_> = doc.blocks[0].entries.iter().map(|e| &e.spec).collect();
    assert_eq!(
      specs,
      [
        &SkipSpec::Reason {
          code: "fail".into(),
          note: None,
        },
        &SkipSpec::Reason {
          code: "timeout".into(),
          note: Some("crbug/2".into()),
        },
      ]
    );
  }

  #[test]
  fn mapping_without_index_zero_is_rejected() {
    let err = ExpectationDocument::from_str("DIR: css\na.html: {reason: fail}\n", MatchStrategy::Glob)
      .unwrap_err();
    assert!(err.to_string().contains("a.html needs a reason"));
  }

  #[test]
  fn pattern_entry_without_reason_is_rejected() {
    let err = ExpectationDocument::from_str("DIR: css\na.html:\n", MatchStrategy::Glob).unwrap_err();
    assert!(err.to_string().contains("a.html needs a reason"));
  }

  #[test]
  fn exact_document_accepts_any_value() {
    let doc = ExpectationDocument::from_str(
      "DIR: css\na.html: true\nb.html: 0\nc.html:\n",
      MatchStrategy::Exact,
    )
    .unwrap();
    let specs: Vec<_> = doc.blocks[0].entries.iter().map(|e| &e.spec).collect();
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[0], &SkipSpec::Flag(Value::Bool(true)));
    assert!(matches!(specs[1], SkipSpec::Flag(Value::Number(n)) if n.as_u64() == Some(0)));
    assert_eq!(specs[2], &SkipSpec::Flag(Value::Null));
  }

  #[test]
  fn missing_dir_is_rejected() {
    let err = ExpectationDocument::from_str("a.html: [fail]\n", MatchStrategy::Glob).unwrap_err();
    assert!(err.to_string().contains("missing a DIR key"));
  }

  #[test]
  fn empty_documents_are_ignored() {
    let doc = ExpectationDocument::from_str("---\nDIR: css\n---\n", MatchStrategy::Glob).unwrap();
    assert_eq!(doc.blocks.len(), 1);
    assert!(doc.blocks[0].entries.is_empty());
  }

  #[test]
  fn non_mapping_document_is_rejected() {
    let err = ExpectationDocument::from_str("- css\n- dom\n", MatchStrategy::Glob).unwrap_err();
    assert!(matches!(err, HarnessError::ExpectationsFormat(_)));
  }

  #[test]
  fn reasons_round_trip_through_strings() {
    for reason in Reason::ALL {
      assert_eq!(reason.as_str().parse::<Reason>(), Ok(reason));
    }
    assert!("flaky".parse::<Reason>().is_err());
  }
}
