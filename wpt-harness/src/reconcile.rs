use crate::adapter::TestRef;
use crate::expectations::Reason;
use conformance_harness::{MatchStrategy, Matcher};

/// Validated expectations, ready for classification.
///
/// Only [`crate::validate::validate`] builds one, so holding an
/// `Expectations` means the list is sorted, its reasons are known and every
/// rule matches at least one candidate. It is never mutated afterwards, and
/// classifying a path is a pure function of the path.
#[derive(Debug, Clone)]
pub struct Expectations {
  strategy: MatchStrategy,
  blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
pub struct Block {
  pub index: usize,
  pub dir: String,
  prefix: String,
  pub rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
pub struct Rule {
  pub matcher: Matcher,
  /// `None` for exact-name lists, which carry no reason.
  pub reason: Option<Reason>,
  pub note: Option<String>,
}

impl Rule {
  pub fn key(&self) -> &str {
    self.matcher.key()
  }
}

impl Block {
  pub(crate) fn new(index: usize, dir: String, rules: Vec<Rule>) -> Self {
    let prefix = format!("{dir}/");
    Self {
      index,
      dir,
      prefix,
      rules,
    }
  }

  /// The part of `path` below this block's directory, if it is below it.
  pub fn remainder<'p>(&self, path: &'p str) -> Option<&'p str> {
    path
      .strip_prefix(self.prefix.as_str())
      .filter(|rest| !rest.is_empty())
  }

  pub fn first_match(&self, remainder: &str) -> Option<&Rule> {
    self.rules.iter().find(|rule| rule.matcher.matches(remainder))
  }
}

#[derive(Debug, Clone, Copy)]
pub enum Decision<'e> {
  Run,
  Skip(&'e Rule),
}

impl Decision<'_> {
  pub fn is_run(&self) -> bool {
    matches!(self, Decision::Run)
  }
}

/// The outcome of classifying one candidate path.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'p, 'e> {
  pub path: &'p str,
  /// The first block whose directory contains `path`.
  pub group: Option<&'e Block>,
  /// `path` relative to the block that decided it, or to `group` for runs.
  pub file: &'p str,
  pub decision: Decision<'e>,
}

impl<'p> Classification<'p, '_> {
  pub fn test_ref(&self) -> TestRef<'p> {
    TestRef {
      path: self.path,
      file: self.file,
    }
  }

  pub fn group_name(&self) -> Option<&str> {
    self.group.map(|block| block.dir.as_str())
  }

  /// `[reason] file` for pattern rules, the bare path for exact-name rules.
  pub fn skip_label(&self) -> Option<String> {
    match self.decision {
      Decision::Run => None,
      Decision::Skip(Rule {
        reason: Some(reason),
        ..
      }) => Some(format!("[{reason}] {}", self.file)),
      Decision::Skip(_) => Some(self.path.to_string()),
    }
  }
}

impl Expectations {
  pub(crate) fn new(strategy: MatchStrategy, blocks: Vec<Block>) -> Self {
    Self { strategy, blocks }
  }

  pub fn strategy(&self) -> MatchStrategy {
    self.strategy
  }

  pub fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  /// Blocks are scanned in authored order and rules within a block in
  /// authored order; the first rule that matches decides. A path under no
  /// block, or matched by no rule, runs.
  ///
  /// Directories are expected not to nest. If they do, a path under two
  /// blocks is decided by whichever block comes first with a matching rule.
  pub fn classify<'p>(&self, path: &'p str) -> Classification<'p, '_> {
    let mut group: Option<(&Block, &'p str)> = None;

    for block in &self.blocks {
      let Some(rest) = block.remainder(path) else {
        continue;
      };
      let (first, _) = *group.get_or_insert((block, rest));
      if let Some(rule) = block.first_match(rest) {
        return Classification {
          path,
          group: Some(first),
          file: rest,
          decision: Decision::Skip(rule),
        };
      }
    }

    Classification {
      path,
      group: group.map(|(block, _)| block),
      file: group.map(|(_, rest)| rest).unwrap_or(path),
      decision: Decision::Run,
    }
  }
}
