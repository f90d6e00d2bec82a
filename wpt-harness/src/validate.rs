use crate::expectations::{ExpectationDocument, Reason, SkipSpec};
use crate::manifest::CandidateSet;
use crate::reconcile::{Block, Expectations, Rule};
use crate::{HarnessError, Result};
use conformance_harness::MatchStrategy;
use tracing::{debug, info};

/// Checks an expectations list and compiles it for classification.
///
/// Checks run as whole-document passes and stop at the first violation:
/// directory order, then (pattern lists only) key order and reason codes,
/// then that every key matches at least one candidate. Matching here uses the
/// same compiled matchers the reconciler uses.
pub fn validate(document: &ExpectationDocument, candidates: &CandidateSet) -> Result<Expectations> {
  let strategy = document.strategy;

  check_directory_order(document)?;
  if strategy == MatchStrategy::Glob {
    check_key_order(document)?;
    check_reasons(document)?;
  }

  let blocks = compile(document)?;
  check_references(&blocks, candidates)?;

  info!(
    %strategy,
    blocks = blocks.len(),
    rules = blocks.iter().map(|b| b.rules.len()).sum::<usize>(),
    "expectations validated"
  );
  Ok(Expectations::new(strategy, blocks))
}

fn check_directory_order(document: &ExpectationDocument) -> Result<()> {
  for pair in document.blocks.windows(2) {
    let (previous, block) = (&pair[0], &pair[1]);
    if block.dir < previous.dir {
      return Err(HarnessError::DirectoryOrder {
        dir: block.dir.clone(),
        previous: previous.dir.clone(),
      });
    }
  }
  Ok(())
}

fn check_key_order(document: &ExpectationDocument) -> Result<()> {
  for block in &document.blocks {
    for pair in block.entries.windows(2) {
      if pair[1].key < pair[0].key {
        return Err(HarnessError::PatternOrder {
          dir: block.dir.clone(),
          pattern: pair[1].key.clone(),
          previous: pair[0].key.clone(),
        });
      }
    }
  }
  Ok(())
}

fn check_reasons(document: &ExpectationDocument) -> Result<()> {
  for block in &document.blocks {
    for entry in &block.entries {
      let reason = match &entry.spec {
        SkipSpec::Reason { code, .. } => code.as_str(),
        SkipSpec::Flag(_) => "",
      };
      if reason.parse::<Reason>().is_err() {
        return Err(HarnessError::UnknownReason {
          dir: block.dir.clone(),
          pattern: entry.key.clone(),
          reason: reason.to_string(),
        });
      }
    }
  }
  Ok(())
}

fn compile(document: &ExpectationDocument) -> Result<Vec<Block>> {
  let strategy = document.strategy;
  document
    .blocks
    .iter()
    .enumerate()
    .map(|(index, block)| -> Result<Block> {
      let rules = block
        .entries
        .iter()
        .map(|entry| -> Result<Rule> {
          let matcher = strategy
            .compile(&entry.key)
            .map_err(|err| HarnessError::InvalidPattern {
              dir: block.dir.clone(),
              pattern: entry.key.clone(),
              message: err.message,
            })?;
          let (reason, note) = match &entry.spec {
            SkipSpec::Reason { code, note } => (code.parse().ok(), note.clone()),
            SkipSpec::Flag(_) => (None, None),
          };
          Ok(Rule {
            matcher,
            reason,
            note,
          })
        })
        .collect::<Result<Vec<_>>>()?;
      Ok(Block::new(index, block.dir.clone(), rules))
    })
    .collect()
}

fn check_references(blocks: &[Block], candidates: &CandidateSet) -> Result<()> {
  for block in blocks {
    let remainders: Vec<&str> = candidates.iter().filter_map(|p| block.remainder(p)).collect();
    debug!(dir = %block.dir, candidates = remainders.len(), "checking rules against candidates");
    for rule in &block.rules {
      if !remainders.iter().any(|rest| rule.matcher.matches(rest)) {
        return Err(HarnessError::UnmatchedExpectation {
          dir: block.dir.clone(),
          pattern: rule.key().to_string(),
        });
      }
    }
  }
  Ok(())
}

/// How many candidates each rule matches, in authored order.
///
/// Counts ignore precedence: a candidate matched by two rules counts for both.
pub fn rule_match_counts<'e>(
  expectations: &'e Expectations,
  candidates: &CandidateSet,
) -> Vec<(&'e str, &'e str, usize)> {
  let mut out = Vec::new();
  for block in expectations.blocks() {
    let remainders: Vec<&str> = candidates.iter().filter_map(|p| block.remainder(p)).collect();
    for rule in &block.rules {
      let count = remainders
        .iter()
        .filter(|rest| rule.matcher.matches(rest))
        .count();
      out.push((block.dir.as_str(), rule.key(), count));
    }
  }
  out
}
