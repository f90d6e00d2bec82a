use anyhow::{anyhow, Result};
use globset::{Glob, GlobMatcher};
use regex::Regex;

/// Narrows a run to the ids matching a user-supplied pattern.
///
/// Patterns prefixed with `re:` are regexes (`re:^css/.*grid`). Anything else
/// is a glob (`css/**/*.html`), falling back to a regex only when it is not
/// valid glob syntax.
#[derive(Debug, Clone)]
pub enum Filter {
  All,
  Glob(GlobMatcher),
  Regex(Regex),
}

const REGEX_PREFIX: &str = "re:";

pub fn build_filter(pattern: Option<&str>) -> Result<Filter> {
  let Some(raw) = pattern else {
    return Ok(Filter::All);
  };

  if let Some(source) = raw.strip_prefix(REGEX_PREFIX) {
    let regex =
      Regex::new(source).map_err(|err| anyhow!("invalid filter regex '{source}': {err}"))?;
    return Ok(Filter::Regex(regex));
  }

  if let Ok(glob) = Glob::new(raw) {
    return Ok(Filter::Glob(glob.compile_matcher()));
  }

  let regex = Regex::new(raw).map_err(|err| anyhow!("invalid filter '{raw}': {err}"))?;
  Ok(Filter::Regex(regex))
}

impl Filter {
  pub fn matches(&self, id: &str) -> bool {
    match self {
      Filter::All => true,
      Filter::Glob(glob) => glob.is_match(id),
      Filter::Regex(re) => re.is_match(id),
    }
  }

  pub fn is_all(&self) -> bool {
    matches!(self, Filter::All)
  }
}
