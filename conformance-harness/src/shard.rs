use std::fmt;
use std::str::FromStr;

/// One slice of a deterministically ordered candidate list.
///
/// Membership is decided by position (`idx % total == index`), so every shard
/// of the same list sees the same partition as long as callers keep the list
/// in its canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shard {
  pub index: usize,
  pub total: usize,
}

impl Shard {
  pub fn includes(&self, idx: usize) -> bool {
    idx % self.total == self.index
  }
}

impl fmt::Display for Shard {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.index, self.total)
  }
}

impl FromStr for Shard {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let Some((index_raw, total_raw)) = raw.trim().split_once('/') else {
      return Err(format!("shard `{raw}` must be in the form <index>/<total>"));
    };
    let index: usize = index_raw
      .parse()
      .map_err(|err| format!("invalid shard index `{index_raw}`: {err}"))?;
    let total: usize = total_raw
      .parse()
      .map_err(|err| format!("invalid shard total `{total_raw}`: {err}"))?;
    if total == 0 {
      return Err("shard total must be greater than zero".into());
    }
    if index >= total {
      return Err(format!(
        "shard index must be less than total ({index} >= {total})"
      ));
    }

    Ok(Self { index, total })
  }
}

/// Keeps the items that fall into `shard`, preserving their order.
pub fn apply_shard<T>(items: impl IntoIterator<Item = T>, shard: Shard) -> Vec<T> {
  items
    .into_iter()
    .enumerate()
    .filter_map(|(idx, item)| shard.includes(idx).then_some(item))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shard_parses_and_displays() {
    let shard: Shard = "1/4".parse().unwrap();
    assert_eq!(shard, Shard { index: 1, total: 4 });
    assert_eq!(shard.to_string(), "1/4");
  }

  #[test]
  fn shard_rejects_bad_specs() {
    assert!("3".parse::<Shard>().unwrap_err().contains("<index>/<total>"));
    assert!("0/0".parse::<Shard>().unwrap_err().contains("greater than zero"));
    assert!("2/2"
      .parse::<Shard>()
      .unwrap_err()
      .contains("index must be less than total"));
    assert!("a/2".parse::<Shard>().unwrap_err().contains("invalid shard index"));
  }

  #[test]
  fn shards_partition_and_keep_order() {
    let items: Vec<_> = (0..10).collect();
    let total = 3;
    let mut seen = Vec::new();
    for index in 0..total {
      let part = apply_shard(items.clone(), Shard { index, total });
      assert!(part.windows(2).all(|w| w[0] < w[1]));
      seen.extend(part);
    }
    seen.sort();
    assert_eq!(seen, items);
  }
}
