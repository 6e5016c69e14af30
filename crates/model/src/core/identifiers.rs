use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, sync::Arc};

/// Opaque identifier of one unit of work (a conference id, a URL, ...).
///
/// Numeric ids sort numerically (`"9" < "10"`, the way a range of ids reads)
/// and before every non-numeric id; non-numeric ids sort lexicographically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Arc<str>);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_number(&self) -> Option<u64> {
        self.0.parse::<u64>().ok()
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for ItemId {
    fn from(n: u64) -> Self {
        Self::new(n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn numeric_ids_sort_numerically() {
        let ids: BTreeSet<ItemId> = ["10", "9", "100", "2"].into_iter().map(ItemId::from).collect();
        let ordered: Vec<&str> = ids.iter().map(ItemId::as_str).collect();
        assert_eq!(ordered, vec!["2", "9", "10", "100"]);
    }

    #[test]
    fn numbers_sort_before_names() {
        assert!(ItemId::from("abc") < ItemId::from("abd"));
        assert!(ItemId::from("10") < ItemId::from("a"));
        assert!(ItemId::from("2") < ItemId::from("1a"));
        assert!(ItemId::from("10") < ItemId::from("1a"));
    }

    #[test]
    fn leading_zeros_do_not_collapse_distinct_ids() {
        let a = ItemId::from("007");
        let b = ItemId::from("7");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }
}
