//! Label filters for query-time predicate filtering
//!
//! A filter is a tree of membership tests. Composite variants own their
//! children, so a filter can be built, moved and shared as one value.
//!
//! ```text
//! And
//!  ├─→ Range(100..=200)
//!  └─→ Or
//!       ├─→ Set {105, 150}
//!       └─→ OrderedSet {190, 199}
//! ```

use crate::store::Label;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdFilter {
    /// Labels in `min..=max`
    Range { min: Label, max: Label },
    /// Hashed label set
    Set { labels: HashSet<Label> },
    /// Sorted label set, cheaper to iterate and serialize in order
    OrderedSet { labels: BTreeSet<Label> },
    /// Both children match
    And {
        left: Box<IdFilter>,
        right: Box<IdFilter>,
    },
    /// Either child matches
    Or {
        left: Box<IdFilter>,
        right: Box<IdFilter>,
    },
    /// Exactly one child matches
    Xor {
        left: Box<IdFilter>,
        right: Box<IdFilter>,
    },
}

impl IdFilter {
    /// Inclusive label range
    pub fn range(min: Label, max: Label) -> Self {
        IdFilter::Range { min, max }
    }

    pub fn set<I: IntoIterator<Item = Label>>(labels: I) -> Self {
        IdFilter::Set {
            labels: labels.into_iter().collect(),
        }
    }

    pub fn ordered_set<I: IntoIterator<Item = Label>>(labels: I) -> Self {
        IdFilter::OrderedSet {
            labels: labels.into_iter().collect(),
        }
    }

    pub fn and(self, other: IdFilter) -> Self {
        IdFilter::And {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn or(self, other: IdFilter) -> Self {
        IdFilter::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn xor(self, other: IdFilter) -> Self {
        IdFilter::Xor {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Whether `label` passes the filter
    pub fn is_member(&self, label: Label) -> bool {
        match self {
            IdFilter::Range { min, max } => label >= *min && label <= *max,
            IdFilter::Set { labels } => labels.contains(&label),
            IdFilter::OrderedSet { labels } => labels.contains(&label),
            IdFilter::And { left, right } => left.is_member(label) && right.is_member(label),
            IdFilter::Or { left, right } => left.is_member(label) || right.is_member(label),
            IdFilter::Xor { left, right } => left.is_member(label) ^ right.is_member(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_inclusive() {
        let f = IdFilter::range(10, 20);
        assert!(f.is_member(10));
        assert!(f.is_member(20));
        assert!(!f.is_member(9));
        assert!(!f.is_member(21));
    }

    #[test]
    fn test_sets() {
        let hashed = IdFilter::set([1, 5, 9]);
        let ordered = IdFilter::ordered_set(vec![2, 4]);
        assert!(hashed.is_member(5));
        assert!(!hashed.is_member(4));
        assert!(ordered.is_member(4));
        assert!(!ordered.is_member(5));
    }

    #[test]
    fn test_composites() {
        let range = || IdFilter::range(0, 10);
        let evens = || IdFilter::set([2, 4, 12]);

        let and = range().and(evens());
        assert!(and.is_member(4));
        assert!(!and.is_member(12));
        assert!(!and.is_member(3));

        let or = range().or(evens());
        assert!(or.is_member(12));
        assert!(or.is_member(3));
        assert!(!or.is_member(11));

        let xor = range().xor(evens());
        assert!(!xor.is_member(4));
        assert!(xor.is_member(3));
        assert!(xor.is_member(12));
    }

    #[test]
    fn test_nested_tree() {
        let f = IdFilter::range(100, 200).and(
            IdFilter::set([105, 150]).or(IdFilter::ordered_set([190, 199, 250])),
        );
        assert!(f.is_member(150));
        assert!(f.is_member(199));
        assert!(!f.is_member(250));
        assert!(!f.is_member(120));
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let f = IdFilter::range(1, 3).or(IdFilter::ordered_set([7]));
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["type"], "or");

        let back: IdFilter = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
        assert!(back.is_member(7));
    }
}
