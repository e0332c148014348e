use serde::{Deserialize, Serialize};
use std::fmt;

/// A set of `i64` values stored as sorted, disjoint, non-adjacent inclusive intervals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LongRangeSet {
    ranges: Vec<(i64, i64)>,
}

impl LongRangeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::range(i64::MIN, i64::MAX)
    }

    pub fn point(value: i64) -> Self {
        Self::range(value, value)
    }

    pub fn range(from: i64, to: i64) -> Self {
        if from > to {
            return Self::empty();
        }
        Self {
            ranges: vec![(from, to)],
        }
    }

    fn from_ranges(mut ranges: Vec<(i64, i64)>) -> Self {
        ranges.retain(|(from, to)| from <= to);
        ranges.sort_unstable();
        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
        for (from, to) in ranges {
            match merged.last_mut() {
                Some(last) if from <= last.1.saturating_add(1) => last.1 = last.1.max(to),
                _ => merged.push((from, to)),
            }
        }
        Self { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn min(&self) -> Option<i64> {
        self.ranges.first().map(|r| r.0)
    }

    pub fn max(&self) -> Option<i64> {
        self.ranges.last().map(|r| r.1)
    }

    pub fn as_point(&self) -> Option<i64> {
        match self.ranges.as_slice() {
            [(from, to)] if from == to => Some(*from),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.ranges
            .iter()
            .any(|(from, to)| *from <= value && value <= *to)
    }

    pub fn intersect(&self, other: &LongRangeSet) -> LongRangeSet {
        let mut out = Vec::new();
        for (a_from, a_to) in &self.ranges {
            for (b_from, b_to) in &other.ranges {
                let from = (*a_from).max(*b_from);
                let to = (*a_to).min(*b_to);
                if from <= to {
                    out.push((from, to));
                }
            }
        }
        Self::from_ranges(out)
    }

    pub fn unite(&self, other: &LongRangeSet) -> LongRangeSet {
        let mut all = self.ranges.clone();
        all.extend(other.ranges.iter().copied());
        Self::from_ranges(all)
    }

    pub fn subtract(&self, other: &LongRangeSet) -> LongRangeSet {
        let mut current = self.ranges.clone();
        for (cut_from, cut_to) in &other.ranges {
            let mut next = Vec::with_capacity(current.len() + 1);
            for (from, to) in current {
                if to < *cut_from || from > *cut_to {
                    next.push((from, to));
                    continue;
                }
                if from < *cut_from {
                    next.push((from, cut_from - 1));
                }
                if to > *cut_to {
                    next.push((cut_to + 1, to));
                }
            }
            current = next;
        }
        Self::from_ranges(current)
    }
}

impl fmt::Display for LongRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            return f.write_str("{}");
        }
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|(from, to)| {
                if from == to {
                    from.to_string()
                } else {
                    format!("{from}..{to}")
                }
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn subtract_splits_interval() {
        let set = LongRangeSet::range(0, 10).subtract(&LongRangeSet::range(3, 5));
        assert_eq!(set.to_string(), "{0..2, 6..10}");
        assert!(!set.contains(4));
        assert!(set.contains(6));
    }

    #[test]
    fn subtract_at_type_extremes_does_not_overflow() {
        let set = LongRangeSet::all().subtract(&LongRangeSet::point(i64::MAX));
        assert_eq!(set.max(), Some(i64::MAX - 1));
        let set = LongRangeSet::all().subtract(&LongRangeSet::point(i64::MIN));
        assert_eq!(set.min(), Some(i64::MIN + 1));
    }

    #[test]
    fn unite_merges_adjacent() {
        let set = LongRangeSet::range(1, 3).unite(&LongRangeSet::range(4, 8));
        assert_eq!(set, LongRangeSet::range(1, 8));
    }

    #[test]
    fn empty_range_when_reversed() {
        assert!(LongRangeSet::range(5, 4).is_empty());
        assert_eq!(LongRangeSet::range(2, 9).intersect(&LongRangeSet::point(9)).as_point(), Some(9));
    }
}
