//! Interval index over managed spanners.
//!
//! Intervals are closed (`[tick, tick2]`) so a spanner ending exactly where
//! a query starts is still reported; callers apply their own half-open
//! filters on top, as the system passes do.

use serde::{Deserialize, Serialize};

use crate::model::{SpannerId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: Tick,
    pub stop: Tick,
    pub value: SpannerId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpannerMap {
    /// Sorted by `(start, stop, value)`.
    intervals: Vec<Interval>,
    /// `max_stop[i]` is the largest `stop` among `intervals[..=i]`.
    #[serde(skip)]
    max_stop: Vec<Tick>,
}

impl SpannerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, start: Tick, stop: Tick, value: SpannerId) {
        debug_assert!(stop >= start, "spanner {value:?} ends before it starts");
        let iv = Interval { start, stop, value };
        let key = (start, stop, value);
        let pos = self
            .intervals
            .partition_point(|i| (i.start, i.stop, i.value) < key);
        self.intervals.insert(pos, iv);
        self.rebuild_index();
    }

    pub fn remove(&mut self, value: SpannerId) {
        self.intervals.retain(|i| i.value != value);
        self.rebuild_index();
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    fn rebuild_index(&mut self) {
        self.max_stop.clear();
        let mut m = Tick::MIN;
        for iv in &self.intervals {
            m = m.max(iv.stop);
            self.max_stop.push(m);
        }
    }

    /// All intervals intersecting `[from, to]`, in start order.
    pub fn find_overlapping(&self, from: Tick, to: Tick) -> Vec<Interval> {
        // After deserialization the prefix index is empty; fall back to a scan.
        if self.max_stop.len() != self.intervals.len() {
            return self
                .intervals
                .iter()
                .filter(|i| i.start <= to && i.stop >= from)
                .copied()
                .collect();
        }
        let first = self.max_stop.partition_point(|&m| m < from);
        let last = self.intervals.partition_point(|i| i.start <= to);
        if first >= last {
            return Vec::new();
        }
        self.intervals[first..last]
            .iter()
            .filter(|i| i.stop >= from)
            .copied()
            .collect()
    }

    /// Restore the prefix index after deserialization.
    pub fn reindex(&mut self) {
        self.intervals.sort_by_key(|i| (i.start, i.stop, i.value));
        self.rebuild_index();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: Vec<Interval>) -> Vec<usize> {
        v.into_iter().map(|i| i.value.0).collect()
    }

    #[test]
    fn finds_closed_overlaps() {
        let mut map = SpannerMap::new();
        map.insert(0, 480, SpannerId(0));
        map.insert(480, 960, SpannerId(1));
        map.insert(2000, 3000, SpannerId(2));
        assert_eq!(ids(map.find_overlapping(480, 480)), vec![0, 1]);
        assert_eq!(ids(map.find_overlapping(961, 1999)), Vec::<usize>::new());
        assert_eq!(ids(map.find_overlapping(0, 5000)), vec![0, 1, 2]);
    }

    #[test]
    fn long_interval_is_found_past_short_ones() {
        let mut map = SpannerMap::new();
        map.insert(0, 10_000, SpannerId(7));
        map.insert(10, 20, SpannerId(8));
        assert_eq!(ids(map.find_overlapping(5000, 6000)), vec![7]);
    }

    #[test]
    fn remove_drops_interval() {
        let mut map = SpannerMap::new();
        map.insert(0, 10, SpannerId(1));
        map.remove(SpannerId(1));
        assert!(map.find_overlapping(0, 10).is_empty());
    }
}
