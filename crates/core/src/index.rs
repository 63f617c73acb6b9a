//! Interval index over `(interval, id)` entries.
//!
//! A treap keyed by `(low, high, id)` where every node also tracks the largest
//! `high` in its subtree. Nodes live in an arena and are never removed; a new
//! record set means a new index.
//!
//! Queries are pure: [`IntervalIndex::range_query`] returns a lazy iterator
//! that can be cloned to restart, truncated with `take`, or collected. Results
//! come out in ascending `(low, high, id)` order whatever the insertion order.

use std::cmp::Ordering;

use sensorline_protocol::{Interval, RecordId};

/// Results kept per query when the caller does not choose a cap.
pub const DEFAULT_QUERY_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalEntry<K> {
    pub interval: Interval,
    pub id: K,
}

#[derive(Debug, Clone)]
struct Node<K> {
    entry: IntervalEntry<K>,
    priority: u64,
    max_high: f64,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct IntervalIndex<K = RecordId> {
    nodes: Vec<Node<K>>,
    root: Option<usize>,
}

impl<K: Copy + Ord> IntervalIndex<K> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add an entry. Duplicate ids and identical intervals are allowed.
    pub fn insert(&mut self, interval: Interval, id: K) {
        let slot = self.nodes.len();
        self.nodes.push(Node {
            entry: IntervalEntry { interval, id },
            priority: mix(slot as u64),
            max_high: interval.high(),
            left: None,
            right: None,
        });
        self.root = Some(self.insert_at(self.root, slot));
    }

    /// Every entry overlapping `query` (closed intervals on both sides).
    pub fn range_query(&self, query: Interval) -> Overlaps<'_, K> {
        Overlaps {
            nodes: &self.nodes,
            query,
            stack: Vec::new(),
            cursor: self.root,
        }
    }

    /// Every entry whose interval contains instant `t`, bounds included.
    pub fn at(&self, t: f64) -> Overlaps<'_, K> {
        self.range_query(Interval::point(t))
    }

    /// `range_query` truncated to `cap` results.
    pub fn query_capped(&self, query: Interval, cap: usize) -> Vec<IntervalEntry<K>> {
        self.range_query(query).take(cap).collect()
    }

    /// All entries in key order.
    pub fn iter(&self) -> Overlaps<'_, K> {
        self.range_query(Interval::new(f64::NEG_INFINITY, f64::INFINITY).unwrap_or(Interval::point(0.0)))
    }

    fn insert_at(&mut self, root: Option<usize>, slot: usize) -> usize {
        let Some(mut root) = root else {
            return slot;
        };
        if compare(&self.nodes[slot].entry, &self.nodes[root].entry) == Ordering::Less {
            let child = self.insert_at(self.nodes[root].left, slot);
            self.nodes[root].left = Some(child);
            if self.nodes[child].priority > self.nodes[root].priority {
                root = self.rotate_right(root);
            }
        } else {
            let child = self.insert_at(self.nodes[root].right, slot);
            self.nodes[root].right = Some(child);
            if self.nodes[child].priority > self.nodes[root].priority {
                root = self.rotate_left(root);
            }
        }
        self.refresh(root);
        root
    }

    fn rotate_right(&mut self, root: usize) -> usize {
        let Some(pivot) = self.nodes[root].left else {
            return root;
        };
        self.nodes[root].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(root);
        self.refresh(root);
        self.refresh(pivot);
        pivot
    }

    fn rotate_left(&mut self, root: usize) -> usize {
        let Some(pivot) = self.nodes[root].right else {
            return root;
        };
        self.nodes[root].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(root);
        self.refresh(root);
        self.refresh(pivot);
        pivot
    }

    fn refresh(&mut self, slot: usize) {
        let node = &self.nodes[slot];
        let mut max_high = node.entry.interval.high();
        for child in [node.left, node.right].into_iter().flatten() {
            max_high = max_high.max(self.nodes[child].max_high);
        }
        self.nodes[slot].max_high = max_high;
    }
}

impl<K: Copy + Ord> Default for IntervalIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Ord> FromIterator<(Interval, K)> for IntervalIndex<K> {
    fn from_iter<I: IntoIterator<Item = (Interval, K)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut index = Self::with_capacity(iter.size_hint().0);
        for (interval, id) in iter {
            index.insert(interval, id);
        }
        index
    }
}

/// Lazy in-order walk over the entries overlapping one query.
///
/// Subtrees whose `max_high` falls below the query are skipped, and the walk
/// stops at the first node starting after the query, since every later node
/// starts no earlier.
#[derive(Debug, Clone)]
pub struct Overlaps<'a, K> {
    nodes: &'a [Node<K>],
    query: Interval,
    stack: Vec<usize>,
    cursor: Option<usize>,
}

impl<K: Copy> Iterator for Overlaps<'_, K> {
    type Item = IntervalEntry<K>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(slot) = self.cursor {
                let node = &self.nodes[slot];
                if node.max_high < self.query.low() {
                    self.cursor = None;
                    break;
                }
                self.stack.push(slot);
                self.cursor = node.left;
            }

            let slot = self.stack.pop()?;
            let node = &self.nodes[slot];
            if node.entry.interval.low() > self.query.high() {
                self.stack.clear();
                return None;
            }
            self.cursor = node.right;
            if node.entry.interval.high() >= self.query.low() {
                return Some(node.entry);
            }
        }
    }
}

fn compare<K: Ord>(a: &IntervalEntry<K>, b: &IntervalEntry<K>) -> Ordering {
    a.interval
        .low()
        .total_cmp(&b.interval.low())
        .then_with(|| a.interval.high().total_cmp(&b.interval.high()))
        .then_with(|| a.id.cmp(&b.id))
}

/// SplitMix64 finalizer. Deterministic heap priorities keep query order and
/// tree shape reproducible between runs while staying well spread.
fn mix(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(low: f64, high: f64) -> Interval {
        Interval::new(low, high).unwrap_or(Interval::point(f64::NAN))
    }

    fn ids(results: impl Iterator<Item = IntervalEntry<u64>>) -> Vec<u64> {
        let mut ids: Vec<u64> = results.map(|e| e.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Tiny LCG so the brute-force comparison covers many shapes without a
    /// randomness dependency.
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self, max: f64) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * max
        }
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index: IntervalIndex = IntervalIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.range_query(iv(0.0, 100.0)).count(), 0);
        assert_eq!(index.at(5.0).count(), 0);
    }

    #[test]
    fn closed_interval_semantics() {
        let index: IntervalIndex = [(iv(0.0, 10.0), 1), (iv(10.0, 20.0), 2), (iv(21.0, 30.0), 3)]
            .into_iter()
            .collect();
        assert_eq!(ids(index.at(10.0)), vec![1, 2]);
        assert_eq!(ids(index.at(20.5)), Vec::<u64>::new());
        assert_eq!(ids(index.at(21.0)), vec![3]);
        assert_eq!(ids(index.range_query(iv(20.0, 21.0))), vec![2, 3]);
        assert_eq!(ids(index.range_query(iv(-5.0, -0.1))), Vec::<u64>::new());
    }

    #[test]
    fn duplicates_and_nesting() {
        let mut index = IntervalIndex::new();
        index.insert(iv(100.0, 160.0), 4);
        index.insert(iv(100.0, 160.0), 2);
        index.insert(iv(110.0, 120.0), 9);
        index.insert(iv(0.0, 1000.0), 7);
        assert_eq!(index.len(), 4);
        assert_eq!(ids(index.at(115.0)), vec![2, 4, 7, 9]);
        assert_eq!(ids(index.at(150.0)), vec![2, 4, 7]);
        assert_eq!(ids(index.at(500.0)), vec![7]);
    }

    #[test]
    fn matches_brute_force_regardless_of_insertion_order() {
        let mut rng = Lcg(42);
        let entries: Vec<(Interval, u64)> = (0..500)
            .map(|i| {
                let low = rng.next_f64(10_000.0);
                let len = if i % 3 == 0 { 1.0 } else { rng.next_f64(200.0) };
                (iv(low, low + len), i)
            })
            .collect();

        let forward: IntervalIndex = entries.iter().copied().collect();
        let backward: IntervalIndex = entries.iter().rev().copied().collect();

        for _ in 0..200 {
            let low = rng.next_f64(10_500.0) - 250.0;
            let q = iv(low, low + rng.next_f64(300.0));
            let mut expected: Vec<u64> = entries
                .iter()
                .filter(|(i, _)| i.low() <= q.high() && i.high() >= q.low())
                .map(|(_, id)| *id)
                .collect();
            expected.sort_unstable();
            assert_eq!(ids(forward.range_query(q)), expected);
            assert_eq!(ids(backward.range_query(q)), expected);
        }
    }

    #[test]
    fn results_are_ordered_and_restartable() {
        let index: IntervalIndex = [(iv(5.0, 6.0), 3), (iv(1.0, 9.0), 1), (iv(3.0, 4.0), 2)]
            .into_iter()
            .collect();
        let query = index.range_query(iv(0.0, 10.0));
        let restart = query.clone();
        let first: Vec<u64> = query.map(|e| e.id).collect();
        let second: Vec<u64> = restart.map(|e| e.id).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
        assert_eq!(index.iter().count(), 3);
    }

    #[test]
    fn cap_truncates_dense_regions() {
        let index: IntervalIndex = (0..5000u64).map(|i| (iv(i as f64, i as f64 + 1.0), i)).collect();
        let capped = index.query_capped(iv(0.0, 5000.0), DEFAULT_QUERY_CAP);
        assert_eq!(capped.len(), DEFAULT_QUERY_CAP);
        assert_eq!(capped.first().map(|e| e.id), Some(0));
        assert_eq!(index.range_query(iv(0.0, 5000.0)).count(), 5000);
    }

    #[test]
    fn sorted_insertions_stay_shallow() {
        let index: IntervalIndex = (0..20_000u64).map(|i| (iv(i as f64, i as f64), i)).collect();
        fn depth(nodes: &[Node<u64>], slot: Option<usize>) -> usize {
            slot.map_or(0, |s| 1 + depth(nodes, nodes[s].left).max(depth(nodes, nodes[s].right)))
        }
        assert!(depth(&index.nodes, index.root) < 80);
    }
}
