// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::distance::projected_distance;

/// What [KdTree::insert] should do when a value already exists at the same coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the existing value, and hand back the new one.
    #[default]
    Reject,

    /// Replace the existing value with the new one.
    KeepNewest,

    /// Keep the existing value and silently drop the new one.
    KeepOldest,
}

/// Result of [KdTree::insert].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted,

    /// [ConflictPolicy::KeepNewest] - carries the replaced value.
    Replaced(T),

    /// [ConflictPolicy::Reject] - carries the rejected value.
    Rejected(T),

    /// [ConflictPolicy::KeepOldest] - the new value was dropped.
    Ignored,
}

/// Result of a [KdTree] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor<'a, T> {
    pub distance: f64,
    pub point: [f64; 2],
    pub value: &'a T,
}

#[derive(Debug, Clone)]
struct KdNode<T> {
    point: [f64; 2],
    value: T,
    left: Option<usize>,
    right: Option<usize>,

    /// Number of nodes in the subtree rooted at this node, including itself.
    size: usize,
}

/// Weight-balance factor of [KdTree::insert]. A subtree is rebuilt once one of its
/// children holds more than this fraction of its nodes.
const BALANCE: f64 = 0.7;

/// KdTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree)
/// over projected (planar) coordinates, used to speed up nearest-neighbor searches.
///
/// Even levels of the tree split on the first coordinate, odd levels on the second.
/// All distances are euclidean, in the units of the coordinates.
///
/// [KdTree::build] creates a balanced tree. [KdTree::insert] keeps the depth logarithmic
/// by rebuilding the smallest unbalanced subtree (as in a
/// [scapegoat tree](https://en.wikipedia.org/wiki/Scapegoat_tree)), so inserting
/// points in sorted order is fine; bulk building is still cheaper for large datasets.
#[derive(Debug, Clone)]
pub struct KdTree<T> {
    nodes: Vec<KdNode<T>>,
    root: Option<usize>,
    policy: ConflictPolicy,
}

impl<T> Default for KdTree<T> {
    fn default() -> Self {
        Self::new(ConflictPolicy::default())
    }
}

/// Max-heap entry, ordered by distance.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.idx.cmp(&other.idx))
    }
}

impl<T> KdTree<T> {
    /// Creates an empty tree.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            policy,
        }
    }

    /// Builds a balanced tree from `(point, value)` pairs.
    ///
    /// Values sharing the exact same point are resolved as if they were
    /// [inserted](KdTree::insert) in iteration order.
    pub fn build<I: IntoIterator<Item = ([f64; 2], T)>>(items: I, policy: ConflictPolicy) -> Self {
        let mut items: Vec<([f64; 2], T)> = items.into_iter().collect();

        // Stable sort, so that equal points keep their insertion order
        items.sort_by(|(a, _), (b, _)| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));

        let mut tree = Self::new(policy);
        tree.nodes.reserve(items.len());
        for (point, value) in items {
            match tree.nodes.last_mut() {
                Some(last) if last.point == point => {
                    if policy == ConflictPolicy::KeepNewest {
                        last.value = value;
                    }
                }
                _ => tree.nodes.push(KdNode {
                    point,
                    value,
                    left: None,
                    right: None,
                    size: 1,
                }),
            }
        }

        let mut all: Vec<usize> = (0..tree.nodes.len()).collect();
        tree.root = tree.relink(&mut all, 0);
        tree
    }

    /// Arranges the provided nodes into a balanced subtree starting at `depth`,
    /// returning its root.
    fn relink(&mut self, subtree: &mut [usize], depth: usize) -> Option<usize> {
        if subtree.is_empty() {
            return None;
        }

        let axis = depth % 2;
        let median = subtree.len() / 2;
        let nodes = &self.nodes;
        subtree.select_nth_unstable_by(median, |&a, &b| {
            nodes[a].point[axis].total_cmp(&nodes[b].point[axis])
        });

        let idx = subtree[median];
        let size = subtree.len();
        let (left, right_and_pivot) = subtree.split_at_mut(median);
        let left = self.relink(left, depth + 1);
        let right = self.relink(&mut right_and_pivot[1..], depth + 1);

        let node = &mut self.nodes[idx];
        node.left = left;
        node.right = right;
        node.size = size;
        Some(idx)
    }

    /// Collects indices of all nodes in the subtree rooted at `root`.
    fn subtree(&self, root: usize) -> Vec<usize> {
        let mut collected = Vec::with_capacity(self.nodes[root].size);
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            collected.push(idx);
            let node = &self.nodes[idx];
            stack.extend(node.left);
            stack.extend(node.right);
        }
        collected
    }

    /// Returns the number of points in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Iterates over all points and values, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = ([f64; 2], &T)> {
        self.nodes.iter().map(|n| (n.point, &n.value))
    }

    /// Adds a new point to the tree, resolving conflicts with an existing point
    /// at the exact same coordinates according to the tree's [ConflictPolicy].
    pub fn insert(&mut self, point: [f64; 2], value: T) -> InsertOutcome<T> {
        if let Some(existing) = self.nearest_idx(point).filter(|c| c.distance == 0.0) {
            return match self.policy {
                ConflictPolicy::Reject => InsertOutcome::Rejected(value),
                ConflictPolicy::KeepOldest => InsertOutcome::Ignored,
                ConflictPolicy::KeepNewest => InsertOutcome::Replaced(std::mem::replace(
                    &mut self.nodes[existing.idx].value,
                    value,
                )),
            };
        }

        let idx = self.nodes.len();
        self.nodes.push(KdNode {
            point,
            value,
            left: None,
            right: None,
            size: 1,
        });

        let Some(mut at) = self.root else {
            self.root = Some(idx);
            return InsertOutcome::Inserted;
        };

        // Ancestors of the new node; path[d] lies at depth d
        let mut path = Vec::new();
        loop {
            path.push(at);
            let axis = (path.len() - 1) % 2;
            let node = &mut self.nodes[at];
            node.size += 1;
            let branch = if point[axis] < node.point[axis] {
                &mut node.left
            } else {
                &mut node.right
            };

            match *branch {
                Some(next) => at = next,
                None => {
                    *branch = Some(idx);
                    break;
                }
            }
        }

        let max_depth = (self.len() as f64).ln() / (1.0 / BALANCE).ln();
        if path.len() as f64 > max_depth {
            self.rebalance(&path, idx);
        }
        InsertOutcome::Inserted
    }

    /// Rebuilds the deepest subtree on `path` whose child towards `inserted`
    /// is too heavy.
    fn rebalance(&mut self, path: &[usize], inserted: usize) {
        let mut child = inserted;
        for (depth, &parent) in path.iter().enumerate().rev() {
            let heavy = self.nodes[child].size as f64 > BALANCE * self.nodes[parent].size as f64;
            if heavy {
                let mut subtree = self.subtree(parent);
                let new_root = self.relink(&mut subtree, depth);
                match depth.checked_sub(1).map(|d| path[d]) {
                    None => self.root = new_root,
                    Some(grandparent) => {
                        let node = &mut self.nodes[grandparent];
                        if node.left == Some(parent) {
                            node.left = new_root;
                        } else {
                            node.right = new_root;
                        }
                    }
                }
                return;
            }
            child = parent;
        }
    }

    fn nearest_idx(&self, point: [f64; 2]) -> Option<Candidate> {
        let mut heap = BinaryHeap::with_capacity(2);
        self.k_nearest_impl(point, 1, &mut heap);
        heap.pop()
    }

    fn k_nearest_impl(&self, point: [f64; 2], k: usize, heap: &mut BinaryHeap<Candidate>) {
        // (node, depth, min possible distance to any point in the node's subtree)
        let mut stack: Vec<(usize, usize, f64)> = Vec::new();
        stack.extend(self.root.map(|root| (root, 0, 0.0)));

        while let Some((idx, depth, bound)) = stack.pop() {
            if heap.len() >= k && heap.peek().is_some_and(|worst| bound > worst.distance) {
                continue;
            }

            let node = &self.nodes[idx];
            let distance = projected_distance(point, node.point);
            if heap.len() < k {
                heap.push(Candidate { distance, idx });
            } else if heap.peek().is_some_and(|worst| distance < worst.distance) {
                heap.pop();
                heap.push(Candidate { distance, idx });
            }

            let axis = depth % 2;
            let diff = point[axis] - node.point[axis];
            let (near, far) = if diff < 0.0 {
                (node.left, node.right)
            } else {
                (node.right, node.left)
            };

            // The far side can only hold a closer point if the splitting line
            // is closer than the current worst candidate. It's pushed first,
            // so that the near side is explored before that is checked.
            stack.extend(far.map(|far| (far, depth + 1, bound.max(diff.abs()))));
            stack.extend(near.map(|near| (near, depth + 1, bound)));
        }
    }

    fn neighbors(&self, heap: BinaryHeap<Candidate>) -> Vec<Neighbor<'_, T>> {
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| {
                let node = &self.nodes[c.idx];
                Neighbor {
                    distance: c.distance,
                    point: node.point,
                    value: &node.value,
                }
            })
            .collect()
    }

    /// Finds the closest point to the given position.
    pub fn nearest(&self, point: [f64; 2]) -> Option<Neighbor<'_, T>> {
        self.k_nearest(point, 1).into_iter().next()
    }

    /// Finds up to `k` closest points, sorted by ascending distance.
    pub fn k_nearest(&self, point: [f64; 2], k: usize) -> Vec<Neighbor<'_, T>> {
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if k > 0 {
            self.k_nearest_impl(point, k, &mut heap);
        }
        self.neighbors(heap)
    }

    /// Finds all points at most `max_distance` away, sorted by ascending distance.
    ///
    /// The search asks for the 10 nearest points, and widens the search 4 times
    /// until the farthest candidate is beyond `max_distance`. This keeps the cost bounded
    /// for clustered data, where a fixed-k query would either miss points or over-fetch.
    pub fn nearest_within(&self, point: [f64; 2], max_distance: f64) -> Vec<Neighbor<'_, T>> {
        let mut k = self.len().min(10);
        loop {
            let mut found = self.k_nearest(point, k);
            let exhausted = k >= self.len();
            let beyond = found.last().is_some_and(|n| n.distance > max_distance);

            if exhausted || beyond {
                let cut = found.partition_point(|n| n.distance <= max_distance);
                found.truncate(cut);
                return found;
            }

            k = k.saturating_mul(4).min(self.len());
        }
    }

    /// Finds at least `n` closest points, and more if there are additional points
    /// within `force_radius`. Points farther than `max_radius` are never returned,
    /// even if that leaves less than `n` points.
    pub fn n_nearest_forced_merge(
        &self,
        point: [f64; 2],
        n: usize,
        force_radius: f64,
        max_radius: f64,
    ) -> Vec<Neighbor<'_, T>> {
        let forced = self.nearest_within(point, force_radius.min(max_radius));
        if forced.len() >= n {
            return forced;
        }

        let mut nearest = self.k_nearest(point, n);
        let cut = nearest.partition_point(|nb| nb.distance <= max_radius);
        nearest.truncate(cut);
        nearest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KdTree<u32> {
        KdTree::build(
            [
                ([10.0, 10.0], 1),
                ([10.0, 50.0], 2),
                ([30.0, 90.0], 3),
                ([40.0, 30.0], 4),
                ([40.0, 70.0], 5),
                ([70.0, 30.0], 6),
                ([70.0, 10.0], 7),
                ([80.0, 50.0], 8),
                ([80.0, 90.0], 9),
            ],
            ConflictPolicy::Reject,
        )
    }

    fn height<T>(tree: &KdTree<T>) -> usize {
        let mut height = 0;
        let mut stack: Vec<(usize, usize)> = tree.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((idx, depth)) = stack.pop() {
            height = height.max(depth);
            let node = &tree.nodes[idx];
            stack.extend(node.left.map(|i| (i, depth + 1)));
            stack.extend(node.right.map(|i| (i, depth + 1)));
        }
        height
    }

    fn values(found: &[Neighbor<'_, u32>]) -> Vec<u32> {
        found.iter().map(|n| *n.value).collect()
    }

    #[test]
    fn kd_tree() {
        let tree = sample();
        assert_eq!(tree.len(), 9);
        assert_eq!(*tree.nearest([20.0, 20.0]).unwrap().value, 1);
        assert_eq!(*tree.nearest([50.0, 30.0]).unwrap().value, 4);
        assert_eq!(*tree.nearest([50.0, 80.0]).unwrap().value, 5);
        assert_eq!(*tree.nearest([90.0, 60.0]).unwrap().value, 8);
    }

    #[test]
    fn k_nearest_is_sorted() {
        let tree = sample();
        assert_eq!(values(&tree.k_nearest([20.0, 20.0], 4)), vec![1, 4, 2, 6]);
        assert_eq!(values(&tree.k_nearest([50.0, 30.0], 3)), vec![4, 6, 7]);
        assert_eq!(tree.k_nearest([50.0, 30.0], 100).len(), 9);
        assert!(tree.k_nearest([50.0, 30.0], 0).is_empty());
    }

    #[test]
    fn empty_tree() {
        let tree: KdTree<u32> = KdTree::default();
        assert!(tree.nearest([0.0, 0.0]).is_none());
        assert!(tree.nearest_within([0.0, 0.0], 100.0).is_empty());
    }

    #[test]
    fn inserted_points_are_found() {
        let mut tree = KdTree::new(ConflictPolicy::Reject);
        for (i, &(x, y)) in [(5.0, 5.0), (1.0, 9.0), (8.0, 2.0), (3.0, 3.0), (9.0, 9.0)]
            .iter()
            .enumerate()
        {
            assert_eq!(tree.insert([x, y], i), InsertOutcome::Inserted);
        }
        assert_eq!(*tree.nearest([2.5, 3.5]).unwrap().value, 3);
        assert_eq!(*tree.nearest([10.0, 10.0]).unwrap().value, 4);
    }

    #[test]
    fn conflict_policies() {
        let mut reject = KdTree::new(ConflictPolicy::Reject);
        reject.insert([1.0, 1.0], "a");
        assert_eq!(reject.insert([1.0, 1.0], "b"), InsertOutcome::Rejected("b"));
        assert_eq!(*reject.nearest([1.0, 1.0]).unwrap().value, "a");

        let mut newest = KdTree::new(ConflictPolicy::KeepNewest);
        newest.insert([1.0, 1.0], "a");
        assert_eq!(newest.insert([1.0, 1.0], "b"), InsertOutcome::Replaced("a"));
        assert_eq!(*newest.nearest([1.0, 1.0]).unwrap().value, "b");
        assert_eq!(newest.len(), 1);

        let mut oldest = KdTree::new(ConflictPolicy::KeepOldest);
        oldest.insert([1.0, 1.0], "a");
        assert_eq!(oldest.insert([1.0, 1.0], "b"), InsertOutcome::Ignored);
        assert_eq!(*oldest.nearest([1.0, 1.0]).unwrap().value, "a");
    }

    #[test]
    fn build_resolves_duplicates() {
        let items = [([1.0, 1.0], "a"), ([2.0, 2.0], "x"), ([1.0, 1.0], "b")];

        let oldest = KdTree::build(items, ConflictPolicy::KeepOldest);
        assert_eq!(oldest.len(), 2);
        assert_eq!(*oldest.nearest([1.0, 1.0]).unwrap().value, "a");

        let newest = KdTree::build(items, ConflictPolicy::KeepNewest);
        assert_eq!(newest.len(), 2);
        assert_eq!(*newest.nearest([1.0, 1.0]).unwrap().value, "b");
    }

    #[test]
    fn nearest_within_clustered() {
        // 50 points packed within a meter, and a few far away
        let mut items: Vec<([f64; 2], u32)> = (0..50)
            .map(|i| ([100.0 + (i % 7) as f64 * 0.1, 100.0 + (i / 7) as f64 * 0.1], i))
            .collect();
        items.push(([500.0, 500.0], 1000));
        items.push(([0.0, 0.0], 1001));
        let tree = KdTree::build(items, ConflictPolicy::Reject);

        let found = tree.nearest_within([100.3, 100.3], 5.0);
        assert_eq!(found.len(), 50);
        assert!(found.windows(2).all(|p| p[0].distance <= p[1].distance));

        assert_eq!(tree.nearest_within([100.3, 100.3], 1000.0).len(), 52);
        assert!(tree.nearest_within([300.0, 300.0], 10.0).is_empty());
    }

    #[test]
    fn forced_merge() {
        let tree = sample();

        // Only 1 point within the force radius - fall back to 2 nearest
        assert_eq!(
            values(&tree.n_nearest_forced_merge([20.0, 20.0], 2, 15.0, 100.0)),
            vec![1, 4],
        );

        // 3 points within the force radius - all are returned
        assert_eq!(
            values(&tree.n_nearest_forced_merge([20.0, 20.0], 2, 35.0, 100.0)),
            vec![1, 4, 2],
        );

        // The max radius always wins
        assert_eq!(
            values(&tree.n_nearest_forced_merge([20.0, 20.0], 3, 5.0, 20.0)),
            vec![1],
        );
    }

    #[test]
    fn sorted_inserts_stay_balanced() {
        let n = 100_000_u32;
        let mut tree = KdTree::new(ConflictPolicy::Reject);
        for i in 0..n {
            let p = i as f64;
            assert_eq!(tree.insert([p, p], i), InsertOutcome::Inserted);
        }
        assert_eq!(tree.len(), n as usize);
        assert_eq!(tree.nodes[tree.root.unwrap()].size, n as usize);

        // A linked list would be 100k nodes deep
        assert!(height(&tree) <= 40, "height is {}", height(&tree));

        assert_eq!(*tree.nearest([0.0, 0.0]).unwrap().value, 0);
        assert_eq!(*tree.nearest([70_000.4, 70_000.3]).unwrap().value, 70_000);
        assert_eq!(
            values(&tree.k_nearest([500.0, 500.0], 3)),
            vec![500, 499, 501],
        );
        assert_eq!(tree.insert([42.0, 42.0], 0), InsertOutcome::Rejected(0));
    }

    #[test]
    fn reverse_sorted_inserts_are_found() {
        let mut tree = KdTree::new(ConflictPolicy::KeepOldest);
        for i in (0..1000_u32).rev() {
            tree.insert([i as f64, -(i as f64)], i);
        }
        assert!(height(&tree) <= 25);
        for i in (0..1000_u32).step_by(37) {
            let found = tree.nearest([i as f64 + 0.1, -(i as f64)]).unwrap();
            assert_eq!(*found.value, i);
        }
        assert_eq!(tree.nearest_within([10.0, -10.0], 1.5).len(), 3);
    }
}
