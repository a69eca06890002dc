use std::cmp::Ordering;
use std::collections::BinaryHeap;

use geo_traits::CoordTrait;
use log::trace;
use tinyvec::TinyVec;

use crate::kdtree::{KdTree, Node, NodeRef};
use crate::util::{axis, left_child, right_child, tree_height};

/// A trait for searching and accessing data out of a KdTree.
pub trait KdTreeIndex: Sized {
    /// The underlying node array of this tree, in implicit binary layout
    fn nodes(&self) -> &[Node];

    /// The number of points in this KdTree
    fn num_items(&self) -> usize;

    /// The number of slots in the node array, occupied or empty
    fn capacity(&self) -> usize {
        self.nodes().len()
    }

    /// The number of levels of this KdTree
    fn height(&self) -> u32 {
        tree_height(self.num_items())
    }

    /// Returns `true` if the tree holds no points.
    fn is_empty(&self) -> bool {
        self.num_items() == 0
    }

    /// Find the point closest to the query point.
    ///
    /// - qx: x value of query point
    /// - qy: y value of query point
    ///
    /// Returns the id of the closest point, or `None` if the tree is empty. Among points at
    /// the same distance, the first one reached by the search wins.
    fn nearest(&self, qx: f64, qy: f64) -> Option<i64> {
        let mut best = Best::default();
        let visited = branch_and_bound(self.nodes(), qx, qy, &mut best);
        trace!(
            "nearest({}, {}) visited {} of {} points",
            qx,
            qy,
            visited,
            self.num_items()
        );
        best.best.map(|neighbor| neighbor.id)
    }

    /// Find the point closest to the query coordinate.
    fn nearest_coord(&self, coord: &impl CoordTrait<T = f64>) -> Option<i64> {
        self.nearest(coord.x(), coord.y())
    }

    /// Find the `k` points closest to the query point.
    ///
    /// - qx: x value of query point
    /// - qy: y value of query point
    /// - k: maximum number of results
    ///
    /// Returns the ids of `min(k, num_items)` points, nearest first. Points at equal distance
    /// keep the order in which the search reached them.
    fn nearest_k(&self, qx: f64, qy: f64, k: usize) -> Vec<i64> {
        if k == 0 || self.is_empty() {
            return vec![];
        }

        let mut heap = BoundedHeap::new(k.min(self.num_items()));
        let visited = branch_and_bound(self.nodes(), qx, qy, &mut heap);
        trace!(
            "nearest_k({}, {}, {}) visited {} of {} points",
            qx,
            qy,
            k,
            visited,
            self.num_items()
        );
        heap.into_sorted_ids()
    }

    /// Find the `k` points closest to the query coordinate.
    fn nearest_k_coord(&self, coord: &impl CoordTrait<T = f64>, k: usize) -> Vec<i64> {
        self.nearest_k(coord.x(), coord.y(), k)
    }

    /// Access the root node of the KdTree for manual traversal.
    ///
    /// Returns `None` if the tree is empty.
    fn root(&self) -> Option<NodeRef<'_, Self>> {
        NodeRef::from_root(self)
    }
}

impl KdTreeIndex for KdTree {
    fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn num_items(&self) -> usize {
        self.num_items
    }
}

/// The running result of a search.
trait Candidates {
    /// The squared distance a subtree must beat to be worth visiting, or `None` while any point
    /// would still be accepted.
    fn bound(&self) -> Option<f64>;

    /// Consider a visited point.
    fn offer(&mut self, id: i64, dist: f64);
}

/// Depth-first branch-and-bound descent from the root.
///
/// Each occupied node is offered to `candidates`, then its near child is searched, then its far
/// child if the splitting line is closer than the current bound. Using an explicit stack, the far
/// child is pushed with its line distance before the near child so that the bound is checked only
/// once the near subtree is exhausted.
///
/// Returns the number of occupied nodes visited.
fn branch_and_bound(
    nodes: &[Node],
    qx: f64,
    qy: f64,
    candidates: &mut impl Candidates,
) -> usize {
    if nodes.is_empty() {
        return 0;
    }

    // Use TinyVec to avoid heap allocations
    let mut stack: TinyVec<[(usize, Option<f64>); 64]> = TinyVec::new();
    stack.push((0, None));
    let mut visited = 0;

    while let Some((index, line_dist)) = stack.pop() {
        // a NaN line distance (an infinite query against an infinite split) bounds nothing
        if let Some(line_dist) = line_dist.filter(|d| !d.is_nan()) {
            if !beats(line_dist, candidates.bound()) {
                continue; // prune
            }
        }

        let point = match nodes.get(index) {
            Some(Node::Occupied(point)) => point,
            _ => continue,
        };
        visited += 1;
        candidates.offer(point.id, point.sq_dist(qx, qy));

        let axis = axis(index);
        let delta = if axis == 0 { qx - point.x } else { qy - point.y };
        let (near, far) = if delta <= 0. {
            (left_child(index), right_child(index))
        } else {
            (right_child(index), left_child(index))
        };

        // Note: these are pushed in backwards order to what gets popped
        if far < nodes.len() {
            stack.push((far, Some(delta * delta)));
        }
        if near < nodes.len() {
            stack.push((near, None));
        }
    }

    visited
}

/// Order squared distances with every NaN, whatever its sign, after every number.
#[inline]
fn cmp_dist(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Whether `dist` is strictly smaller than `bound`, ordered by [`cmp_dist`].
#[inline]
fn beats(dist: f64, bound: Option<f64>) -> bool {
    match bound {
        None => true,
        Some(bound) => cmp_dist(dist, bound) == Ordering::Less,
    }
}

/// A candidate result and its squared distance to the query.
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    id: i64,
    dist: f64,
    /// Position in the order points were reached
    seq: usize,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_dist(self.dist, other.dist).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single best candidate, for [`KdTreeIndex::nearest`].
#[derive(Debug, Default)]
struct Best {
    best: Option<Neighbor>,
}

impl Candidates for Best {
    fn bound(&self) -> Option<f64> {
        self.best.map(|neighbor| neighbor.dist)
    }

    fn offer(&mut self, id: i64, dist: f64) {
        if beats(dist, self.bound()) {
            self.best = Some(Neighbor { id, dist, seq: 0 });
        }
    }
}

/// Max-heap holding at most `k` candidates, for [`KdTreeIndex::nearest_k`].
///
/// The top of the heap is the worst of the current candidates.
#[derive(Debug)]
struct BoundedHeap {
    k: usize,
    heap: BinaryHeap<Neighbor>,
    seq: usize,
}

impl BoundedHeap {
    fn new(k: usize) -> Self {
        debug_assert!(k > 0);
        Self {
            k,
            heap: BinaryHeap::with_capacity(k),
            seq: 0,
        }
    }

    /// Ids ordered by ascending distance, then by the order they were reached.
    fn into_sorted_ids(self) -> Vec<i64> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|neighbor| neighbor.id)
            .collect()
    }
}

impl Candidates for BoundedHeap {
    fn bound(&self) -> Option<f64> {
        if self.heap.len() < self.k {
            None
        } else {
            self.heap.peek().map(|worst| worst.dist)
        }
    }

    fn offer(&mut self, id: i64, dist: f64) {
        let neighbor = Neighbor {
            id,
            dist,
            seq: self.seq,
        };
        self.seq += 1;

        if self.heap.len() < self.k {
            self.heap.push(neighbor);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if beats(dist, Some(worst.dist)) {
                // sifts down when dropped
                *worst = neighbor;
            }
        }
    }
}
