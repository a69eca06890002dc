use std::cmp::{self, Ordering};

use geo_traits::CoordTrait;
use log::debug;
use num_traits::ToPrimitive;

use crate::error::{KdTreeError, Result};
use crate::kdtree::{KdTree, Node};
use crate::r#type::Point;
use crate::util::{self, compute_capacity, left_child, right_child};

/// The persisted format stores counts as `u32`.
const MAX_NUM_ITEMS: usize = u32::MAX as usize;

/// Below this many items a subtree is always partitioned on the current thread.
#[cfg(feature = "rayon")]
const PARALLEL_THRESHOLD: usize = 1 << 14;

/// A builder to create a [`KdTree`].
///
/// ```
/// use geo_kdtree::kdtree::{KdTreeBuilder, KdTreeIndex};
///
/// let mut builder = KdTreeBuilder::new(3);
/// builder.add(47.6, -122.3, 1).unwrap(); // Seattle
/// builder.add(45.5, -122.8, 2).unwrap(); // Portland
/// builder.add(40.7, -74.0, 3).unwrap(); // New York
/// let tree = builder.finish().unwrap();
///
/// // which city is closest to San Francisco?
/// assert_eq!(tree.nearest(34.1, -118.2), Some(2));
/// // which two cities are closest to San Francisco?
/// assert_eq!(tree.nearest_k(34.1, -118.2, 2), vec![2, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct KdTreeBuilder {
    points: Vec<Point>,
    num_items: usize,
}

impl KdTreeBuilder {
    /// Create a new builder for exactly `num_items` points.
    pub fn new(num_items: usize) -> Self {
        Self {
            points: Vec::with_capacity(num_items.min(MAX_NUM_ITEMS)),
            num_items,
        }
    }

    /// Add a point to the index, returning its insertion index.
    ///
    /// The id can be any integral value that fits in an `i64`. Fractional ids are rejected
    /// rather than truncated.
    pub fn add<I: ToPrimitive>(&mut self, x: f64, y: f64, id: I) -> Result<usize> {
        let integral = id.to_f64().is_some_and(|value| value.fract() == 0.0);
        match id.to_i64() {
            Some(id) if integral => self.add_point(Point::new(x, y, id)),
            _ => Err(KdTreeError::Construction(format!(
                "id of point {} is not an integer representable as i64",
                self.points.len()
            ))),
        }
    }

    /// Add a coordinate with the given id to the index.
    pub fn add_coord<I: ToPrimitive>(
        &mut self,
        coord: &impl CoordTrait<T = f64>,
        id: I,
    ) -> Result<usize> {
        self.add(coord.x(), coord.y(), id)
    }

    /// Add an existing [`Point`] to the index.
    pub fn add_point(&mut self, point: Point) -> Result<usize> {
        let index = self.points.len();
        if index >= self.num_items {
            return Err(KdTreeError::Construction(format!(
                "Added more than the expected {} items.",
                self.num_items
            )));
        }
        self.points.push(point);
        Ok(index)
    }

    /// Consume this builder, partitioning the points into a [`KdTree`] ready for queries.
    pub fn finish(self) -> Result<KdTree> {
        if self.points.len() != self.num_items {
            return Err(KdTreeError::Construction(format!(
                "Added {} items when expected {}.",
                self.points.len(),
                self.num_items
            )));
        }
        KdTree::build(&self.points)
    }
}

impl KdTree {
    /// Build a tree from a slice of points.
    ///
    /// The input order only matters for ties: among points with equal coordinates on a
    /// splitting axis, the one that appears first sorts first.
    pub fn build(points: &[Point]) -> Result<Self> {
        let num_items = points.len();
        if num_items > MAX_NUM_ITEMS {
            return Err(KdTreeError::Construction(format!(
                "Cannot index {} points, at most {} are supported.",
                num_items, MAX_NUM_ITEMS
            )));
        }

        let mut entries: Vec<Entry> = points
            .iter()
            .enumerate()
            .map(|(seq, point)| Entry {
                point: *point,
                seq,
                slot: 0,
            })
            .collect();

        partition(&mut entries, 0, 0);

        let capacity = compute_capacity(num_items).ok_or_else(|| {
            KdTreeError::Construction(format!(
                "Cannot allocate node slots for {} points.",
                num_items
            ))
        })?;
        let mut nodes = vec![Node::Empty; capacity];
        for entry in entries {
            debug_assert!(nodes[entry.slot].is_empty());
            nodes[entry.slot] = Node::Occupied(entry.point);
        }

        debug!("built kd-tree with {} points in {} slots", num_items, capacity);
        Ok(Self::new_unchecked(nodes, num_items))
    }

    /// Build a tree from an interleaved slice of `[x, y, id, x, y, id, ...]`.
    ///
    /// Each id must be a finite, integral value representable as an `i64`.
    pub fn from_interleaved(data: &[f64]) -> Result<Self> {
        if data.len() % 3 != 0 {
            return Err(KdTreeError::Construction(format!(
                "Interleaved data of length {} is not a multiple of 3.",
                data.len()
            )));
        }

        let points = data
            .chunks_exact(3)
            .enumerate()
            .map(|(i, chunk)| {
                let id = chunk[2];
                match id.to_i64() {
                    Some(id_int) if id.fract() == 0.0 => {
                        Ok(Point::new(chunk[0], chunk[1], id_int))
                    }
                    _ => Err(KdTreeError::Construction(format!(
                        "id {} of point {} is not an integer",
                        id, i
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Self::build(&points)
    }
}

/// A point being partitioned, with its input position and destination slot.
#[derive(Debug, Clone, Copy)]
struct Entry {
    point: Point,
    seq: usize,
    slot: usize,
}

/// Total order along `axis`: coordinate first, then input position.
#[inline]
fn cmp_key(a: &Entry, b: &Entry, axis: usize) -> Ordering {
    a.point
        .coord(axis)
        .total_cmp(&b.point.coord(axis))
        .then(a.seq.cmp(&b.seq))
}

/// Recursively assign every entry of `items` to a slot of the subtree rooted at `index`.
///
/// The median along the depth's axis takes `index`; the elements before and after it form the
/// left and right subtrees. These are disjoint sub-slices, so they can be handled in parallel.
fn partition(items: &mut [Entry], depth: u32, index: usize) {
    if items.is_empty() {
        return;
    }

    let axis = (depth % 2) as usize;
    debug_assert_eq!(axis, util::axis(index));

    // middle index
    let m = items.len() >> 1;
    let right = items.len() - 1;
    select(items, m, 0, right, axis);
    items[m].slot = index;

    let (left_items, rest) = items.split_at_mut(m);
    let right_items = &mut rest[1..];

    #[cfg(feature = "rayon")]
    if left_items.len() >= PARALLEL_THRESHOLD {
        rayon::join(
            || partition(left_items, depth + 1, left_child(index)),
            || partition(right_items, depth + 1, right_child(index)),
        );
        return;
    }

    partition(left_items, depth + 1, left_child(index));
    partition(right_items, depth + 1, right_child(index));
}

/// Custom Floyd-Rivest selection algorithm: reorder `items` so that [left..k-1] items are
/// smaller than the k-th item and [k+1..right] items are larger (on either x or y axis)
fn select(items: &mut [Entry], k: usize, mut left: usize, mut right: usize, axis: usize) {
    while right > left {
        if right - left > 600 {
            let n = (right - left + 1) as f64;
            let m = (k - left + 1) as f64;
            let z = f64::ln(n);
            let s = 0.5 * f64::exp((2.0 * z) / 3.0);
            let sd = 0.5
                * f64::sqrt((z * s * (n - s)) / n)
                * (if m - n / 2.0 < 0.0 { -1.0 } else { 1.0 });
            let new_left = cmp::max(left, f64::floor(k as f64 - (m * s) / n + sd) as usize);
            let new_right = cmp::min(
                right,
                f64::floor(k as f64 + ((n - m) * s) / n + sd) as usize,
            );
            select(items, k, new_left, new_right, axis);
        }

        let t = items[k];
        let mut i = left;
        let mut j = right;

        items.swap(left, k);
        if cmp_key(&items[right], &t, axis) == Ordering::Greater {
            items.swap(left, right);
        }

        while i < j {
            items.swap(i, j);
            i += 1;
            j -= 1;
            while cmp_key(&items[i], &t, axis) == Ordering::Less {
                i += 1;
            }
            while cmp_key(&items[j], &t, axis) == Ordering::Greater {
                j -= 1;
            }
        }

        if cmp_key(&items[left], &t, axis) == Ordering::Equal {
            items.swap(left, j);
        } else {
            j += 1;
            items.swap(j, right);
        }

        match k.cmp(&j) {
            Ordering::Equal => return,
            Ordering::Less => right = j - 1,
            Ordering::Greater => left = j + 1,
        }
    }
}
