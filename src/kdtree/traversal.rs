//! Utilities to traverse the KdTree structure.

use crate::kdtree::{KdTreeIndex, Node};
use crate::r#type::Point;
use crate::util::{axis, depth, left_child, right_child};

/// An occupied node in the KdTree.
#[derive(Debug)]
pub struct NodeRef<'a, T: KdTreeIndex> {
    /// The tree that this node is a reference onto
    tree: &'a T,

    /// Position of this node in the tree's node array
    index: usize,

    point: &'a Point,
}

// Derived Clone/Copy would require `T: Clone`.
impl<T: KdTreeIndex> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: KdTreeIndex> Copy for NodeRef<'_, T> {}

impl<'a, T: KdTreeIndex> NodeRef<'a, T> {
    fn new(tree: &'a T, index: usize) -> Option<Self> {
        match tree.nodes().get(index) {
            Some(Node::Occupied(point)) => Some(Self { tree, index, point }),
            _ => None,
        }
    }

    pub(crate) fn from_root(tree: &'a T) -> Option<Self> {
        Self::new(tree, 0)
    }

    /// Position of this node in the node array.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Depth of this node, with the root at depth 0.
    pub fn depth(&self) -> u32 {
        depth(self.index)
    }

    /// The axis that the children of this node are split over.
    /// 0 for x axis, 1 for y axis
    pub fn axis(&self) -> usize {
        axis(self.index)
    }

    /// The point stored at this node.
    pub fn point(&self) -> &'a Point {
        self.point
    }

    /// The coordinate of this node's point along its splitting axis.
    pub fn split_value(&self) -> f64 {
        self.point.coord(self.axis())
    }

    /// The child node holding points that are not greater on this node's axis, if any.
    pub fn left_child(&self) -> Option<NodeRef<'a, T>> {
        Self::new(self.tree, left_child(self.index))
    }

    /// The child node holding points that are not smaller on this node's axis, if any.
    pub fn right_child(&self) -> Option<NodeRef<'a, T>> {
        Self::new(self.tree, right_child(self.index))
    }

    /// Returns `true` if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.left_child().is_none() && self.right_child().is_none()
    }

    /// Returns `true` if this node has at least one child.
    pub fn is_parent(&self) -> bool {
        !self.is_leaf()
    }
}
