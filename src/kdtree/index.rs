use std::fmt;

use crate::r#type::Point;

/// A slot in the implicit binary tree.
///
/// The children of the slot at index `i` live at `2i + 1` and `2i + 2`. Empty slots only exist
/// to keep that addressing valid when the points don't fill the last level.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Node {
    /// A placeholder slot with no point
    #[default]
    Empty,
    /// A slot holding exactly one point
    Occupied(Point),
}

impl Node {
    /// The point stored in this slot, if any.
    #[inline]
    pub fn point(&self) -> Option<&Point> {
        match self {
            Node::Empty => None,
            Node::Occupied(point) => Some(point),
        }
    }

    /// Returns `true` if this slot holds no point.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }
}

/// An owned, immutable KdTree.
///
/// Usually this will be created from scratch via [`KdTreeBuilder`][crate::kdtree::KdTreeBuilder]
/// or [`KdTree::build`], or restored from a byte stream with [`KdTree::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct KdTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) num_items: usize,
}

impl KdTree {
    /// Wrap a node array whose layout has already been established.
    pub(crate) fn new_unchecked(nodes: Vec<Node>, num_items: usize) -> Self {
        debug_assert_eq!(
            nodes.iter().filter(|node| !node.is_empty()).count(),
            num_items
        );
        Self { nodes, num_items }
    }

    /// Consume the tree, returning its node array.
    pub fn into_inner(self) -> Vec<Node> {
        self.nodes
    }
}

impl fmt::Display for KdTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KdTree(nodes={}, capacity={})",
            self.num_items,
            self.nodes.len()
        )
    }
}
