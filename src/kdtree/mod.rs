//! An implementation of an immutable, pointer-free 2D K-D Tree.
//!
//! Points are stored in a flat array in implicit binary layout: the node at index `i` splits on
//! the x axis at even depths and the y axis at odd depths, and its children live at `2i + 1` and
//! `2i + 2`.

#![warn(missing_docs)]

mod builder;
pub mod constants;
mod index;
mod persist;
mod r#trait;
mod traversal;

pub use builder::KdTreeBuilder;
pub use index::{KdTree, Node};
pub use r#trait::KdTreeIndex;
pub use traversal::NodeRef;
