//! Constants of the persisted kd-tree format.

/// Leading marker of a persisted kd-tree.
pub const KDTREE_MAGIC: [u8; 4] = *b"KdTr";

/// Revision of the persisted format.
pub const KDTREE_VERSION: u8 = 1;

/// magic (4) + version (1) + count (4) + capacity (4)
pub const KDTREE_HEADER_SIZE: usize = 13;

/// tag (1) + x (8) + y (8) + id (8)
pub const KDTREE_NODE_SIZE: usize = 25;

pub(crate) const NODE_TAG_EMPTY: u8 = 0;
pub(crate) const NODE_TAG_OCCUPIED: u8 = 1;
