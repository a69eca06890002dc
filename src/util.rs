//! Index arithmetic for the implicit binary tree layout.

/// Calculate the total number of node slots to allocate for a tree holding `num_items` points.
///
/// A median split puts `len / 2` items on the left and `len - len / 2 - 1` on the right, so the
/// tree height is the bit length of `num_items` and every slot of a perfect tree of that height
/// is addressable.
///
/// Returns `None` if the slot count does not fit in a `usize`.
pub(crate) fn compute_capacity(num_items: usize) -> Option<usize> {
    1usize
        .checked_shl(tree_height(num_items))
        .map(|slots| slots - 1)
}

/// The number of levels in a tree of `num_items` points, i.e. `ceil(log2(num_items + 1))`.
#[inline]
pub(crate) fn tree_height(num_items: usize) -> u32 {
    usize::BITS - num_items.leading_zeros()
}

/// Depth of the slot at `index`, with the root at depth 0.
#[inline]
pub(crate) fn depth(index: usize) -> u32 {
    (index + 1).ilog2()
}

/// The splitting axis of the slot at `index`: 0 for x, 1 for y.
#[inline]
pub(crate) fn axis(index: usize) -> usize {
    (depth(index) % 2) as usize
}

#[inline]
pub(crate) fn left_child(index: usize) -> usize {
    2 * index + 1
}

#[inline]
pub(crate) fn right_child(index: usize) -> usize {
    2 * index + 2
}
