//! Binary persistence of a [`KdTree`].
//!
//! The layout is a 13 byte header followed by one fixed size record per slot of the node array,
//! all integers little-endian:
//!
//! | field    | size | notes                                  |
//! |----------|------|----------------------------------------|
//! | magic    | 4    | `KdTr`                                 |
//! | version  | 1    | [`KDTREE_VERSION`]                     |
//! | count    | 4    | `u32`, number of occupied slots        |
//! | capacity | 4    | `u32`, number of slots                 |
//! | node     | 25   | tag `u8`, x `f64`, y `f64`, id `i64`   |
//!
//! Empty slots are written with tag 0 and a zeroed payload.

use std::io::{BufWriter, ErrorKind, Read, Write};

use bytemuck::{bytes_of, cast_slice_mut, Pod, Zeroable};
use log::debug;

use crate::error::{KdTreeError, Result};
use crate::kdtree::constants::{
    KDTREE_HEADER_SIZE, KDTREE_MAGIC, KDTREE_NODE_SIZE, KDTREE_VERSION, NODE_TAG_EMPTY,
    NODE_TAG_OCCUPIED,
};
use crate::kdtree::{KdTree, Node};
use crate::r#type::Point;
use crate::util::compute_capacity;

/// Number of node records decoded per read.
const READ_CHUNK_NODES: usize = 4096;

/// On-disk representation of one slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawNode {
    tag: u8,
    x: [u8; 8],
    y: [u8; 8],
    id: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<RawNode>() == KDTREE_NODE_SIZE);

impl From<&Node> for RawNode {
    fn from(node: &Node) -> Self {
        match node {
            Node::Empty => RawNode::zeroed(),
            Node::Occupied(point) => RawNode {
                tag: NODE_TAG_OCCUPIED,
                x: point.x.to_le_bytes(),
                y: point.y.to_le_bytes(),
                id: point.id.to_le_bytes(),
            },
        }
    }
}

impl TryFrom<&RawNode> for Node {
    type Error = KdTreeError;

    fn try_from(raw: &RawNode) -> Result<Self> {
        match raw.tag {
            NODE_TAG_EMPTY => Ok(Node::Empty),
            NODE_TAG_OCCUPIED => Ok(Node::Occupied(Point::new(
                f64::from_le_bytes(raw.x),
                f64::from_le_bytes(raw.y),
                i64::from_le_bytes(raw.id),
            ))),
            tag => Err(KdTreeError::InvalidData(format!("unknown node tag {}", tag))),
        }
    }
}

impl KdTree {
    /// Write the tree to `writer` so it can be restored later with [`KdTree::load`] without
    /// paying the construction cost again.
    ///
    /// The output is buffered internally and flushed before returning.
    ///
    /// ```
    /// use geo_kdtree::kdtree::{KdTree, KdTreeIndex};
    /// use geo_kdtree::Point;
    ///
    /// let tree = KdTree::build(&[
    ///     Point::new(47.6, -122.3, 1),
    ///     Point::new(45.5, -122.8, 2),
    ///     Point::new(40.7, -74.0, 3),
    /// ])
    /// .unwrap();
    ///
    /// let mut buf = vec![];
    /// tree.persist(&mut buf).unwrap();
    /// let restored = KdTree::load(buf.as_slice()).unwrap();
    /// assert_eq!(restored.nearest(42.4, -71.1), Some(3));
    /// ```
    pub fn persist<W: Write>(&self, writer: W) -> Result<()> {
        let count = header_u32(self.num_items, "count")?;
        let capacity = header_u32(self.nodes.len(), "capacity")?;

        let mut writer = BufWriter::new(writer);
        writer.write_all(&KDTREE_MAGIC)?;
        writer.write_all(&[KDTREE_VERSION])?;
        writer.write_all(&count.to_le_bytes())?;
        writer.write_all(&capacity.to_le_bytes())?;
        for node in &self.nodes {
            writer.write_all(bytes_of(&RawNode::from(node)))?;
        }
        writer.flush()?;

        debug!(
            "persisted kd-tree with {} points ({} bytes)",
            self.num_items,
            self.byte_length()
        );
        Ok(())
    }

    /// Read a tree previously written with [`KdTree::persist`].
    ///
    /// The header is validated before any node record is read. Reading stops at the last node
    /// record, so any data following the tree stays in `reader`. For unbuffered sources such as
    /// a [`File`][std::fs::File], wrap the reader in a [`BufReader`][std::io::BufReader].
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        read_magic(&mut reader)?;

        let [version] = read_field::<_, 1>(&mut reader, "version")?;
        if version != KDTREE_VERSION {
            return Err(KdTreeError::UnsupportedVersion {
                found: version,
                expected: KDTREE_VERSION,
            });
        }

        let num_items = u32::from_le_bytes(read_field(&mut reader, "count")?) as usize;
        let capacity = u32::from_le_bytes(read_field(&mut reader, "capacity")?) as usize;
        if compute_capacity(num_items) != Some(capacity) {
            return Err(KdTreeError::InvalidData(format!(
                "capacity {} does not match {} points",
                capacity, num_items
            )));
        }

        // Grow with the data actually read rather than trusting the header up front.
        let mut nodes: Vec<Node> = Vec::with_capacity(capacity.min(READ_CHUNK_NODES));
        let mut chunk = vec![RawNode::zeroed(); capacity.min(READ_CHUNK_NODES)];
        let mut occupied = 0;
        while nodes.len() < capacity {
            let len = (capacity - nodes.len()).min(READ_CHUNK_NODES);
            let raw_nodes = &mut chunk[..len];
            reader
                .read_exact(cast_slice_mut(raw_nodes))
                .map_err(|err| KdTreeError::from_read(err, "node record"))?;

            for raw in raw_nodes.iter() {
                let node = Node::try_from(raw)?;
                let index = nodes.len();
                if !node.is_empty() {
                    if index > 0 && nodes[(index - 1) / 2].is_empty() {
                        return Err(KdTreeError::InvalidData(format!(
                            "occupied node {} has an empty parent",
                            index
                        )));
                    }
                    occupied += 1;
                }
                nodes.push(node);
            }
        }

        if occupied != num_items {
            return Err(KdTreeError::InvalidData(format!(
                "found {} occupied nodes when expected {}",
                occupied, num_items
            )));
        }

        debug!("loaded kd-tree with {} points in {} slots", num_items, capacity);
        Ok(Self::new_unchecked(nodes, num_items))
    }

    /// Serialize the tree into a new buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.byte_length());
        self.persist(&mut buf)?;
        Ok(buf)
    }

    /// Restore a tree from a buffer holding exactly one persisted tree.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut remaining = data;
        let tree = Self::load(&mut remaining)?;
        if !remaining.is_empty() {
            return Err(KdTreeError::InvalidData(format!(
                "{} trailing bytes after kdtree data",
                remaining.len()
            )));
        }
        Ok(tree)
    }

    /// The number of bytes [`KdTree::persist`] writes for this tree.
    pub fn byte_length(&self) -> usize {
        KDTREE_HEADER_SIZE + self.nodes.len() * KDTREE_NODE_SIZE
    }
}

fn header_u32(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        KdTreeError::InvalidData(format!("{} {} does not fit in the header", field, value))
    })
}

/// Check the leading magic number.
///
/// A stream whose first bytes differ from the magic is rejected as [`KdTreeError::BadMagic`]
/// even when it is shorter than the magic itself; a stream that is a strict prefix of the magic
/// is a truncation.
fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }

    if magic[..filled] != KDTREE_MAGIC[..filled] {
        return Err(KdTreeError::BadMagic);
    }
    if filled < magic.len() {
        return Err(KdTreeError::UnexpectedEof { field: "magic" });
    }
    Ok(())
}

fn read_field<R: Read, const SIZE: usize>(
    reader: &mut R,
    field: &'static str,
) -> Result<[u8; SIZE]> {
    let mut buf = [0u8; SIZE];
    reader
        .read_exact(&mut buf)
        .map_err(|err| KdTreeError::from_read(err, field))?;
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kdtree::KdTreeIndex;

    fn small_tree() -> KdTree {
        KdTree::build(&[
            Point::new(0., 0., 10),
            Point::new(1., 1., 11),
            Point::new(-2., 3., 12),
            Point::new(4., -1., 13),
            Point::new(0.5, 0.5, 14),
        ])
        .unwrap()
    }

    #[test]
    fn writes_documented_layout() {
        let tree = small_tree();
        let buf = tree.to_bytes().unwrap();

        assert_eq!(tree.capacity(), 7);
        assert_eq!(buf.len(), KDTREE_HEADER_SIZE + 7 * KDTREE_NODE_SIZE);
        assert_eq!(buf.len(), tree.byte_length());
        assert_eq!(&buf[0..4], b"KdTr");
        assert_eq!(buf[4], KDTREE_VERSION);
        assert_eq!(&buf[5..9], &5u32.to_le_bytes());
        assert_eq!(&buf[9..13], &7u32.to_le_bytes());

        for (i, node) in tree.nodes().iter().enumerate() {
            let start = KDTREE_HEADER_SIZE + i * KDTREE_NODE_SIZE;
            let record = &buf[start..start + KDTREE_NODE_SIZE];
            match node {
                Node::Empty => assert!(record.iter().all(|b| *b == 0)),
                Node::Occupied(point) => {
                    assert_eq!(record[0], NODE_TAG_OCCUPIED);
                    assert_eq!(&record[1..9], &point.x.to_le_bytes());
                    assert_eq!(&record[9..17], &point.y.to_le_bytes());
                    assert_eq!(&record[17..25], &point.id.to_le_bytes());
                }
            }
        }
    }

    #[test]
    fn round_trips_node_array() {
        let tree = small_tree();
        let restored = KdTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn round_trips_empty_tree() {
        let tree = KdTree::build(&[]).unwrap();
        let buf = tree.to_bytes().unwrap();
        assert_eq!(buf.len(), KDTREE_HEADER_SIZE);

        let restored = KdTree::from_bytes(&buf).unwrap();
        assert_eq!(restored.num_items(), 0);
        assert_eq!(restored.capacity(), 0);
        assert_eq!(restored.nearest(0., 0.), None);
        assert!(restored.nearest_k(0., 0., 5).is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        for data in [
            &b"That ain't right\n"[..],
            &b"X"[..],
            &b"KdTx"[..],
            &b"kdtr\x01\x00\x00\x00\x00\x00\x00\x00\x00"[..],
        ] {
            assert!(
                matches!(KdTree::from_bytes(data), Err(KdTreeError::BadMagic)),
                "{:?}",
                data
            );
        }
    }

    #[test]
    fn rejects_every_truncation() {
        let buf = small_tree().to_bytes().unwrap();
        for len in 0..buf.len() {
            let result = KdTree::from_bytes(&buf[..len]);
            assert!(
                matches!(result, Err(KdTreeError::UnexpectedEof { .. })),
                "truncated to {} bytes: {:?}",
                len,
                result
            );
        }
    }

    #[test]
    fn truncation_names_the_field() {
        let buf = small_tree().to_bytes().unwrap();
        let field = |len: usize| match KdTree::from_bytes(&buf[..len]) {
            Err(KdTreeError::UnexpectedEof { field }) => field,
            other => panic!("unexpected result {:?}", other),
        };
        assert_eq!(field(2), "magic");
        assert_eq!(field(4), "version");
        assert_eq!(field(7), "count");
        assert_eq!(field(10), "capacity");
        assert_eq!(field(KDTREE_HEADER_SIZE + 30), "node record");
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut buf = small_tree().to_bytes().unwrap();
        buf[4] = KDTREE_VERSION + 1;
        assert!(matches!(
            KdTree::from_bytes(&buf),
            Err(KdTreeError::UnsupportedVersion { found, expected })
                if found == KDTREE_VERSION + 1 && expected == KDTREE_VERSION
        ));
    }

    #[test]
    fn rejects_inconsistent_header() {
        let mut buf = small_tree().to_bytes().unwrap();
        buf[9..13].copy_from_slice(&15u32.to_le_bytes());
        assert!(matches!(
            KdTree::from_bytes(&buf),
            Err(KdTreeError::InvalidData(_))
        ));

        let mut buf = small_tree().to_bytes().unwrap();
        buf[5..9].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            KdTree::from_bytes(&buf),
            Err(KdTreeError::InvalidData(_))
        ));

        let mut buf = small_tree().to_bytes().unwrap();
        buf[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        buf[9..13].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            KdTree::from_bytes(&buf),
            Err(KdTreeError::InvalidData(_))
        ));
    }

    #[test]
    fn rejects_bad_records() {
        let tree = small_tree();
        let buf = tree.to_bytes().unwrap();

        let mut bad_tag = buf.clone();
        bad_tag[KDTREE_HEADER_SIZE] = 7;
        assert!(matches!(
            KdTree::from_bytes(&bad_tag),
            Err(KdTreeError::InvalidData(_))
        ));

        // Move the root record into an empty slot: the count still matches but the root's
        // children now hang below an empty node.
        let empty = tree.nodes().iter().position(Node::is_empty).unwrap();
        let mut orphan = buf.clone();
        let empty_start = KDTREE_HEADER_SIZE + empty * KDTREE_NODE_SIZE;
        let root_start = KDTREE_HEADER_SIZE;
        orphan.copy_within(root_start..root_start + KDTREE_NODE_SIZE, empty_start);
        orphan[root_start..root_start + KDTREE_NODE_SIZE].fill(0);
        assert!(matches!(
            KdTree::from_bytes(&orphan),
            Err(KdTreeError::InvalidData(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes_but_load_leaves_them() {
        let tree = small_tree();
        let mut buf = tree.to_bytes().unwrap();
        buf.extend_from_slice(b"tail");

        assert!(matches!(
            KdTree::from_bytes(&buf),
            Err(KdTreeError::InvalidData(_))
        ));

        let mut reader = buf.as_slice();
        let restored = KdTree::load(&mut reader).unwrap();
        assert_eq!(restored, tree);
        assert_eq!(reader, b"tail");
    }
}
