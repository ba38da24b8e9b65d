//! Basic blocks and their typed indices.

use std::fmt;

use crate::{segment::SegmentRef, utils::BitSet};

/// A strongly-typed index of a block within a [`BlockList`](super::BlockList).
///
/// Block ids are positions in the global block vector and stay stable for
/// the lifetime of the list (blocks are never compacted or reordered after
/// discovery).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a block id from a raw index.
    ///
    /// Primarily for tests and for iterating id ranges; analysis code
    /// receives ids from the discovery passes.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index of this block id.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}", self.0)
    }
}

/// One basic block: a maximal straight-line instruction run with a single
/// entry and a single exit.
///
/// A block spans `begin .. begin+len` contiguously within its segment.
/// Within one segment, block ranges are disjoint and together cover every
/// instruction of the segment. The dummy exit-sentinel blocks have zero
/// length and [`SegmentKind::ExitNode`](crate::SegmentKind::ExitNode)
/// begin references.
///
/// `pred`/`succ` are filled by edge linking; the dominator bitsets by
/// dominator computation. Both are empty until the respective pass runs.
#[derive(Debug, Clone)]
pub struct Block {
    begin: SegmentRef,
    length: usize,
    pub(crate) pred: Vec<BlockId>,
    pub(crate) succ: Vec<BlockId>,
    pub(crate) dominators: BitSet,
    pub(crate) post_dominators: BitSet,
}

impl Block {
    pub(crate) fn new(begin: SegmentRef, length: usize) -> Self {
        Block {
            begin,
            length,
            pred: Vec::new(),
            succ: Vec::new(),
            dominators: BitSet::new(0),
            post_dominators: BitSet::new(0),
        }
    }

    /// Returns the segment reference of the block's first instruction.
    #[must_use]
    pub const fn begin(&self) -> SegmentRef {
        self.begin
    }

    /// Returns the number of instructions in the block.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the block spans no instructions (exit sentinels).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns `true` if this is a dummy exit-sentinel block.
    #[must_use]
    pub const fn is_exit_node(&self) -> bool {
        self.begin.is_exit_node()
    }

    /// Returns the predecessor block ids, in link-insertion order.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.pred
    }

    /// Returns the successor block ids, in link-insertion order.
    ///
    /// For a conditional branch the branch target comes first, then the
    /// fallthrough; structuring relies on this order.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.succ
    }

    /// Returns `true` if `id` dominates this block.
    ///
    /// Always `false` before dominators are computed, and for blocks that
    /// are not part of any procedure.
    #[must_use]
    pub fn dominated_by(&self, id: BlockId) -> bool {
        id.index() < self.dominators.len() && self.dominators.contains(id.index())
    }

    /// Returns `true` if `id` post-dominates this block.
    ///
    /// Always `false` before dominators are computed, and for blocks that
    /// are not part of any procedure.
    #[must_use]
    pub fn post_dominated_by(&self, id: BlockId) -> bool {
        id.index() < self.post_dominators.len() && self.post_dominators.contains(id.index())
    }

    /// Returns the dominator set of this block as a bitset over block ids.
    #[must_use]
    pub fn dominators(&self) -> &BitSet {
        &self.dominators
    }

    /// Returns the post-dominator set of this block as a bitset over block
    /// ids.
    #[must_use]
    pub fn post_dominators(&self) -> &BitSet {
        &self.post_dominators
    }
}
