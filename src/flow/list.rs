//! Global block and procedure storage.

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::{
    commands::Commands,
    error::Error,
    flow::{Block, BlockId, ProcEntry, ProcId, ProcKind, ProcXref},
    instruction::Instruction,
    segment::{ScriptImage, SegmentKind, SegmentRef},
    Result,
};

/// The block list: every basic block of every segment, the procedures
/// discovered in them, and the cross-references between those procedures.
///
/// Blocks live in one global vector; [`BlockId`]s are indices into it. The
/// vector is arranged so that, per segment, the real blocks form a
/// contiguous range sorted by begin reference; the dummy exit-sentinel
/// blocks are appended at the end and are unsorted. The sorted ranges are
/// exposed through [`main_blocks`](Self::main_blocks),
/// [`mission_blocks`](Self::mission_blocks), and
/// [`non_dummy_blocks`](Self::non_dummy_blocks).
///
/// The list borrows the [`ScriptImage`] it was built over; block begin
/// references index into the image's instruction vectors.
///
/// # Construction
///
/// Built by [`BlockList::build`] and then enriched in place by
/// [`link_edges`](Self::link_edges),
/// [`link_call_edges`](Self::link_call_edges), and
/// [`compute_dominators`](Self::compute_dominators), in that order.
#[derive(Debug)]
pub struct BlockList<'a> {
    pub(crate) image: &'a ScriptImage,
    pub(crate) blocks: Vec<Block>,
    pub(crate) procs: Vec<ProcEntry>,
    pub(crate) non_dummy_blocks: Range<usize>,
    pub(crate) main_blocks: Range<usize>,
    pub(crate) mission_blocks: Vec<Range<usize>>,
    pub(crate) streamed_blocks: Vec<Range<usize>>,
    pub(crate) exit_nodes: FxHashMap<(SegmentKind, u16), BlockId>,
}

impl<'a> BlockList<'a> {
    /// Returns the image this list was built over.
    #[must_use]
    pub fn image(&self) -> &'a ScriptImage {
        self.image
    }

    /// Returns a block by id.
    ///
    /// # Panics
    ///
    /// Panics if the id is out of bounds.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Returns every block, real blocks first, sentinels last.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the total number of blocks, sentinels included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns a procedure by id.
    ///
    /// # Panics
    ///
    /// Panics if the id is out of bounds.
    #[must_use]
    pub fn proc(&self, id: ProcId) -> &ProcEntry {
        &self.procs[id.index()]
    }

    /// Returns every discovered procedure, in discovery order.
    #[must_use]
    pub fn procs(&self) -> &[ProcEntry] {
        &self.procs
    }

    /// Returns the number of discovered procedures.
    #[must_use]
    pub fn proc_count(&self) -> usize {
        self.procs.len()
    }

    /// Finds the procedure whose entry block is `entry`.
    #[must_use]
    pub fn find_proc_by_entry(&self, entry: BlockId) -> Option<ProcId> {
        self.procs
            .iter()
            .position(|proc| proc.entry_block == entry)
            .map(ProcId::new)
    }

    /// Returns the id range of every real (non-sentinel) block.
    ///
    /// Per segment, the blocks in this range are sorted by begin reference.
    #[must_use]
    pub fn non_dummy_blocks(&self) -> Range<usize> {
        self.non_dummy_blocks.clone()
    }

    /// Returns the id range of the main segment's blocks, sorted by begin.
    #[must_use]
    pub fn main_blocks(&self) -> Range<usize> {
        self.main_blocks.clone()
    }

    /// Returns the id range of one mission segment's blocks, sorted by
    /// begin.
    #[must_use]
    pub fn mission_blocks(&self, mission: usize) -> Option<Range<usize>> {
        self.mission_blocks.get(mission).cloned()
    }

    /// Returns the id range of the blocks of any segment.
    #[must_use]
    pub fn segment_blocks(&self, kind: SegmentKind, segment: u16) -> Option<Range<usize>> {
        match kind {
            SegmentKind::Main => (segment == 0).then(|| self.main_blocks.clone()),
            SegmentKind::Mission => self.mission_blocks.get(segment as usize).cloned(),
            SegmentKind::Streamed => self.streamed_blocks.get(segment as usize).cloned(),
            SegmentKind::ExitNode => None,
        }
    }

    /// Returns the exit-sentinel block of a segment.
    #[must_use]
    pub fn exit_node(&self, kind: SegmentKind, segment: u16) -> Option<BlockId> {
        self.exit_nodes.get(&(kind, segment)).copied()
    }

    /// Returns the instructions a block spans. Empty for exit sentinels.
    #[must_use]
    pub fn instructions(&self, id: BlockId) -> &'a [Instruction] {
        let block = &self.blocks[id.index()];
        let begin = block.begin();
        match self.image.segment(begin.kind, begin.segment) {
            Some(segment) => {
                let start = begin.data as usize;
                &segment.data()[start..start + block.len()]
            }
            None => &[],
        }
    }

    /// Resolves a label operand to the block starting at its target.
    ///
    /// `at` is the reference of the instruction carrying the operand;
    /// negative targets address the main segment (negated offset),
    /// non-negative targets the instruction's own segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedLabel`] when the target offset has no
    /// instruction or is not the start of a block.
    pub fn block_from_label(&self, at: SegmentRef, target: i32) -> Result<BlockId> {
        let unresolved = || Error::UnresolvedLabel {
            location: at,
            target,
        };

        let (kind, segment, offset) = if target < 0 {
            (SegmentKind::Main, 0, (-i64::from(target)) as u32)
        } else {
            (at.kind, at.segment, target as u32)
        };

        let data_index = self
            .image
            .segment(kind, segment)
            .and_then(|seg| seg.data_index(offset))
            .ok_or_else(unresolved)?;

        self.block_at(kind, segment, data_index)
            .ok_or_else(unresolved)
    }

    /// Resolves a mission id to the mission's entry block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedMission`] when the oracle does not know
    /// the mission, or its segment decompiled to an empty stream.
    pub fn block_from_mission(
        &self,
        commands: &dyn Commands,
        at: SegmentRef,
        mission: i32,
    ) -> Result<BlockId> {
        let unresolved = || Error::UnresolvedMission {
            location: at,
            mission,
        };

        let segment = commands.mission_segment(mission).ok_or_else(unresolved)?;
        let range = self.mission_blocks.get(segment).ok_or_else(unresolved)?;
        if range.is_empty() {
            return Err(unresolved());
        }
        Ok(BlockId::new(range.start))
    }

    /// Finds the block beginning exactly at a segment data index.
    #[must_use]
    pub fn block_at(&self, kind: SegmentKind, segment: u16, data_index: usize) -> Option<BlockId> {
        let range = self.segment_blocks(kind, segment)?;
        let slice = &self.blocks[range.clone()];
        slice
            .binary_search_by_key(&(data_index as u32), |block| block.begin().data)
            .ok()
            .map(|position| BlockId::new(range.start + position))
    }

    /// Links `from -> to`, updating both adjacency lists.
    pub(crate) fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succ.push(to);
        self.blocks[to.index()].pred.push(from);
    }

    /// Records a call edge `caller -> callee` made from `block`, in both
    /// directions.
    pub(crate) fn link_call(&mut self, block: BlockId, caller: ProcId, callee: ProcId) {
        self.procs[caller.index()].calls_into.push(ProcXref {
            block,
            proc: callee,
        });
        self.procs[callee.index()].called_from.push(ProcXref {
            block,
            proc: caller,
        });
    }

    /// Records a spawn edge `spawner -> spawned` made from `block`, in both
    /// directions.
    pub(crate) fn link_spawn(&mut self, block: BlockId, spawner: ProcId, spawned: ProcId) {
        self.procs[spawner.index()].spawns_script.push(ProcXref {
            block,
            proc: spawned,
        });
        self.procs[spawned.index()].spawned_from.push(ProcXref {
            block,
            proc: spawner,
        });
    }

    /// Finds the procedure entered at `entry`, or creates one with the
    /// given kind. Either way the kind flags are or-ed in.
    pub(crate) fn find_or_create_proc(&mut self, entry: BlockId, kind: ProcKind) -> ProcId {
        if let Some(existing) = self.find_proc_by_entry(entry) {
            self.procs[existing.index()].kind |= kind;
            return existing;
        }

        let begin = self.blocks[entry.index()].begin();
        let mut proc = ProcEntry::new(kind, entry);
        proc.exit_block = self.exit_node(begin.kind, begin.segment);
        let id = ProcId::new(self.procs.len());
        self.procs.push(proc);
        id
    }
}
