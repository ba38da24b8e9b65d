//! Shared unit-test fixtures.
//!
//! The graph-level passes (dominators, loops, structuring, traversal) are
//! unit-tested over hand-assembled block lists rather than full instruction
//! streams; the builders here keep those tests short. End-to-end coverage
//! over real instruction streams lives in the `tests/` directory.

use rustc_hash::FxHashMap;

use crate::{
    flow::{Block, BlockId, BlockList, ProcEntry, ProcKind},
    segment::{ScriptImage, SegmentKind, SegmentRef},
};

/// An image with no segments, for block lists assembled by hand.
pub(crate) fn empty_image() -> ScriptImage {
    ScriptImage::default()
}

/// Assembles a block list of `real` zero-length main-segment blocks plus
/// one exit sentinel (id `real`), with the given edges already linked and
/// a single `MAIN` procedure entered at block 0.
///
/// Edges may reference the sentinel id to model returns.
pub(crate) fn synthetic_list<'a>(
    image: &'a ScriptImage,
    real: usize,
    edges: &[(usize, usize)],
) -> BlockList<'a> {
    let mut blocks: Vec<Block> = (0..real)
        .map(|_| Block::new(SegmentRef::new(SegmentKind::Main, 0, 0), 0))
        .collect();
    let sentinel = BlockId::new(real);
    blocks.push(Block::new(SegmentRef::new(SegmentKind::ExitNode, 0, 0), 0));

    for &(from, to) in edges {
        blocks[from].succ.push(BlockId::new(to));
        blocks[to].pred.push(BlockId::new(from));
    }

    let mut proc = ProcEntry::new(ProcKind::MAIN, BlockId::new(0));
    proc.exit_block = Some(sentinel);

    let mut exit_nodes = FxHashMap::default();
    exit_nodes.insert((SegmentKind::Main, 0), sentinel);

    BlockList {
        image,
        blocks,
        procs: vec![proc],
        non_dummy_blocks: 0..real,
        main_blocks: 0..real,
        mission_blocks: Vec::new(),
        streamed_blocks: Vec::new(),
        exit_nodes,
    }
}
