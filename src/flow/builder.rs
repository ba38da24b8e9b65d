//! Block discovery: leaders, segment cutting, sentinels, and procedure
//! seeding.

use std::collections::BTreeSet;
use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::{
    commands::{Commands, FlowKind},
    error::Error,
    flow::{Block, BlockId, BlockList, ProcEntry, ProcKind},
    segment::{CodeSegment, ScriptImage, SegmentKind, SegmentRef},
    Result,
};

impl<'a> BlockList<'a> {
    /// Discovers the basic blocks of every segment of an image.
    ///
    /// Collects the leaders of each segment (its first instruction, every
    /// branch/call/spawn target, and every instruction following a command
    /// that ends a block), cuts the segments at those leaders into blocks
    /// sorted by begin reference, appends one zero-length exit-sentinel
    /// block per segment, and seeds the procedure entries: block 0 of the
    /// main segment as [`ProcKind::MAIN`] and block 0 of every mission
    /// segment as [`ProcKind::MISSION`]. Streamed segments are cut but seed
    /// no procedures; procedures in them arise from spawn edges.
    ///
    /// A label whose target lies in another segment cuts the target
    /// segment, not the current one; the edge it implies is discovered by
    /// call/spawn linking.
    ///
    /// # Arguments
    ///
    /// * `commands` - The command metadata oracle
    /// * `image` - The decompiled program image, borrowed for the list's
    ///   lifetime
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOpcode`] for a command the oracle cannot classify
    /// - [`Error::UnresolvedLabel`] for a branch target with no instruction
    /// - [`Error::UnresolvedMission`] for a mission spawn outside the image
    /// - [`Error::MalformedCommand`] for a control-flow command missing its
    ///   operand
    pub fn build(commands: &dyn Commands, image: &'a ScriptImage) -> Result<BlockList<'a>> {
        let segments: Vec<(SegmentKind, u16, &CodeSegment)> = image.segments().collect();

        let leaders = collect_leaders(commands, &segments)?;

        // Cut each segment at its leaders. Pushing segment by segment keeps
        // every per-segment range contiguous and sorted by begin.
        let mut blocks = Vec::new();
        let mut ranges: Vec<Range<usize>> = Vec::with_capacity(segments.len());
        for (ordinal, &(kind, index, segment)) in segments.iter().enumerate() {
            let first = blocks.len();
            let cuts: Vec<usize> = leaders[ordinal].iter().copied().collect();
            for (position, &begin) in cuts.iter().enumerate() {
                let end = cuts
                    .get(position + 1)
                    .copied()
                    .unwrap_or_else(|| segment.len());
                blocks.push(Block::new(
                    SegmentRef::new(kind, index, begin as u32),
                    end - begin,
                ));
            }
            ranges.push(first..blocks.len());
        }

        let non_dummy_blocks = 0..blocks.len();

        // Dummy exit sentinels, one per segment, appended after every real
        // block so SegmentKind::ExitNode sorts last.
        let mut exit_nodes = FxHashMap::default();
        for (ordinal, &(kind, index, _)) in segments.iter().enumerate() {
            let id = BlockId::new(blocks.len());
            blocks.push(Block::new(
                SegmentRef::new(SegmentKind::ExitNode, ordinal as u16, 0),
                0,
            ));
            exit_nodes.insert((kind, index), id);
        }

        let mission_count = image.missions().len();
        let main_blocks = ranges[0].clone();
        let mission_blocks = ranges[1..1 + mission_count].to_vec();
        let streamed_blocks = ranges[1 + mission_count..].to_vec();

        let mut procs = Vec::new();
        if !main_blocks.is_empty() {
            procs.push(ProcEntry::new(
                ProcKind::MAIN,
                BlockId::new(main_blocks.start),
            ));
        }
        for range in &mission_blocks {
            if !range.is_empty() {
                procs.push(ProcEntry::new(ProcKind::MISSION, BlockId::new(range.start)));
            }
        }

        Ok(BlockList {
            image,
            blocks,
            procs,
            non_dummy_blocks,
            main_blocks,
            mission_blocks,
            streamed_blocks,
            exit_nodes,
        })
    }
}

/// Collects the leader data indices of every segment.
fn collect_leaders(
    commands: &dyn Commands,
    segments: &[(SegmentKind, u16, &CodeSegment)],
) -> Result<Vec<BTreeSet<usize>>> {
    let mut leaders: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); segments.len()];

    for (ordinal, &(kind, index, segment)) in segments.iter().enumerate() {
        let data = segment.data();
        if data.is_empty() {
            continue;
        }
        leaders[ordinal].insert(0);

        for (position, instruction) in data.iter().enumerate() {
            let Some(command) = instruction.command() else {
                continue;
            };
            let location = SegmentRef::new(kind, index, position as u32);
            let flow = commands
                .flow_kind(command.opcode())
                .ok_or(Error::UnknownOpcode {
                    location,
                    opcode: command.opcode(),
                })?;

            match flow {
                FlowKind::Sequential => {}
                FlowKind::Branch
                | FlowKind::ConditionalBranch
                | FlowKind::Call
                | FlowKind::SpawnScript
                | FlowKind::SpawnSubscript => {
                    let target = commands.branch_target(command).ok_or_else(|| {
                        malformed_command!(location, "control-flow command has no label operand")
                    })?;
                    let (target_ordinal, target_index) =
                        resolve_label(segments, ordinal, location, target)?;
                    leaders[target_ordinal].insert(target_index);
                    if position + 1 < data.len() {
                        leaders[ordinal].insert(position + 1);
                    }
                }
                FlowKind::SpawnMission => {
                    let mission = commands.mission_target(command).ok_or_else(|| {
                        malformed_command!(location, "mission spawn has no mission operand")
                    })?;
                    let target_ordinal = commands
                        .mission_segment(mission)
                        .map(|segment| 1 + segment)
                        .filter(|&target| {
                            target < segments.len()
                                && matches!(segments[target].0, SegmentKind::Mission)
                        })
                        .ok_or(Error::UnresolvedMission { location, mission })?;
                    if !segments[target_ordinal].2.is_empty() {
                        leaders[target_ordinal].insert(0);
                    }
                    if position + 1 < data.len() {
                        leaders[ordinal].insert(position + 1);
                    }
                }
                FlowKind::Return | FlowKind::Terminate => {
                    if position + 1 < data.len() {
                        leaders[ordinal].insert(position + 1);
                    }
                }
            }
        }
    }

    Ok(leaders)
}

/// Resolves a label operand to `(segment ordinal, data index)`.
///
/// Negative targets address the main segment by negated offset;
/// non-negative targets address the current segment.
fn resolve_label(
    segments: &[(SegmentKind, u16, &CodeSegment)],
    current: usize,
    location: SegmentRef,
    target: i32,
) -> Result<(usize, usize)> {
    let (ordinal, offset) = if target < 0 {
        (0, (-i64::from(target)) as u32)
    } else {
        (current, target as u32)
    };

    segments[ordinal]
        .2
        .data_index(offset)
        .map(|index| (ordinal, index))
        .ok_or(Error::UnresolvedLabel { location, target })
}
