//! Edge linking: intra-segment control-flow edges, then the call and spawn
//! graphs across procedures.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::{
    commands::{Commands, FlowKind},
    error::Error,
    flow::{
        traversal::{depth_first_blocks, Direction},
        BlockId, BlockList, ProcId, ProcKind,
    },
    segment::SegmentRef,
    Result,
};

/// What the final instruction of a block means for its outgoing edges.
enum LastKind {
    /// Fall through to the next block of the segment, if any.
    Fallthrough,
    /// Unconditional branch to a label.
    Branch(i32),
    /// Conditional branch to a label; the other path falls through.
    Conditional(i32),
    /// Call or spawn; control continues at the fallthrough, cross-procedure
    /// edges are linked separately.
    CallLike,
    /// Return or terminator; the only successor is the exit sentinel.
    Exit,
}

/// A call or spawn site found while scanning a procedure's blocks.
enum SiteKind {
    /// `GOSUB`-style call to a label.
    Call(i32),
    /// Label-targeted spawn with the procedure kind it implies.
    SpawnLabel(ProcKind, i32),
    /// Mission spawn by mission id.
    SpawnMission(i32),
}

impl BlockList<'_> {
    /// Links the intra-segment control-flow edges of every block.
    ///
    /// Examines each real block's final instruction and adds the successor
    /// edges it implies, symmetrically into both adjacency lists:
    ///
    /// | final instruction | successors |
    /// |---|---|
    /// | unconditional branch | target block |
    /// | conditional branch | target block, then fallthrough |
    /// | return / terminator | exit sentinel only |
    /// | call / script spawn | fallthrough only |
    /// | anything else | fallthrough |
    ///
    /// Also assigns every procedure's exit block (its segment's sentinel).
    /// The pass clears all existing links first, so re-running it
    /// reproduces identical output.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOpcode`] for a command the oracle cannot classify
    /// - [`Error::UnresolvedLabel`] for a branch target that is not a block
    ///   start
    /// - [`Error::MalformedCommand`] for a conditional branch falling
    ///   through the end of its segment
    pub fn link_edges(&mut self, commands: &dyn Commands) -> Result<()> {
        for block in &mut self.blocks {
            block.pred.clear();
            block.succ.clear();
        }

        for index in self.non_dummy_blocks() {
            let id = BlockId::new(index);
            let (last, action) = self.classify_last(commands, id)?;

            match action {
                LastKind::Fallthrough | LastKind::CallLike => {
                    if let Some(next) = self.fallthrough_of(id) {
                        self.link(id, next);
                    }
                }
                LastKind::Branch(target) => {
                    let to = self.block_from_label(last, target)?;
                    self.link(id, to);
                }
                LastKind::Conditional(target) => {
                    let to = self.block_from_label(last, target)?;
                    let next = self.fallthrough_of(id).ok_or_else(|| {
                        malformed_command!(
                            last,
                            "conditional branch falls through the end of its segment"
                        )
                    })?;
                    self.link(id, to);
                    if next != to {
                        self.link(id, next);
                    }
                }
                LastKind::Exit => {
                    let begin = self.block(id).begin();
                    let exit = self.exit_node(begin.kind, begin.segment).ok_or_else(|| {
                        malformed_procedure!(begin, "segment has no exit sentinel")
                    })?;
                    self.link(id, exit);
                }
            }
        }

        for index in 0..self.procs.len() {
            let begin = self.blocks[self.procs[index].entry_block.index()].begin();
            self.procs[index].exit_block = self.exit_node(begin.kind, begin.segment);
        }

        Ok(())
    }

    /// Links the call graph and the spawn graph across procedures.
    ///
    /// Starting from the seeded procedures, walks each procedure's
    /// reachable blocks depth-first and scans their final instructions. A
    /// `GOSUB` resolves its label and finds or creates the callee procedure
    /// (`kind |= GOSUB`); the spawn commands do the same with `SCRIPT`,
    /// `SUBSCRIPT`, or `MISSION`. Every site is recorded symmetrically in
    /// both procedures' cross-reference lists, and newly created procedures
    /// are queued for scanning in turn.
    ///
    /// Calls and spawns go into two separate graphs: calls return to the
    /// caller, spawned scripts never do, and neither kind of edge
    /// participates in intra-procedure fallthrough or dominators.
    ///
    /// The pass clears all cross-reference lists first, so re-running it
    /// reproduces identical output.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOpcode`] for a command the oracle cannot classify
    /// - [`Error::UnresolvedLabel`] for a call/spawn target that is not a
    ///   block start
    /// - [`Error::UnresolvedMission`] for a mission spawn outside the image
    pub fn link_call_edges(&mut self, commands: &dyn Commands) -> Result<()> {
        for proc in &mut self.procs {
            proc.calls_into.clear();
            proc.called_from.clear();
            proc.spawns_script.clear();
            proc.spawned_from.clear();
        }

        let mut queue: VecDeque<ProcId> = (0..self.procs.len()).map(ProcId::new).collect();
        let mut scanned: FxHashSet<ProcId> = FxHashSet::default();

        while let Some(proc) = queue.pop_front() {
            if !scanned.insert(proc) {
                continue;
            }

            let entry = self.procs[proc.index()].entry_block;
            let mut members = Vec::new();
            depth_first_blocks(self, entry, Direction::Forward, |id| {
                members.push(id);
                true
            });

            for id in members {
                let Some((last, site)) = self.classify_site(commands, id)? else {
                    continue;
                };

                let peer = match site {
                    SiteKind::Call(target) => {
                        let callee_entry = self.block_from_label(last, target)?;
                        let callee = self.find_or_create_proc(callee_entry, ProcKind::GOSUB);
                        self.link_call(id, proc, callee);
                        callee
                    }
                    SiteKind::SpawnLabel(kind, target) => {
                        let spawned_entry = self.block_from_label(last, target)?;
                        let spawned = self.find_or_create_proc(spawned_entry, kind);
                        self.link_spawn(id, proc, spawned);
                        spawned
                    }
                    SiteKind::SpawnMission(mission) => {
                        let spawned_entry = self.block_from_mission(commands, last, mission)?;
                        let spawned = self.find_or_create_proc(spawned_entry, ProcKind::MISSION);
                        self.link_spawn(id, proc, spawned);
                        spawned
                    }
                };

                if !scanned.contains(&peer) {
                    queue.push_back(peer);
                }
            }
        }

        Ok(())
    }

    /// Returns the block immediately after `id` within the same segment.
    fn fallthrough_of(&self, id: BlockId) -> Option<BlockId> {
        let begin = self.block(id).begin();
        let range = self.segment_blocks(begin.kind, begin.segment)?;
        let next = id.index() + 1;
        (next < range.end).then(|| BlockId::new(next))
    }

    /// Classifies the final instruction of a block for edge linking.
    ///
    /// Returns the reference of that instruction and its edge action.
    fn classify_last(
        &self,
        commands: &dyn Commands,
        id: BlockId,
    ) -> Result<(SegmentRef, LastKind)> {
        let block = self.block(id);
        let last = block.begin().advanced(block.len().max(1) as u32 - 1);

        let Some(command) = self.instructions(id).last().and_then(|item| item.command()) else {
            return Ok((last, LastKind::Fallthrough));
        };

        let flow = commands
            .flow_kind(command.opcode())
            .ok_or(Error::UnknownOpcode {
                location: last,
                opcode: command.opcode(),
            })?;

        let action = match flow {
            FlowKind::Sequential => LastKind::Fallthrough,
            FlowKind::Branch => LastKind::Branch(commands.branch_target(command).ok_or_else(
                || malformed_command!(last, "control-flow command has no label operand"),
            )?),
            FlowKind::ConditionalBranch => {
                LastKind::Conditional(commands.branch_target(command).ok_or_else(|| {
                    malformed_command!(last, "control-flow command has no label operand")
                })?)
            }
            FlowKind::Call
            | FlowKind::SpawnScript
            | FlowKind::SpawnSubscript
            | FlowKind::SpawnMission => LastKind::CallLike,
            FlowKind::Return | FlowKind::Terminate => LastKind::Exit,
        };

        Ok((last, action))
    }

    /// Classifies the final instruction of a block as a call/spawn site,
    /// if it is one.
    fn classify_site(
        &self,
        commands: &dyn Commands,
        id: BlockId,
    ) -> Result<Option<(SegmentRef, SiteKind)>> {
        let block = self.block(id);
        let last = block.begin().advanced(block.len().max(1) as u32 - 1);

        let Some(command) = self.instructions(id).last().and_then(|item| item.command()) else {
            return Ok(None);
        };

        let flow = commands
            .flow_kind(command.opcode())
            .ok_or(Error::UnknownOpcode {
                location: last,
                opcode: command.opcode(),
            })?;

        let label_operand = || {
            commands
                .branch_target(command)
                .ok_or_else(|| malformed_command!(last, "control-flow command has no label operand"))
        };

        let site = match flow {
            FlowKind::Call => SiteKind::Call(label_operand()?),
            FlowKind::SpawnScript => SiteKind::SpawnLabel(ProcKind::SCRIPT, label_operand()?),
            FlowKind::SpawnSubscript => SiteKind::SpawnLabel(ProcKind::SUBSCRIPT, label_operand()?),
            FlowKind::SpawnMission => {
                SiteKind::SpawnMission(commands.mission_target(command).ok_or_else(|| {
                    malformed_command!(last, "mission spawn has no mission operand")
                })?)
            }
            _ => return Ok(None),
        };

        Ok(Some((last, site)))
    }
}
