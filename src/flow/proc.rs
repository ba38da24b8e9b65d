//! Discovered procedures, their entry kinds, and the call/spawn
//! cross-references between them.

use std::fmt;

use bitflags::bitflags;

use crate::{commands::Commands, flow::BlockId, flow::BlockList, instruction::Arg};

/// A strongly-typed index of a procedure within a
/// [`BlockList`](super::BlockList).
///
/// Procedure ids are positions in the procedure vector, assigned in
/// discovery order (main first, then missions, then procedures found by
/// call/spawn linking), and stay stable for the lifetime of the list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(pub(crate) usize);

impl ProcId {
    /// Creates a procedure id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        ProcId(index)
    }

    /// Returns the raw index of this procedure id.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcId({})", self.0)
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc {}", self.0)
    }
}

bitflags! {
    /// The ways a procedure is entered.
    ///
    /// A procedure may be entered more than one way (a subroutine that is
    /// also spawned as a script), so this is a flag set rather than an
    /// enum.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcKind: u8 {
        /// The main entry point.
        const MAIN = 0x01;
        /// Called with `GOSUB` or `GOSUB_FILE`.
        const GOSUB = 0x02;
        /// Spawned with `START_NEW_SCRIPT`.
        const SCRIPT = 0x04;
        /// Spawned with `LAUNCH_MISSION`.
        const SUBSCRIPT = 0x08;
        /// Spawned with `LOAD_AND_LAUNCH_MISSION`.
        const MISSION = 0x10;
    }
}

/// One cross-reference edge of the call graph or spawn graph: the block
/// whose final instruction makes the call or spawn, and the procedure on
/// the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcXref {
    /// The block containing the call/spawn instruction.
    pub block: BlockId,
    /// The procedure on the other end of the edge.
    pub proc: ProcId,
}

/// A discovered procedure: a code region entered by call or spawn and left
/// by return or terminator.
///
/// The entry block is the first block of a region that is not reachable by
/// intra-segment fallthrough from another procedure: block 0 of its
/// segment, or a block targeted by a call or spawn. The exit block is the
/// segment's exit sentinel and is populated by edge linking.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub(crate) kind: ProcKind,
    pub(crate) entry_block: BlockId,
    pub(crate) exit_block: Option<BlockId>,
    pub(crate) calls_into: Vec<ProcXref>,
    pub(crate) called_from: Vec<ProcXref>,
    pub(crate) spawns_script: Vec<ProcXref>,
    pub(crate) spawned_from: Vec<ProcXref>,
}

impl ProcEntry {
    pub(crate) fn new(kind: ProcKind, entry_block: BlockId) -> Self {
        ProcEntry {
            kind,
            entry_block,
            exit_block: None,
            calls_into: Vec::new(),
            called_from: Vec::new(),
            spawns_script: Vec::new(),
            spawned_from: Vec::new(),
        }
    }

    /// Returns the entry-kind flags of this procedure.
    #[must_use]
    pub const fn kind(&self) -> ProcKind {
        self.kind
    }

    /// Returns the procedure's entry block.
    #[must_use]
    pub const fn entry_block(&self) -> BlockId {
        self.entry_block
    }

    /// Returns the procedure's exit sentinel, once edge linking has
    /// assigned it.
    #[must_use]
    pub const fn exit_block(&self) -> Option<BlockId> {
        self.exit_block
    }

    /// Returns the procedures this one calls, one xref per call site.
    #[must_use]
    pub fn calls_into(&self) -> &[ProcXref] {
        &self.calls_into
    }

    /// Returns the procedures calling this one, one xref per call site.
    #[must_use]
    pub fn called_from(&self) -> &[ProcXref] {
        &self.called_from
    }

    /// Returns the scripts this procedure spawns, one xref per spawn site.
    #[must_use]
    pub fn spawns_script(&self) -> &[ProcXref] {
        &self.spawns_script
    }

    /// Returns the procedures spawning this one, one xref per spawn site.
    #[must_use]
    pub fn spawned_from(&self) -> &[ProcXref] {
        &self.spawned_from
    }
}

impl BlockList<'_> {
    /// Extracts the thread name a procedure gives itself.
    ///
    /// Walks the entry block's instructions looking for the thread-naming
    /// command (`SCRIPT_NAME`) and returns its text operand. Returns `None`
    /// when the procedure never names itself.
    #[must_use]
    pub fn script_name(&self, commands: &dyn Commands, proc: ProcId) -> Option<String> {
        self.script_name_at(commands, self.proc(proc).entry_block())
    }

    /// Extracts a thread name starting the search at an arbitrary block.
    #[must_use]
    pub fn script_name_at(&self, commands: &dyn Commands, block: BlockId) -> Option<String> {
        for instruction in self.instructions(block) {
            let Some(command) = instruction.command() else {
                continue;
            };
            if commands.is_script_name(command.opcode()) {
                return command.args.iter().find_map(Arg::as_text);
            }
        }
        None
    }
}
