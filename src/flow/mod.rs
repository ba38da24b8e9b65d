//! Control-flow analysis passes over the decompiled instruction streams.
//!
//! # Architecture
//!
//! Everything revolves around one [`BlockList`]: a global vector of basic
//! blocks spanning every code segment, plus the procedures discovered in
//! them. The list is built once and then enriched in place by a fixed
//! sequence of passes; later passes consume earlier outputs and never
//! mutate them after completion.
//!
//! | Pass | Entry point | Produces |
//! |---|---|---|
//! | Block discovery | [`BlockList::build`] | blocks, sorted ranges, seeded procedures, exit sentinels |
//! | Edge linking | [`BlockList::link_edges`] | intra-segment `pred`/`succ` links, procedure exit blocks |
//! | Call/spawn linking | [`BlockList::link_call_edges`] | call graph, spawn graph, gosub/script procedures |
//! | Dominators | [`BlockList::compute_dominators`] | dominator and post-dominator bitsets |
//! | Natural loops | [`BlockList::natural_loops`] | one [`Loop`] per back-edge |
//! | Structuring | [`Statements`] | the statement graph per procedure |
//!
//! [`analyze`] runs the block-level passes in order; [`structure_procedure`]
//! runs loop discovery and structuring for one procedure.
//!
//! # Determinism
//!
//! All passes are deterministic. Depth-first traversals visit successors in
//! insertion order, which is the order edge linking produces: the branch
//! target of a conditional first, then its fallthrough.

mod block;
mod builder;
mod dominators;
mod edges;
mod list;
mod loops;
mod proc;
mod statements;
mod traversal;

pub use block::{Block, BlockId};
pub use list::BlockList;
pub use loops::{sort_natural_loops, Loop};
pub use proc::{ProcEntry, ProcId, ProcKind, ProcXref};
pub use statements::{Statement, StatementKind, Statements, StmtId};
pub use traversal::{depth_first_blocks, depth_first_calls, depth_first_spawns, Direction};

use crate::{commands::Commands, segment::ScriptImage, Result};

/// Runs the block-level pipeline: block discovery, edge linking, call/spawn
/// linking, and dominator computation.
///
/// # Arguments
///
/// * `commands` - The command metadata oracle
/// * `image` - The decompiled program image
///
/// # Returns
///
/// The fully linked and analysed [`BlockList`], ready for loop discovery
/// and structuring.
///
/// # Errors
///
/// Returns the first error any pass raises; see [`crate::Error`] for the
/// failure kinds. No partial result is returned.
pub fn analyze<'a>(commands: &dyn Commands, image: &'a ScriptImage) -> Result<BlockList<'a>> {
    let mut list = BlockList::build(commands, image)?;
    list.link_edges(commands)?;
    list.link_call_edges(commands)?;
    list.compute_dominators()?;
    Ok(list)
}

/// Structures one procedure: discovers its natural loops, sorts them
/// inner-first, builds the statement graph, and folds loops and
/// conditionals.
///
/// # Arguments
///
/// * `list` - A block list that has been through [`analyze`]
/// * `proc` - The procedure to structure
///
/// # Returns
///
/// The structured [`Statements`] graph for the procedure.
///
/// # Errors
///
/// Returns [`MalformedProcedure`](crate::Error::MalformedProcedure) when a
/// loop cannot be folded (irreducible region, loop head that is not a
/// two-way conditional).
pub fn structure_procedure(list: &BlockList<'_>, proc: ProcId) -> Result<Statements> {
    let mut loops = list.natural_loops(proc);
    sort_natural_loops(&mut loops);

    let mut statements = Statements::build(list, list.proc(proc).entry_block());
    statements.structure_loops(list, &loops)?;
    statements.structure_conditionals(list);
    Ok(statements)
}
