//! Convenient re-exports of the most commonly used types and traits.
//!
//! # Usage Examples
//!
//! ```rust
//! use scmscope::prelude::*;
//!
//! let image = ScriptImage::new(CodeSegment::new(Vec::new()), Vec::new(), Vec::new());
//! let list = scmscope::flow::analyze(&scmscope::NeverCommands, &image)?;
//! assert_eq!(list.proc_count(), 0);
//! # Ok::<(), scmscope::Error>(())
//! ```

pub use crate::commands::{Commands, FlowKind};
pub use crate::flow::{
    analyze, depth_first_blocks, depth_first_calls, depth_first_spawns, sort_natural_loops,
    structure_procedure, Block, BlockId, BlockList, Direction, Loop, ProcEntry, ProcId, ProcKind,
    ProcXref, Statement, StatementKind, Statements, StmtId,
};
pub use crate::instruction::{Arg, Command, Instruction, Payload, Variable};
pub use crate::segment::{CodeSegment, ScriptImage, SegmentKind, SegmentRef};
pub use crate::utils::BitSet;
pub use crate::{Error, Result};
