// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # scmscope
//!
//! The control-flow analysis core of an SCM mission-script decompiler.
//! `scmscope` consumes the decompiled pseudo-instruction streams produced by
//! an upstream disassembler and recovers the structure the bytecode erased:
//! basic blocks, procedures, call and spawn graphs, dominators, natural
//! loops, and finally a tree of high-level control constructs.
//!
//! # Architecture
//!
//! The crate is a pipeline of analyses over a single [`BlockList`]. Each
//! pass enriches the list in place and never mutates the output of an
//! earlier pass:
//!
//! - **Block discovery** ([`BlockList::build`]) - computes leaders, cuts
//!   every code segment into basic blocks sorted by begin address, appends
//!   one exit-sentinel block per segment, and seeds the main and mission
//!   procedure entries.
//! - **Edge linking** ([`BlockList::link_edges`]) - fills the symmetric
//!   predecessor/successor links between blocks of the same segment and
//!   wires returns and terminators to the exit sentinels.
//! - **Call/spawn linking** ([`BlockList::link_call_edges`]) - discovers
//!   `GOSUB` and script-spawn targets, creating procedures on demand and
//!   recording the cross-references of the call graph and the spawn graph.
//! - **Dominators** ([`BlockList::compute_dominators`]) - classical
//!   iterative bitset data-flow per procedure, for both dominators and
//!   post-dominators (anchored on the exit sentinel).
//! - **Natural loops** ([`BlockList::natural_loops`],
//!   [`sort_natural_loops`]) - back-edge detection plus loop-body
//!   expansion, sorted inner-first for structuring.
//! - **Structuring** ([`Statements`]) - rebuilds a statement graph from
//!   the block CFG, folds natural loops into while nodes and two-way
//!   conditionals into if/if-else nodes.
//!
//! The upstream interface is deliberately small: the instruction model in
//! [`instruction`], the segment model in [`segment`], and the [`Commands`]
//! oracle trait answering per-opcode questions the analysis cannot answer
//! itself.
//!
//! # Usage
//!
//! ```rust
//! use scmscope::prelude::*;
//! # fn oracle() -> impl Commands { scmscope::NeverCommands }
//! # fn image() -> ScriptImage {
//! #     ScriptImage::new(CodeSegment::new(Vec::new()), Vec::new(), Vec::new())
//! # }
//!
//! let commands = oracle();
//! let image = image();
//!
//! // Run the block-level pipeline.
//! let list = scmscope::flow::analyze(&commands, &image)?;
//!
//! // Structure every discovered procedure.
//! for proc in 0..list.proc_count() {
//!     let statements = scmscope::flow::structure_procedure(&list, ProcId::new(proc))?;
//!     println!("procedure {proc}: {} statements", statements.len());
//! }
//! # Ok::<(), scmscope::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Errors are
//! fatal to the current analysis invocation and carry the offending segment
//! reference; no partial results are exposed on failure.
//!
//! # Concurrency
//!
//! The core is single-threaded and synchronous. Passes run to completion in
//! a fixed order and share the block list by exclusive mutation. Outputs are
//! deterministic for identical inputs; depth-first traversal order is the
//! successor-insertion order produced by edge linking.

#[macro_use]
pub(crate) mod error;

/// Shared utility types for the analysis passes.
pub mod utils;

#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Usage Examples
///
/// ```rust,ignore
/// use scmscope::prelude::*;
///
/// let list = scmscope::flow::analyze(&commands, &image)?;
/// ```
pub mod prelude;

/// Decompiled pseudo-instruction model produced by the upstream disassembler.
///
/// # Key Components
///
/// - [`Instruction`] - one decompiled item with its local byte offset
/// - [`Payload`] - label definition, command, or raw hex data
/// - [`Command`] - opcode id (with the NOT-flag high bit) plus arguments
/// - [`Arg`] - typed command argument with immediate-value accessors
pub mod instruction;

/// Command metadata oracle consumed by the analysis passes.
///
/// # Key Components
///
/// - [`Commands`] - trait answering per-opcode control-flow questions
/// - [`FlowKind`] - control-flow classification of an opcode
pub mod commands;

/// Uniform addressing of instructions across code segments.
///
/// # Key Components
///
/// - [`SegmentRef`] - compact reference to one instruction in one segment
/// - [`SegmentKind`] - main / mission / streamed / exit-node discriminant
/// - [`CodeSegment`] - one decompiled instruction stream
/// - [`ScriptImage`] - the full set of decompiled segments
pub mod segment;

/// Control-flow analysis passes: blocks, edges, procedures, dominators,
/// loops, and structuring.
///
/// # Key Components
///
/// - [`BlockList`] - global block and procedure storage, enriched pass by pass
/// - [`Block`] / [`BlockId`] - one basic block and its typed index
/// - [`ProcEntry`] / [`ProcId`] / [`ProcKind`] - discovered procedures
/// - [`Loop`] - one natural loop per back-edge
/// - [`Statements`] / [`StatementKind`] - the structured statement graph
/// - [`flow::analyze`] / [`flow::structure_procedure`] - pipeline wrappers
pub mod flow;

/// The error type for every fallible operation in this crate.
pub use error::Error;

/// A [`Commands`] implementation with no opcode metadata at all.
///
/// Every classification query answers `None`, so any command-carrying input
/// fails with [`Error::UnknownOpcode`]. Useful as a placeholder in examples
/// and as an explicit "no oracle" value in tooling.
pub use commands::NeverCommands;

pub use commands::{Commands, FlowKind};
pub use flow::{
    analyze, depth_first_blocks, depth_first_calls, depth_first_spawns, sort_natural_loops,
    structure_procedure, Block, BlockId, BlockList, Direction, Loop, ProcEntry, ProcId, ProcKind,
    ProcXref, Statement, StatementKind, Statements, StmtId,
};
pub use instruction::{Arg, Command, Instruction, Payload, Variable};
pub use segment::{CodeSegment, ScriptImage, SegmentKind, SegmentRef};

/// The result type used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;
