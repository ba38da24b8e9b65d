//! Command metadata oracle consumed by the analysis passes.
//!
//! The analysis core knows nothing about concrete opcode tables; which
//! opcode branches, calls, spawns, or terminates is game- and
//! version-specific knowledge supplied by the embedding toolchain through
//! the [`Commands`] trait. The passes only ever ask the classification
//! questions defined here.

use crate::instruction::{Arg, Command};

/// Control-flow classification of an opcode.
///
/// This is the complete vocabulary the analysis passes understand; every
/// command in the input streams must map onto exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// No control-flow effect; execution falls through.
    Sequential,
    /// Unconditional branch to a label (`GOTO`).
    Branch,
    /// Conditional branch to a label (`GOTO_IF_FALSE` and friends); the
    /// other path falls through.
    ConditionalBranch,
    /// Subroutine call that returns to the caller (`GOSUB`, `GOSUB_FILE`).
    Call,
    /// Spawns a concurrent script at a label (`START_NEW_SCRIPT`).
    SpawnScript,
    /// Spawns a subscript at a label (`LAUNCH_MISSION`).
    SpawnSubscript,
    /// Spawns a mission by mission id (`LOAD_AND_LAUNCH_MISSION`).
    SpawnMission,
    /// Returns from a subroutine (`RETURN`, `RETURN_IF_FALSE`).
    Return,
    /// Ends the running script (`TERMINATE_THIS_SCRIPT`,
    /// `TERMINATE_THIS_CUSTOM_SCRIPT`).
    Terminate,
}

impl FlowKind {
    /// Returns `true` for branch kinds (conditional or not).
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        matches!(self, FlowKind::Branch | FlowKind::ConditionalBranch)
    }

    /// Returns `true` for the three spawn kinds.
    #[must_use]
    pub const fn is_spawn(&self) -> bool {
        matches!(
            self,
            FlowKind::SpawnScript | FlowKind::SpawnSubscript | FlowKind::SpawnMission
        )
    }

    /// Returns `true` if the command leaves the procedure (return or
    /// terminate); such commands link to the exit sentinel only.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, FlowKind::Return | FlowKind::Terminate)
    }
}

/// The command metadata oracle.
///
/// Implemented by the embedding toolchain over its opcode tables. The
/// required methods are keyed by opcode id (NOT-flag stripped); the operand
/// accessors have defaults that read the first immediate integer argument,
/// which matches the standard command definitions, and can be overridden
/// for exotic tables.
///
/// # Examples
///
/// ```rust
/// use scmscope::{Commands, FlowKind};
///
/// struct TinyOracle;
///
/// impl Commands for TinyOracle {
///     fn flow_kind(&self, opcode: u16) -> Option<FlowKind> {
///         match opcode {
///             0x0000 => Some(FlowKind::Sequential),       // NOP
///             0x0002 => Some(FlowKind::Branch),           // GOTO
///             0x004E => Some(FlowKind::Terminate),        // TERMINATE_THIS_SCRIPT
///             _ => None,
///         }
///     }
///
///     fn is_script_name(&self, opcode: u16) -> bool {
///         opcode == 0x03A4
///     }
///
///     fn mission_segment(&self, mission: i32) -> Option<usize> {
///         usize::try_from(mission).ok()
///     }
/// }
/// ```
pub trait Commands {
    /// Classifies the control-flow role of an opcode.
    ///
    /// Returns `None` when the oracle has no metadata for the opcode, which
    /// aborts the analysis with [`UnknownOpcode`](crate::Error::UnknownOpcode).
    fn flow_kind(&self, opcode: u16) -> Option<FlowKind>;

    /// Returns `true` if the opcode names the running script thread
    /// (`SCRIPT_NAME`). Used by script-name extraction.
    fn is_script_name(&self, opcode: u16) -> bool;

    /// Resolves a mission id to its mission-segment index.
    ///
    /// Returns `None` for mission ids outside the image, which aborts the
    /// analysis with [`UnresolvedMission`](crate::Error::UnresolvedMission).
    fn mission_segment(&self, mission: i32) -> Option<usize>;

    /// Extracts the label operand of a branching, calling, or
    /// label-spawning command.
    ///
    /// Label operands are local offsets; negative values address the main
    /// segment, non-negative values the command's own segment.
    fn branch_target(&self, command: &Command) -> Option<i32> {
        command.args.iter().find_map(Arg::as_int)
    }

    /// Extracts the mission-id operand of a mission-spawning command.
    fn mission_target(&self, command: &Command) -> Option<i32> {
        command.args.iter().find_map(Arg::as_int)
    }
}

/// A [`Commands`] implementation with no opcode metadata at all.
///
/// Every classification returns `None`, so analysing any command-carrying
/// input fails with [`UnknownOpcode`](crate::Error::UnknownOpcode). Useful
/// as a placeholder while wiring up an embedding and in documentation
/// examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCommands;

impl Commands for NeverCommands {
    fn flow_kind(&self, _opcode: u16) -> Option<FlowKind> {
        None
    }

    fn is_script_name(&self, _opcode: u16) -> bool {
        false
    }

    fn mission_segment(&self, _mission: i32) -> Option<usize> {
        None
    }
}
