use thiserror::Error;

use crate::flow::BlockId;
use crate::segment::SegmentRef;

macro_rules! malformed_command {
    // Single string version
    ($location:expr, $msg:expr) => {
        crate::Error::MalformedCommand {
            location: $location,
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($location:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedCommand {
            location: $location,
            message: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! malformed_procedure {
    // Single string version
    ($location:expr, $msg:expr) => {
        crate::Error::MalformedProcedure {
            location: $location,
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($location:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedProcedure {
            location: $location,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library
/// can potentially return.
///
/// Every failure is fatal to the current analysis invocation and reports the
/// offending segment reference (segment kind, segment index, and local data
/// index) so the caller can point at the bytecode that broke the analysis. No
/// pass recovers locally and no partial results are exposed on failure.
///
/// # Error Categories
///
/// ## Resolution Errors
/// - [`Error::UnresolvedLabel`] - a branch target with no matching instruction
/// - [`Error::UnresolvedMission`] - a mission id with no matching segment
/// - [`Error::UnknownOpcode`] - the command oracle has no metadata for an opcode
///
/// ## Structure Errors
/// - [`Error::MalformedCommand`] - a control-flow command with a broken shape
/// - [`Error::MalformedProcedure`] - a procedure that cannot be analysed or
///   structured
/// - [`Error::InconsistentDominators`] - a supplied back-edge that violates
///   the dominance relation
///
/// # Examples
///
/// ```rust,ignore
/// use scmscope::{flow, Error};
///
/// match flow::analyze(&commands, &image) {
///     Ok(list) => println!("{} procedures", list.proc_count()),
///     Err(Error::UnresolvedLabel { location, target }) => {
///         eprintln!("dangling branch to {target} at {location}");
///     }
///     Err(e) => eprintln!("analysis failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A branch target has no matching instruction in the expected segment.
    ///
    /// Raised while collecting leaders or linking edges when a label operand
    /// does not resolve to any decompiled item, or resolves to an offset that
    /// is not the start of a block.
    ///
    /// # Fields
    ///
    /// * `location` - The instruction carrying the dangling operand
    /// * `target` - The label operand as found in the bytecode (negative
    ///   values address the main segment)
    #[error("unresolved label target {target} referenced from {location}")]
    UnresolvedLabel {
        /// The instruction carrying the dangling operand.
        location: SegmentRef,
        /// The raw label operand.
        target: i32,
    },

    /// A mission id does not resolve to a mission segment.
    ///
    /// Raised when a mission-spawn command names a mission the oracle does
    /// not know, or one whose segment decompiled to an empty stream.
    #[error("unresolved mission {mission} referenced from {location}")]
    UnresolvedMission {
        /// The spawning instruction.
        location: SegmentRef,
        /// The raw mission-id operand.
        mission: i32,
    },

    /// The command oracle returned no metadata for an opcode.
    ///
    /// Every command in the input streams must be classifiable; an opcode the
    /// oracle cannot classify makes block boundaries undecidable.
    #[error("unknown opcode {opcode:#06x} at {location}")]
    UnknownOpcode {
        /// The unclassifiable instruction.
        location: SegmentRef,
        /// The opcode id (NOT-flag stripped).
        opcode: u16,
    },

    /// A control-flow command has a broken shape.
    ///
    /// Covers commands missing their label or mission operand and
    /// conditionals that fall through the end of their segment.
    #[error("malformed command at {location}: {message}")]
    MalformedCommand {
        /// The offending instruction.
        location: SegmentRef,
        /// What was wrong with it.
        message: String,
    },

    /// A procedure cannot be analysed or structured.
    ///
    /// Raised when a procedure has no reachable exit sentinel after edge
    /// linking, and when loop folding meets a region it refuses to structure
    /// (a loop head that is not a two-way conditional, or one without a
    /// unique exit successor). Irreducible regions are rejected rather than
    /// guessed at.
    #[error("malformed procedure at {location}: {message}")]
    MalformedProcedure {
        /// The procedure entry (or loop head) that failed.
        location: SegmentRef,
        /// Why the procedure was rejected.
        message: String,
    },

    /// A back-edge targets a block that does not dominate its source.
    ///
    /// Impossible for loops produced by this crate's own loop discovery; it
    /// guards structuring against hand-constructed loop descriptions.
    #[error("back-edge {tail} -> {head} violates dominance")]
    InconsistentDominators {
        /// The claimed loop head.
        head: BlockId,
        /// The claimed back-edge source.
        tail: BlockId,
    },
}
