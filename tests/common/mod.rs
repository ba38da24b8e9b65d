//! Shared integration-test fixtures: a toy opcode oracle covering the
//! classic control-flow commands, and builders that assemble decompiled
//! instruction streams the way the disassembler would emit them.

#![allow(dead_code)]

use scmscope::{Arg, CodeSegment, Command, Commands, FlowKind, Instruction, Payload, ScriptImage};

pub const NOP: u16 = 0x0000;
pub const WAIT: u16 = 0x0001;
pub const GOTO: u16 = 0x0002;
pub const GOTO_IF_FALSE: u16 = 0x004D;
pub const TERMINATE_THIS_SCRIPT: u16 = 0x004E;
pub const START_NEW_SCRIPT: u16 = 0x004F;
pub const GOSUB: u16 = 0x0050;
pub const RETURN: u16 = 0x0051;
pub const LAUNCH_MISSION: u16 = 0x00D7;
pub const SCRIPT_NAME: u16 = 0x03A4;
pub const LOAD_AND_LAUNCH_MISSION: u16 = 0x0417;

/// Oracle over the opcode table above.
pub struct TestCommands;

impl Commands for TestCommands {
    fn flow_kind(&self, opcode: u16) -> Option<FlowKind> {
        Some(match opcode {
            NOP | WAIT | SCRIPT_NAME => FlowKind::Sequential,
            GOTO => FlowKind::Branch,
            GOTO_IF_FALSE => FlowKind::ConditionalBranch,
            GOSUB => FlowKind::Call,
            START_NEW_SCRIPT => FlowKind::SpawnScript,
            LAUNCH_MISSION => FlowKind::SpawnSubscript,
            LOAD_AND_LAUNCH_MISSION => FlowKind::SpawnMission,
            RETURN => FlowKind::Return,
            TERMINATE_THIS_SCRIPT => FlowKind::Terminate,
            _ => return None,
        })
    }

    fn is_script_name(&self, opcode: u16) -> bool {
        opcode == SCRIPT_NAME
    }

    fn mission_segment(&self, mission: i32) -> Option<usize> {
        usize::try_from(mission).ok()
    }
}

/// Builds one segment's instruction stream.
///
/// Every command occupies one offset unit; a label shares the offset of
/// the instruction it precedes, exactly like label definitions in
/// disassembler output. [`mark`](Self::mark) returns the label's offset
/// for use as a branch operand (negate it to target the main segment from
/// elsewhere).
pub struct SegBuilder {
    items: Vec<Instruction>,
    offset: u32,
}

impl SegBuilder {
    pub fn new() -> Self {
        SegBuilder {
            items: Vec::new(),
            offset: 0,
        }
    }

    /// Emits a label definition at the current offset and returns that
    /// offset.
    pub fn mark(&mut self) -> i32 {
        self.items.push(Instruction {
            offset: self.offset,
            payload: Payload::Label,
        });
        self.offset as i32
    }

    /// Emits a command and advances the offset.
    pub fn op(&mut self, id: u16, args: Vec<Arg>) -> &mut Self {
        self.items.push(Instruction {
            offset: self.offset,
            payload: Payload::Command(Command::new(id, args)),
        });
        self.offset += 1;
        self
    }

    pub fn build(self) -> CodeSegment {
        CodeSegment::new(self.items)
    }
}

/// An image with just a main segment.
pub fn main_only(main: CodeSegment) -> ScriptImage {
    ScriptImage::new(main, Vec::new(), Vec::new())
}

/// An image with a main segment and mission segments.
pub fn with_missions(main: CodeSegment, missions: Vec<CodeSegment>) -> ScriptImage {
    ScriptImage::new(main, missions, Vec::new())
}
