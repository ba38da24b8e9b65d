//! Uniform addressing of instructions across code segments.
//!
//! An SCM image decompiles into several independent instruction streams: the
//! main segment, one segment per mission, and (on later targets) streamed
//! segments. The analysis passes address instructions uniformly through
//! [`SegmentRef`], a compact (segment kind, segment index, data index)
//! triple with a total order, so one global block list can span every
//! segment.
//!
//! The synthetic [`SegmentKind::ExitNode`] kind addresses no real
//! instruction; it backs the zero-length exit-sentinel blocks that anchor
//! post-dominator computation.

use std::fmt;

use crate::instruction::Instruction;

/// Which code segment a reference points into.
///
/// The variant order is the segment order of the block list: `Main <
/// Mission < Streamed < ExitNode`. Exit-node references come last because
/// the dummy exit blocks are appended after every real block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentKind {
    /// The main code segment.
    Main,
    /// A mission segment (one per mission in the image header).
    Mission,
    /// A streamed script segment.
    Streamed,
    /// The synthetic segment of exit-sentinel blocks.
    ExitNode,
}

/// A compact reference to one instruction in one code segment.
///
/// References order lexicographically by segment kind, then segment index,
/// then data index; equality is componentwise. A `SegmentRef` borrows
/// nothing, and stays valid as long as the [`ScriptImage`] it indexes into
/// is not mutated.
///
/// # Examples
///
/// ```rust
/// use scmscope::{SegmentKind, SegmentRef};
///
/// let a = SegmentRef::new(SegmentKind::Main, 0, 4);
/// let b = SegmentRef::new(SegmentKind::Mission, 2, 0);
/// assert!(a < b); // every main reference precedes every mission reference
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentRef {
    /// The kind of segment addressed.
    pub kind: SegmentKind,
    /// Index within the segment array of that kind (0 for the main segment).
    pub segment: u16,
    /// Index into the segment's decompiled instruction vector.
    pub data: u32,
}

impl SegmentRef {
    /// Creates a new segment reference.
    #[must_use]
    pub const fn new(kind: SegmentKind, segment: u16, data: u32) -> Self {
        SegmentRef {
            kind,
            segment,
            data,
        }
    }

    /// Returns a copy of this reference advanced by `count` instructions.
    #[must_use]
    pub const fn advanced(self, count: u32) -> Self {
        SegmentRef {
            kind: self.kind,
            segment: self.segment,
            data: self.data + count,
        }
    }

    /// Returns `true` if this reference addresses an exit sentinel.
    #[must_use]
    pub const fn is_exit_node(&self) -> bool {
        matches!(self.kind, SegmentKind::ExitNode)
    }
}

impl fmt::Debug for SegmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentRef({self})")
    }
}

impl fmt::Display for SegmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SegmentKind::Main => write!(f, "main+{}", self.data),
            SegmentKind::Mission => write!(f, "mission{}+{}", self.segment, self.data),
            SegmentKind::Streamed => write!(f, "streamed{}+{}", self.segment, self.data),
            SegmentKind::ExitNode => write!(f, "exit{}", self.segment),
        }
    }
}

/// One decompiled code segment: the instruction stream the upstream
/// disassembler produced for it.
///
/// Items are stored in ascending offset order, exactly as disassembled. A
/// label definition emitted at some offset precedes the command at the same
/// offset, so resolving an offset always lands on the label first.
#[derive(Debug, Clone, Default)]
pub struct CodeSegment {
    data: Vec<Instruction>,
}

impl CodeSegment {
    /// Wraps a decompiled instruction stream.
    ///
    /// The stream must be in ascending offset order (the order the
    /// disassembler emits); resolution relies on it for binary search.
    #[must_use]
    pub fn new(data: Vec<Instruction>) -> Self {
        CodeSegment { data }
    }

    /// Returns the decompiled items of this segment.
    #[must_use]
    pub fn data(&self) -> &[Instruction] {
        &self.data
    }

    /// Returns the number of decompiled items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the segment decompiled to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resolves a local byte offset to an index into [`data`](Self::data).
    ///
    /// Returns the leftmost item at that offset, so a label definition wins
    /// over the command it precedes. Returns `None` when no item starts at
    /// the offset.
    #[must_use]
    pub fn data_index(&self, local_offset: u32) -> Option<usize> {
        let index = self.data.partition_point(|item| item.offset < local_offset);
        match self.data.get(index) {
            Some(item) if item.offset == local_offset => Some(index),
            _ => None,
        }
    }
}

/// The full decompiled program: main segment plus mission and streamed
/// segments.
///
/// The image owns the instruction vectors every [`SegmentRef`] indexes
/// into. Analysis structures borrow the image immutably; callers must not
/// mutate it while an analysis over it is alive (the borrow checker
/// enforces this).
#[derive(Debug, Clone, Default)]
pub struct ScriptImage {
    main: CodeSegment,
    missions: Vec<CodeSegment>,
    streamed: Vec<CodeSegment>,
}

impl ScriptImage {
    /// Assembles an image from its decompiled segments.
    #[must_use]
    pub fn new(main: CodeSegment, missions: Vec<CodeSegment>, streamed: Vec<CodeSegment>) -> Self {
        ScriptImage {
            main,
            missions,
            streamed,
        }
    }

    /// Returns the main code segment.
    #[must_use]
    pub fn main(&self) -> &CodeSegment {
        &self.main
    }

    /// Returns the mission segments in mission-id order.
    #[must_use]
    pub fn missions(&self) -> &[CodeSegment] {
        &self.missions
    }

    /// Returns the streamed script segments.
    #[must_use]
    pub fn streamed(&self) -> &[CodeSegment] {
        &self.streamed
    }

    /// Looks up a segment by kind and index.
    ///
    /// Returns `None` for [`SegmentKind::ExitNode`] (which addresses no real
    /// segment) and for out-of-range indices.
    #[must_use]
    pub fn segment(&self, kind: SegmentKind, index: u16) -> Option<&CodeSegment> {
        match kind {
            SegmentKind::Main => (index == 0).then_some(&self.main),
            SegmentKind::Mission => self.missions.get(index as usize),
            SegmentKind::Streamed => self.streamed.get(index as usize),
            SegmentKind::ExitNode => None,
        }
    }

    /// Resolves a segment reference to its instruction.
    ///
    /// Returns `None` for exit-node references (the sentinel null
    /// instruction) and for references outside the image.
    #[must_use]
    pub fn instruction(&self, at: SegmentRef) -> Option<&Instruction> {
        self.segment(at.kind, at.segment)?.data().get(at.data as usize)
    }

    /// Iterates every real segment in block-list order: main first, then
    /// missions, then streamed segments.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentKind, u16, &CodeSegment)> {
        std::iter::once((SegmentKind::Main, 0, &self.main))
            .chain(
                self.missions
                    .iter()
                    .enumerate()
                    .map(|(i, seg)| (SegmentKind::Mission, i as u16, seg)),
            )
            .chain(
                self.streamed
                    .iter()
                    .enumerate()
                    .map(|(i, seg)| (SegmentKind::Streamed, i as u16, seg)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Command, Payload};

    fn item(offset: u32, payload: Payload) -> Instruction {
        Instruction { offset, payload }
    }

    #[test]
    fn test_segment_ref_ordering() {
        let main_early = SegmentRef::new(SegmentKind::Main, 0, 1);
        let main_late = SegmentRef::new(SegmentKind::Main, 0, 9);
        let mission0 = SegmentRef::new(SegmentKind::Mission, 0, 0);
        let mission1 = SegmentRef::new(SegmentKind::Mission, 1, 0);
        let exit = SegmentRef::new(SegmentKind::ExitNode, 0, 0);

        assert!(main_early < main_late);
        assert!(main_late < mission0);
        assert!(mission0 < mission1);
        assert!(mission1 < exit);
    }

    #[test]
    fn test_segment_ref_equality() {
        let a = SegmentRef::new(SegmentKind::Mission, 2, 7);
        let b = SegmentRef::new(SegmentKind::Mission, 2, 7);
        let c = SegmentRef::new(SegmentKind::Mission, 3, 7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_data_index_prefers_label() {
        // Label and command share offset 4; resolution must land on the label.
        let seg = CodeSegment::new(vec![
            item(0, Payload::Command(Command::new(0, vec![]))),
            item(4, Payload::Label),
            item(4, Payload::Command(Command::new(0, vec![]))),
        ]);

        assert_eq!(seg.data_index(0), Some(0));
        assert_eq!(seg.data_index(4), Some(1));
        assert_eq!(seg.data_index(2), None);
        assert_eq!(seg.data_index(9), None);
    }

    #[test]
    fn test_image_lookup() {
        let image = ScriptImage::new(
            CodeSegment::new(vec![item(0, Payload::Label)]),
            vec![CodeSegment::default()],
            Vec::new(),
        );

        assert!(image.segment(SegmentKind::Main, 0).is_some());
        assert!(image.segment(SegmentKind::Main, 1).is_none());
        assert!(image.segment(SegmentKind::Mission, 0).is_some());
        assert!(image.segment(SegmentKind::Mission, 1).is_none());
        assert!(image.segment(SegmentKind::ExitNode, 0).is_none());

        assert!(image
            .instruction(SegmentRef::new(SegmentKind::Main, 0, 0))
            .is_some());
        assert!(image
            .instruction(SegmentRef::new(SegmentKind::ExitNode, 0, 0))
            .is_none());

        let order: Vec<SegmentKind> = image.segments().map(|(kind, _, _)| kind).collect();
        assert_eq!(order, vec![SegmentKind::Main, SegmentKind::Mission]);
    }
}
