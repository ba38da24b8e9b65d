//! Natural-loop discovery and the nesting-aware sort used by structuring.

use crate::{
    flow::{
        traversal::{depth_first_blocks, Direction},
        BlockId, BlockList, ProcId,
    },
    utils::BitSet,
};

/// One natural loop, defined by a back-edge `tail -> head` where `head`
/// dominates `tail`.
///
/// The body is the head plus every block that reaches the tail in the
/// reverse CFG without passing through the head. Two loops sharing a head
/// but ending in different tails are recorded separately; structuring
/// processes each independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    /// The loop header; dominates every block of the body.
    pub head: BlockId,
    /// The source of the back-edge.
    pub tail: BlockId,
    /// The body blocks (head included), in ascending id order.
    pub body: Vec<BlockId>,
}

impl Loop {
    /// Returns `true` if the loop body contains `id`.
    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        self.body.binary_search(&id).is_ok()
    }

    /// Returns the number of blocks in the body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns `true` if the body is empty (never the case for discovered
    /// loops, which always contain at least the head).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl BlockList<'_> {
    /// Discovers the natural loops of one procedure.
    ///
    /// Requires [`compute_dominators`](Self::compute_dominators) to have
    /// run. Scans every edge `T -> H` of the procedure's reachable blocks;
    /// when `H` dominates `T` the edge is a back-edge and yields one
    /// [`Loop`] whose body is expanded through the reverse CFG.
    ///
    /// The result is in discovery order; run [`sort_natural_loops`] before
    /// handing it to structuring.
    #[must_use]
    pub fn natural_loops(&self, proc: ProcId) -> Vec<Loop> {
        let entry = self.proc(proc).entry_block();

        let mut order = Vec::new();
        depth_first_blocks(self, entry, Direction::Forward, |id| {
            order.push(id);
            true
        });

        let mut members = BitSet::new(self.block_count());
        for id in &order {
            members.insert(id.index());
        }

        let mut loops = Vec::new();
        for &tail in &order {
            for &head in self.block(tail).successors() {
                if members.contains(head.index()) && self.block(tail).dominated_by(head) {
                    loops.push(self.expand_loop(head, tail, &members));
                }
            }
        }
        loops
    }

    /// Expands one back-edge into its natural loop body.
    fn expand_loop(&self, head: BlockId, tail: BlockId, members: &BitSet) -> Loop {
        let mut body = BitSet::new(self.block_count());
        body.insert(head.index());

        let mut worklist = vec![tail];
        while let Some(id) = worklist.pop() {
            if body.contains(id.index()) {
                continue;
            }
            body.insert(id.index());
            for &pred in self.block(id).predecessors() {
                if members.contains(pred.index()) && !body.contains(pred.index()) {
                    worklist.push(pred);
                }
            }
        }

        Loop {
            head,
            tail,
            body: body.iter().map(BlockId::new).collect(),
        }
    }
}

/// Sorts loops so that a loop nested inside another comes before its
/// enclosing loop, tie-breaking by smaller body.
///
/// Structuring folds loops in this order so that an outer loop always sees
/// its inner loops already collapsed into single while nodes. Nested
/// bodies are strict subsets of their enclosing bodies, so ascending body
/// size realises inner-first; `(head, tail)` breaks the remaining ties
/// deterministically.
pub fn sort_natural_loops(loops: &mut [Loop]) {
    loops.sort_by(|a, b| {
        a.body
            .len()
            .cmp(&b.body.len())
            .then_with(|| a.head.cmp(&b.head))
            .then_with(|| a.tail.cmp(&b.tail))
    });
}
