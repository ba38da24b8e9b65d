//! Dominator and post-dominator computation.
//!
//! Classical iterative data-flow over bitsets, run per procedure:
//!
//! - `dom(entry) = {entry}`; for any other block,
//!   `dom(B) = {B} ∪ ⋂ dom(P)` over its predecessors.
//! - `postdom(exit) = {exit}`; for any other block,
//!   `postdom(B) = {B} ∪ ⋂ postdom(S)` over its successors.
//!
//! Iteration runs to a fixed point. The sets are stored on each block as
//! bitsets over block ids, so a dominance query is a single bit test.
//! Post-dominators anchor on the segment's exit sentinel, which keeps them
//! well-defined in the presence of multiple returns.
//!
//! Each procedure's fixpoint is restricted to the blocks reachable from
//! its entry; predecessor and successor contributions from outside that
//! set are ignored. That restriction is what keeps per-segment exit
//! sentinels sound even though several procedures share one.

use rustc_hash::FxHashMap;

use crate::{
    flow::{
        traversal::{depth_first_blocks, Direction},
        BlockId, BlockList, ProcId,
    },
    utils::BitSet,
    Result,
};

impl BlockList<'_> {
    /// Computes dominators and post-dominators for every procedure.
    ///
    /// Requires [`link_edges`](Self::link_edges) (and, for procedures
    /// discovered by call linking, [`link_call_edges`](Self::link_call_edges))
    /// to have run. Recomputing is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedProcedure`](crate::Error::MalformedProcedure) for
    /// a procedure whose exit sentinel is unreachable from its entry.
    pub fn compute_dominators(&mut self) -> Result<()> {
        for index in 0..self.procs.len() {
            self.compute_proc_dominators(ProcId::new(index))?;
        }
        Ok(())
    }

    /// Runs both fixpoints for one procedure.
    fn compute_proc_dominators(&mut self, proc: ProcId) -> Result<()> {
        let entry = self.procs[proc.index()].entry_block;
        let entry_begin = self.blocks[entry.index()].begin();
        let exit = self.procs[proc.index()]
            .exit_block
            .ok_or_else(|| malformed_procedure!(entry_begin, "procedure has no exit sentinel"))?;

        // The procedure's blocks: everything reachable from its entry.
        let mut order = Vec::new();
        depth_first_blocks(self, entry, Direction::Forward, |id| {
            order.push(id);
            true
        });

        let width = self.blocks.len();
        let mut members = BitSet::new(width);
        for id in &order {
            members.insert(id.index());
        }
        if !members.contains(exit.index()) {
            return Err(malformed_procedure!(
                entry_begin,
                "no reachable exit sentinel"
            ));
        }

        let dominators = self.fixpoint(&order, &members, entry, Direction::Forward);
        let post_dominators = self.fixpoint(&order, &members, exit, Direction::Backward);

        for id in order {
            let block = &mut self.blocks[id.index()];
            block.dominators = match dominators.get(&id) {
                Some(set) => set.clone(),
                None => BitSet::new(width),
            };
            block.post_dominators = match post_dominators.get(&id) {
                Some(set) => set.clone(),
                None => BitSet::new(width),
            };
        }

        Ok(())
    }

    /// One iterative dominance fixpoint.
    ///
    /// `Forward` computes dominators anchored on `anchor = entry`;
    /// `Backward` computes post-dominators anchored on `anchor = exit`.
    fn fixpoint(
        &self,
        order: &[BlockId],
        members: &BitSet,
        anchor: BlockId,
        direction: Direction,
    ) -> FxHashMap<BlockId, BitSet> {
        let mut sets: FxHashMap<BlockId, BitSet> = FxHashMap::default();
        for &id in order {
            if id == anchor {
                let mut set = BitSet::new(members.len());
                set.insert(id.index());
                sets.insert(id, set);
            } else {
                sets.insert(id, members.clone());
            }
        }

        // For dominators, visiting in discovery order converges fast; for
        // post-dominators the reverse order does.
        let schedule: Vec<BlockId> = match direction {
            Direction::Forward => order.to_vec(),
            Direction::Backward => order.iter().rev().copied().collect(),
        };

        loop {
            let mut changed = false;

            for &id in &schedule {
                if id == anchor {
                    continue;
                }

                let block = &self.blocks[id.index()];
                let inputs = match direction {
                    Direction::Forward => block.predecessors(),
                    Direction::Backward => block.successors(),
                };

                let mut acc = members.clone();
                for input in inputs {
                    if members.contains(input.index()) {
                        if let Some(set) = sets.get(input) {
                            acc.intersect_with(set);
                        }
                    }
                }
                acc.insert(id.index());

                if sets.get(&id) != Some(&acc) {
                    sets.insert(id, acc);
                    changed = true;
                }
            }

            if !changed {
                return sets;
            }
        }
    }

    /// Returns the immediate post-dominator of a block: its closest strict
    /// post-dominator.
    ///
    /// For a two-way conditional this is the merge point where both arms
    /// join again, which is exactly what if/if-else structuring needs.
    /// Returns `None` for exit sentinels and for blocks whose dominators
    /// have not been computed.
    #[must_use]
    pub fn immediate_post_dominator(&self, id: BlockId) -> Option<BlockId> {
        let sets = &self.blocks[id.index()].post_dominators;
        if sets.len() == 0 {
            return None;
        }

        let mut strict = sets.clone();
        strict.remove(id.index());

        // The closest strict post-dominator is the one every other strict
        // post-dominator still post-dominates.
        strict
            .iter()
            .find(|&candidate| strict.is_subset(&self.blocks[candidate].post_dominators))
            .map(BlockId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::synthetic_list;

    #[test]
    fn test_diamond_dominators() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3, 3 -> exit(4)
        let image = crate::test::empty_image();
        let mut list = synthetic_list(&image, 4, &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)]);
        list.compute_dominators().unwrap();

        let b = |i: usize| BlockId::new(i);
        assert!(list.block(b(3)).dominated_by(b(0)));
        assert!(!list.block(b(3)).dominated_by(b(1)));
        assert!(!list.block(b(3)).dominated_by(b(2)));
        assert!(list.block(b(1)).dominated_by(b(0)));

        // Exit post-dominates everything; the merge post-dominates the arms.
        assert!(list.block(b(0)).post_dominated_by(b(4)));
        assert!(list.block(b(1)).post_dominated_by(b(3)));
        assert!(list.block(b(2)).post_dominated_by(b(3)));
        assert!(!list.block(b(3)).post_dominated_by(b(1)));
    }

    #[test]
    fn test_immediate_post_dominator_is_merge() {
        let image = crate::test::empty_image();
        let mut list = synthetic_list(&image, 4, &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)]);
        list.compute_dominators().unwrap();

        assert_eq!(
            list.immediate_post_dominator(BlockId::new(0)),
            Some(BlockId::new(3))
        );
        assert_eq!(
            list.immediate_post_dominator(BlockId::new(3)),
            Some(BlockId::new(4))
        );
    }

    #[test]
    fn test_unreachable_exit_is_rejected() {
        // Block 0 loops on itself and never reaches the sentinel.
        let image = crate::test::empty_image();
        let mut list = synthetic_list(&image, 2, &[(0, 0)]);
        assert!(list.compute_dominators().is_err());
    }

    #[test]
    fn test_fixpoint_is_stable() {
        let image = crate::test::empty_image();
        let mut list = synthetic_list(&image, 4, &[(0, 1), (1, 2), (2, 1), (2, 3), (3, 4)]);
        list.compute_dominators().unwrap();

        let before: Vec<_> = list
            .blocks()
            .iter()
            .map(|block| (block.dominators().clone(), block.post_dominators().clone()))
            .collect();

        list.compute_dominators().unwrap();

        let after: Vec<_> = list
            .blocks()
            .iter()
            .map(|block| (block.dominators().clone(), block.post_dominators().clone()))
            .collect();

        assert_eq!(before, after);
    }
}
