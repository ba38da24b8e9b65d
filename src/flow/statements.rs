//! Structuring: from the block CFG to a graph of high-level statements.
//!
//! # Architecture
//!
//! Statement nodes live in an arena ([`Statements`]) and reference each
//! other by [`StmtId`]; forward edges live in `succ` lists, back-links in
//! `pred` lists. [`Statements::build`] turns a procedure's block CFG into
//! one [`StatementKind::Block`] node per reachable block, with merges
//! allowed (a node may have several predecessors).
//!
//! [`structure_loops`](Statements::structure_loops) then folds each
//! natural loop, inner-first, into a [`StatementKind::While`] node that
//! owns its body as an isolated sub-graph, and
//! [`structure_conditionals`](Statements::structure_conditionals) folds
//! two-way conditionals into [`StatementKind::If`] /
//! [`StatementKind::IfElse`] nodes using the immediate post-dominator as
//! the merge point.
//!
//! After loop folding, the `succ` graph is acyclic: the loop back-edge is
//! represented by the while node itself (its head is the implicit continue
//! target, its sole external successor the break target), so depth-first
//! traversal from any region entry terminates without revisiting an edge
//! even though the underlying CFG was cyclic.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::Error,
    flow::{BlockId, BlockList, Loop},
    Result,
};

/// A strongly-typed index of a statement within a [`Statements`] arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub(crate) usize);

impl StmtId {
    /// Creates a statement id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        StmtId(index)
    }

    /// Returns the raw index of this statement id.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Debug for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StmtId({})", self.0)
    }
}

/// The kind of one statement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Straight-line code from one basic block.
    Block {
        /// The source block.
        block: BlockId,
        /// Instructions to skip at the block head when emitting.
        trim_start: u16,
        /// Instructions to drop at the block tail when emitting. Loop
        /// folding bumps this on the loop tail so the conditional
        /// back-branch is not emitted twice.
        trim_end: u16,
    },
    /// A structured loop. `head ..= tail` form an isolated sub-graph owned
    /// by this node; the node's sole external successor is the code after
    /// the loop. The head is the implicit continue target.
    While {
        /// Entry of the owned loop body (the loop condition).
        head: StmtId,
        /// Last statement of the owned loop body.
        tail: StmtId,
    },
    /// A single-armed conditional. Condition and arm are isolated
    /// sub-graphs owned by this node; the node's sole external successor
    /// is the merge point.
    If {
        /// The block ending in the conditional branch.
        condition: StmtId,
        /// The arm taken before control rejoins at the merge.
        then_arm: StmtId,
    },
    /// A two-armed conditional. Condition and both arms are isolated
    /// sub-graphs owned by this node; the node's sole external successor
    /// is the merge point.
    IfElse {
        /// The block ending in the conditional branch.
        condition: StmtId,
        /// The fallthrough arm of the branch.
        then_arm: StmtId,
        /// The branch-target arm.
        else_arm: StmtId,
    },
    /// Exits the innermost enclosing while. Produced by loop folding in
    /// place of the head's original loop-exit edge.
    Break,
}

/// One statement node: its kind plus forward (`succ`) and back (`pred`)
/// links.
#[derive(Debug, Clone)]
pub struct Statement {
    pub(crate) kind: StatementKind,
    pub(crate) pred: Vec<StmtId>,
    pub(crate) succ: Vec<StmtId>,
}

impl Statement {
    /// Returns the kind of this statement.
    #[must_use]
    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// Returns the forward links, in insertion order.
    #[must_use]
    pub fn successors(&self) -> &[StmtId] {
        &self.succ
    }

    /// Returns the back-links, in insertion order.
    #[must_use]
    pub fn predecessors(&self) -> &[StmtId] {
        &self.pred
    }

    /// Returns the source block, if this is a block statement.
    #[must_use]
    pub fn block_id(&self) -> Option<BlockId> {
        match self.kind {
            StatementKind::Block { block, .. } => Some(block),
            _ => None,
        }
    }
}

/// The statement graph of one procedure.
///
/// Nodes are arena-allocated; ids stay valid for the arena's lifetime even
/// after folding detaches nodes from the reachable graph (a folded
/// conditional's condition node, for instance, lives on inside its
/// [`StatementKind::If`] owner).
#[derive(Debug, Clone)]
pub struct Statements {
    nodes: Vec<Statement>,
    entry: StmtId,
}

impl Statements {
    /// Builds the statement graph for the CFG reachable from `entry`.
    ///
    /// Every reachable block gets exactly one block statement; successors
    /// are linked in CFG order. Cycles in the CFG become merges here;
    /// the back-edge is an ordinary edge until loop folding removes it.
    #[must_use]
    pub fn build(list: &BlockList<'_>, entry: BlockId) -> Self {
        let mut nodes = Vec::new();
        let mut by_block = FxHashMap::default();
        let entry = Self::build_block(list, entry, &mut nodes, &mut by_block);
        Statements { nodes, entry }
    }

    fn build_block(
        list: &BlockList<'_>,
        block: BlockId,
        nodes: &mut Vec<Statement>,
        by_block: &mut FxHashMap<BlockId, StmtId>,
    ) -> StmtId {
        let id = StmtId::new(nodes.len());
        nodes.push(Statement {
            kind: StatementKind::Block {
                block,
                trim_start: 0,
                trim_end: 0,
            },
            pred: Vec::new(),
            succ: Vec::new(),
        });
        by_block.insert(block, id);

        let successors: Vec<BlockId> = list.block(block).successors().to_vec();
        for succ in successors {
            let next = match by_block.get(&succ) {
                Some(&existing) => existing,
                None => Self::build_block(list, succ, nodes, by_block),
            };
            Self::link_in(nodes, id, next);
        }
        id
    }

    /// Returns the entry statement of the procedure.
    ///
    /// Loop and conditional folding update this when the original entry
    /// block is folded into a structured node.
    #[must_use]
    pub const fn entry(&self) -> StmtId {
        self.entry
    }

    /// Returns a statement by id.
    ///
    /// # Panics
    ///
    /// Panics if the id is out of bounds.
    #[must_use]
    pub fn node(&self, id: StmtId) -> &Statement {
        &self.nodes[id.index()]
    }

    /// Returns the number of statements in the arena, detached nodes
    /// included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena is empty (never after
    /// [`build`](Self::build)).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolves a statement to the block its control flow enters at: the
    /// block itself for block statements, the loop head's block for
    /// whiles, the condition's block for conditionals. `None` for breaks.
    #[must_use]
    pub fn resolved_block(&self, id: StmtId) -> Option<BlockId> {
        match self.nodes[id.index()].kind {
            StatementKind::Block { block, .. } => Some(block),
            StatementKind::While { head, .. } => self.resolved_block(head),
            StatementKind::If { condition, .. } | StatementKind::IfElse { condition, .. } => {
                self.resolved_block(condition)
            }
            StatementKind::Break => None,
        }
    }

    /// Depth-first preorder traversal over forward links.
    ///
    /// Visits each reachable statement at most once, expanding successors
    /// in insertion order; stops early when the visitor returns `false`.
    /// Does not descend into the isolated sub-graphs owned by while and
    /// if nodes; walk those from their `head`/arm ids explicitly.
    ///
    /// # Returns
    ///
    /// `false` if the visitor stopped the traversal, `true` otherwise.
    pub fn depth_first<F>(&self, start: StmtId, mut visit: F) -> bool
    where
        F: FnMut(StmtId) -> bool,
    {
        let mut visited = FxHashSet::default();
        visited.insert(start);
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            if !visit(id) {
                return false;
            }
            let succ = &self.nodes[id.index()].succ;
            for &next in succ.iter().rev() {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        true
    }

    /// Folds natural loops into while nodes, inner-first.
    ///
    /// `loops` must be sorted by [`sort_natural_loops`](super::sort_natural_loops)
    /// so outer loops see their inner loops already collapsed. For each
    /// loop present in the current graph:
    ///
    /// 1. the head's loop-exit successor (the one leaving the body) is
    ///    replaced with a [`StatementKind::Break`],
    /// 2. the head's outer predecessors are rewired to the new while node,
    /// 3. the exit becomes the while node's sole external successor,
    /// 4. the tail-to-head back edge is unlinked (the body becomes an
    ///    isolated acyclic sub-graph),
    /// 5. the tail's trailing back-branch is trimmed from emission,
    /// 6. the procedure entry moves to the while node if the head was the
    ///    entry.
    ///
    /// Loops whose head or tail statement is absent from the graph are
    /// skipped (they belong to a region this procedure does not enclose).
    ///
    /// # Errors
    ///
    /// - [`Error::InconsistentDominators`] when a supplied loop's tail is
    ///   not dominated by its head
    /// - [`Error::MalformedProcedure`] when a loop head is not a two-way
    ///   conditional or has no unique exit successor (irreducible regions
    ///   are rejected, not guessed at)
    pub fn structure_loops(&mut self, list: &BlockList<'_>, loops: &[Loop]) -> Result<()> {
        for natural in loops {
            if !list.block(natural.tail).dominated_by(natural.head) {
                return Err(Error::InconsistentDominators {
                    head: natural.head,
                    tail: natural.tail,
                });
            }

            let (head, tail) = self.find_loop_statements(natural);
            let (Some(head), Some(tail)) = (head, tail) else {
                continue;
            };
            self.fold_while(list, natural, head, tail)?;
        }
        Ok(())
    }

    /// Locates the block statements for a loop's head and tail in the
    /// currently reachable graph.
    fn find_loop_statements(&self, natural: &Loop) -> (Option<StmtId>, Option<StmtId>) {
        let mut head = None;
        let mut tail = None;
        self.depth_first(self.entry, |id| {
            if let Some(block) = self.nodes[id.index()].block_id() {
                if block == natural.head {
                    head = Some(id);
                }
                if block == natural.tail {
                    tail = Some(id);
                }
            }
            head.is_none() || tail.is_none()
        });
        (head, tail)
    }

    /// Folds one loop into a while node.
    fn fold_while(
        &mut self,
        list: &BlockList<'_>,
        natural: &Loop,
        head: StmtId,
        tail: StmtId,
    ) -> Result<()> {
        let location = list.block(natural.head).begin();
        let successors = self.nodes[head.index()].succ.clone();
        if successors.len() != 2 {
            return Err(malformed_procedure!(
                location,
                "loop head is not a two-way conditional"
            ));
        }

        // The exit is the head successor leaving the loop body. For the
        // while form that is the branch target; for a self loop it is the
        // fallthrough. Requiring exactly one rejects irreducible shapes.
        let exits: Vec<StmtId> = successors
            .iter()
            .copied()
            .filter(|&succ| {
                self.resolved_block(succ)
                    .is_some_and(|block| !natural.contains(block))
            })
            .collect();
        let [exit] = exits[..] else {
            return Err(malformed_procedure!(
                location,
                "loop head has no unique exit successor"
            ));
        };

        let node = self.alloc(StatementKind::While { head, tail });

        self.rewire_preds(head, node, Some(tail));

        let brk = self.alloc(StatementKind::Break);
        self.replace_successor(head, exit, brk);
        self.link(node, exit);
        self.unlink(tail, head);

        if let StatementKind::Block { trim_end, .. } = &mut self.nodes[tail.index()].kind {
            *trim_end += 1;
        }

        if self.entry == head {
            self.entry = node;
        }
        Ok(())
    }

    /// Folds two-way conditionals into if / if-else nodes, innermost
    /// first.
    ///
    /// A candidate is a reachable block statement with exactly two
    /// successors that is not a while head. With successors `T` (branch
    /// target) and `F` (fallthrough) and merge `M` (the condition block's
    /// immediate post-dominator), the fold is [`StatementKind::If`] when
    /// one of `T`/`F` resolves to `M` and [`StatementKind::IfElse`]
    /// otherwise. Arms are detached from the merge so the structured node
    /// owns them; the merge becomes the node's sole external successor.
    ///
    /// Candidates that do not match the clean pattern (no merge among the
    /// reachable statements, a break successor, both arms degenerate) are
    /// left unstructured.
    pub fn structure_conditionals(&mut self, list: &BlockList<'_>) {
        let mut rejected: FxHashSet<StmtId> = FxHashSet::default();
        while let Some(candidate) = self.pick_conditional(list, &rejected) {
            if !self.fold_conditional(list, candidate) {
                rejected.insert(candidate);
            }
        }
    }

    /// Finds the most deeply nested unprocessed conditional, or `None`.
    ///
    /// Depth is measured by dominator-set size: a conditional nested in
    /// another's arm is dominated by strictly more blocks.
    fn pick_conditional(&self, list: &BlockList<'_>, rejected: &FxHashSet<StmtId>) -> Option<StmtId> {
        let mut while_heads = FxHashSet::default();
        let mut regions = vec![self.entry];
        for node in &self.nodes {
            if let StatementKind::While { head, .. } = node.kind {
                while_heads.insert(head);
                regions.push(head);
            }
        }

        let mut best: Option<(usize, StmtId)> = None;
        for region in regions {
            self.depth_first(region, |id| {
                let statement = &self.nodes[id.index()];
                if statement.succ.len() == 2
                    && !while_heads.contains(&id)
                    && !rejected.contains(&id)
                {
                    if let Some(block) = statement.block_id() {
                        let depth = list.block(block).dominators().count();
                        let better = match best {
                            Some((best_depth, best_id)) => {
                                depth > best_depth || (depth == best_depth && id < best_id)
                            }
                            None => true,
                        };
                        if better {
                            best = Some((depth, id));
                        }
                    }
                }
                true
            });
        }
        best.map(|(_, id)| id)
    }

    /// Folds one conditional. Returns `false` when the shape does not
    /// match and the candidate should be left alone.
    fn fold_conditional(&mut self, list: &BlockList<'_>, condition: StmtId) -> bool {
        let successors = self.nodes[condition.index()].succ.clone();
        let [target, fallthrough] = successors[..] else {
            return false;
        };

        let Some(condition_block) = self.nodes[condition.index()].block_id() else {
            return false;
        };
        let Some(merge_block) = list.immediate_post_dominator(condition_block) else {
            return false;
        };
        let (Some(target_block), Some(fallthrough_block)) = (
            self.resolved_block(target),
            self.resolved_block(fallthrough),
        ) else {
            return false;
        };

        let Some(merge) = self.find_resolved(condition, merge_block) else {
            return false;
        };

        if target_block == merge_block && fallthrough_block == merge_block {
            return false;
        }

        let (kind, arms) = if target_block == merge_block {
            let kind = StatementKind::If {
                condition,
                then_arm: fallthrough,
            };
            (kind, vec![fallthrough])
        } else if fallthrough_block == merge_block {
            let kind = StatementKind::If {
                condition,
                then_arm: target,
            };
            (kind, vec![target])
        } else {
            let kind = StatementKind::IfElse {
                condition,
                then_arm: fallthrough,
                else_arm: target,
            };
            (kind, vec![fallthrough, target])
        };

        // Isolate the condition and its arms, then splice the new node in
        // front of the merge.
        self.unlink(condition, target);
        self.unlink(condition, fallthrough);
        for &arm in &arms {
            if arm == merge {
                continue;
            }
            for member in self.region_members(arm, merge) {
                self.unlink_all(member, merge);
            }
        }

        let node = self.alloc(kind);
        self.rewire_preds(condition, node, None);
        self.link(node, merge);

        if self.entry == condition {
            self.entry = node;
        }
        true
    }

    /// Finds the reachable statement resolving to `block`, searching from
    /// `start` through forward links.
    fn find_resolved(&self, start: StmtId, block: BlockId) -> Option<StmtId> {
        let mut found = None;
        self.depth_first(start, |id| {
            if self.resolved_block(id) == Some(block) {
                found = Some(id);
                return false;
            }
            true
        });
        found
    }

    /// Collects the statements reachable from `start` without entering
    /// `stop`.
    fn region_members(&self, start: StmtId, stop: StmtId) -> Vec<StmtId> {
        let mut members = Vec::new();
        if start == stop {
            return members;
        }
        let mut visited = FxHashSet::default();
        visited.insert(start);
        visited.insert(stop);
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            members.push(id);
            for &next in &self.nodes[id.index()].succ {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        members
    }

    /// Allocates a new node with no links.
    fn alloc(&mut self, kind: StatementKind) -> StmtId {
        let id = StmtId::new(self.nodes.len());
        self.nodes.push(Statement {
            kind,
            pred: Vec::new(),
            succ: Vec::new(),
        });
        id
    }

    /// Links `from -> to` in the arena being built.
    fn link_in(nodes: &mut [Statement], from: StmtId, to: StmtId) {
        nodes[from.index()].succ.push(to);
        nodes[to.index()].pred.push(from);
    }

    /// Links `from -> to`, updating both sides.
    fn link(&mut self, from: StmtId, to: StmtId) {
        self.nodes[from.index()].succ.push(to);
        self.nodes[to.index()].pred.push(from);
    }

    /// Removes one `from -> to` edge, if present.
    fn unlink(&mut self, from: StmtId, to: StmtId) {
        let succ = &mut self.nodes[from.index()].succ;
        if let Some(position) = succ.iter().position(|&id| id == to) {
            succ.remove(position);
        }
        let pred = &mut self.nodes[to.index()].pred;
        if let Some(position) = pred.iter().position(|&id| id == from) {
            pred.remove(position);
        }
    }

    /// Removes every `from -> to` edge.
    fn unlink_all(&mut self, from: StmtId, to: StmtId) {
        self.nodes[from.index()].succ.retain(|&id| id != to);
        self.nodes[to.index()].pred.retain(|&id| id != from);
    }

    /// Replaces the `node -> old` edge with `node -> new`, preserving its
    /// position in the successor list.
    fn replace_successor(&mut self, node: StmtId, old: StmtId, new: StmtId) {
        let mut replaced = 0;
        for succ in &mut self.nodes[node.index()].succ {
            if *succ == old {
                *succ = new;
                replaced += 1;
            }
        }
        for _ in 0..replaced {
            self.nodes[new.index()].pred.push(node);
            let pred = &mut self.nodes[old.index()].pred;
            if let Some(position) = pred.iter().position(|&id| id == node) {
                pred.remove(position);
            }
        }
    }

    /// Rewires every predecessor of `node` (except `keep`) to point at
    /// `to` instead.
    fn rewire_preds(&mut self, node: StmtId, to: StmtId, keep: Option<StmtId>) {
        let preds = std::mem::take(&mut self.nodes[node.index()].pred);
        for pred in preds {
            if Some(pred) == keep {
                self.nodes[node.index()].pred.push(pred);
                continue;
            }
            for succ in &mut self.nodes[pred.index()].succ {
                if *succ == node {
                    *succ = to;
                }
            }
            self.nodes[to.index()].pred.push(pred);
        }
    }
}
